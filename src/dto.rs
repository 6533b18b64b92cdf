//! Wire shape for fallible results: `{ok: true, data}` or `{ok: false, code, message}`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GenerateCommitError;

/// A boolean that only (de)serializes as the literal `V`.
///
/// Lets the untagged [`ResultDto`] pick its variant from the `ok` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Literal<const V: bool>;

impl<const V: bool> Serialize for Literal<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(V)
    }
}

impl<'de, const V: bool> Deserialize<'de> for Literal<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = bool::deserialize(deserializer)?;
        if value == V {
            Ok(Literal)
        } else {
            Err(D::Error::custom(format!("expected `ok: {V}`")))
        }
    }
}

/// Success-or-failure payload shared by providers, the UI and plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultDto<T> {
    Ok {
        ok: Literal<true>,
        data: T,
    },
    Err {
        ok: Literal<false>,
        code: i64,
        message: String,
    },
}

impl<T> ResultDto<T> {
    pub fn success(data: T) -> Self {
        ResultDto::Ok { ok: Literal, data }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        ResultDto::Err {
            ok: Literal,
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultDto::Ok { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ResultDto::Ok { data, .. } => Some(data),
            ResultDto::Err { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<T, GenerateCommitError> {
        match self {
            ResultDto::Ok { data, .. } => Ok(data),
            ResultDto::Err { code, message, .. } => Err(GenerateCommitError::new(code, message)),
        }
    }
}

impl<T> From<Result<T, GenerateCommitError>> for ResultDto<T> {
    fn from(result: Result<T, GenerateCommitError>) -> Self {
        match result {
            Ok(data) => ResultDto::success(data),
            Err(e) => ResultDto::failure(e.code, e.message),
        }
    }
}
