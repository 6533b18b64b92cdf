//! Running provider subprocesses with a timeout.

use std::env;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Default timeout for a provider subprocess (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variable to override the default timeout.
pub const TIMEOUT_ENV_VAR: &str = "COMMITDECK_PROVIDER_TIMEOUT";

/// Configured provider timeout.
///
/// Reads `COMMITDECK_PROVIDER_TIMEOUT` (seconds); an empty or non-numeric
/// value logs a warning and falls back to 300 seconds.
pub fn provider_timeout() -> Duration {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(
                    "Invalid {} value '{}', using default {}s",
                    TIMEOUT_ENV_VAR, v, DEFAULT_TIMEOUT_SECS
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        },
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

/// Run `command` to completion, optionally feeding `stdin`, and return stdout.
///
/// The child is killed if it outlives `limit`. A non-zero exit becomes
/// [`ProviderError::NonZeroExit`] carrying stderr.
pub async fn run(
    mut command: Command,
    stdin: Option<&[u8]>,
    limit: Duration,
) -> Result<String, ProviderError> {
    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ProviderError::SpawnFailed)?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        // A child may exit without reading its input.
        if let Err(e) = pipe.write_all(input).await
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(ProviderError::Io(e));
        }
        drop(pipe);
    }

    let output = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| ProviderError::Timeout(limit.as_secs()))?
        .map_err(ProviderError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        return Err(ProviderError::NonZeroExit { code, stderr });
    }

    debug!("Provider process wrote {} bytes", output.stdout.len());
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
