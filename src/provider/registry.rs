//! The set of known providers, in registration order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::loader::PluginLoader;
use super::{Model, Provider, offers, validate_models};

#[derive(Default)]
struct Entries {
    providers: Vec<Arc<dyn Provider>>,
    by_id: HashMap<String, usize>,
}

/// Providers keyed by id.
///
/// [`initialize`](Self::initialize) loads plugins from the providers directory
/// at most once, however many callers race on it.
pub struct ProviderRegistry {
    dir: PathBuf,
    loader: Arc<dyn PluginLoader>,
    entries: RwLock<Entries>,
    initialized: OnceCell<()>,
}

impl ProviderRegistry {
    pub fn new(dir: impl Into<PathBuf>, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            dir: dir.into(),
            loader,
            entries: RwLock::new(Entries::default()),
            initialized: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the providers directory if needed and register every plugin in it.
    ///
    /// Concurrent callers wait on the same load; later calls return immediately.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                let dir = self.dir.clone();
                if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                    warn!("Failed to create providers directory {}: {e}", dir.display());
                }

                let loader = Arc::clone(&self.loader);
                let loaded = tokio::task::spawn_blocking(move || loader.load_from_directory(&dir))
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Plugin loading task failed: {e}");
                        Vec::new()
                    });

                for provider in loaded {
                    self.register(provider);
                }
                info!("Provider registry ready with {} providers", self.len());
            })
            .await;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Add a provider. Returns `false` if its id is taken or its models are
    /// inconsistent; the existing entry is kept.
    pub fn register(&self, provider: Arc<dyn Provider>) -> bool {
        let id = provider.id().to_string();

        if let Err(e) = validate_models(&id, provider.models()) {
            warn!("Rejecting provider '{id}': {e}");
            return false;
        }

        let mut entries = self.write();
        if entries.by_id.contains_key(&id) {
            warn!("Provider '{id}' is already registered; keeping the first one");
            return false;
        }

        let index = entries.providers.len();
        entries.providers.push(provider);
        entries.by_id.insert(id.clone(), index);
        debug!("Registered provider '{id}'");
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        let entries = self.read();
        entries
            .by_id
            .get(id)
            .and_then(|&i| entries.providers.get(i))
            .cloned()
    }

    /// All providers in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Provider>> {
        self.read().providers.clone()
    }

    pub fn len(&self) -> usize {
        self.read().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every model of every provider, in registration order.
    pub fn models(&self) -> Vec<Model> {
        self.read()
            .providers
            .iter()
            .flat_map(|p| p.models().iter().cloned())
            .collect()
    }

    /// First registered provider offering `model_id`.
    pub fn provider_for_model(&self, model_id: &str) -> Option<Arc<dyn Provider>> {
        self.read()
            .providers
            .iter()
            .find(|p| offers(p.as_ref(), model_id))
            .cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
