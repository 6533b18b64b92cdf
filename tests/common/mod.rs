//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use git2::{Oid, Repository};

use commitdeck::config::{ConfigStore, Settings};
use commitdeck::error::ProviderError;
use commitdeck::git::{Git2Core, GitCore};
use commitdeck::orchestrator::CommitOrchestrator;
use commitdeck::provider::loader::PluginLoader;
use commitdeck::provider::{GenerateCommitInput, GenerateResult, Model, Provider, ProviderRegistry};
use commitdeck::session::Session;

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository with a committer identity configured.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        {
            let mut config = repo.config().expect("Failed to open repo config");
            config.set_str("user.name", "Test User").expect("Failed to set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Failed to set user.email");
        }
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `name` inside the work tree, creating parent dirs.
    pub fn write(&self, name: &str, content: &str) -> &Self {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&path, content).expect("Failed to write test file");
        self
    }

    /// Stage everything and commit it. Returns the commit OID.
    pub fn commit_all(&self, message: &str) -> Oid {
        let mut index = self.repo.index().expect("Failed to get index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("Failed to add files");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let sig = self.repo.signature().expect("Failed to create signature");
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    pub fn head_message(&self) -> String {
        let head = self.repo.head().expect("No HEAD");
        let commit = head.peel_to_commit().expect("HEAD is not a commit");
        commit.message().unwrap_or_default().to_string()
    }

    pub fn commit_count(&self) -> usize {
        let mut walk = self.repo.revwalk().expect("Failed to create revwalk");
        if walk.push_head().is_err() {
            return 0;
        }
        walk.count()
    }
}

type Respond = Box<dyn Fn(&GenerateCommitInput) -> Result<GenerateResult, ProviderError> + Send + Sync>;

/// Provider whose answer is computed from the input, with no I/O.
pub struct FakeProvider {
    pub id: String,
    pub models: Vec<Model>,
    respond: Respond,
}

impl FakeProvider {
    pub fn new(id: &str, model_ids: &[&str]) -> Self {
        let models = model_ids
            .iter()
            .map(|m| Model {
                provider_id: id.to_string(),
                id: m.to_string(),
                name: m.to_string(),
                description: String::new(),
                metrics: None,
            })
            .collect();

        Self {
            id: id.to_string(),
            models,
            respond: Box::new(|input: &GenerateCommitInput| {
                Ok(GenerateResult {
                    title: format!("feat: generated by {}", input.model),
                    body: None,
                    meta: None,
                })
            }),
        }
    }

    pub fn responding(
        mut self,
        respond: impl Fn(&GenerateCommitInput) -> Result<GenerateResult, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.respond = Box::new(respond);
        self
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "fake provider for tests"
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    async fn generate_commit(&self, input: GenerateCommitInput) -> Result<GenerateResult, ProviderError> {
        (self.respond)(&input)
    }
}

/// Loader that hands out a fixed provider list and counts how often it ran.
#[derive(Default)]
pub struct CountingLoader {
    pub calls: AtomicUsize,
    providers: Vec<Arc<dyn Provider>>,
}

impl CountingLoader {
    pub fn with(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            providers,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PluginLoader for CountingLoader {
    fn load_from_directory(&self, _dir: &Path) -> Vec<Arc<dyn Provider>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.providers.clone()
    }
}

/// Registry over an empty temp providers dir with `providers` registered in order.
pub fn registry_with(providers: Vec<FakeProvider>) -> (tempfile::TempDir, Arc<ProviderRegistry>) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let registry = Arc::new(ProviderRegistry::new(
        dir.path().join("providers"),
        Arc::new(CountingLoader::default()),
    ));
    for provider in providers {
        registry.register(Arc::new(provider));
    }
    (dir, registry)
}

/// A session over a real repository, in-memory settings and the given providers.
pub struct TestSession {
    pub repo: TestRepo,
    pub session: Arc<Session>,
    _providers_dir: tempfile::TempDir,
}

impl TestSession {
    pub fn new(settings: Settings, providers: Vec<FakeProvider>) -> Self {
        let repo = TestRepo::new();
        let (providers_dir, registry) = registry_with(providers);

        let config: Arc<dyn ConfigStore> = Arc::new(settings);
        let orchestrator = Arc::new(CommitOrchestrator::new(registry, Arc::clone(&config)));
        let git: Arc<dyn GitCore> = Arc::new(Git2Core::new(repo.path()));
        let session = Arc::new(Session::new(
            Some(PathBuf::from(repo.path())),
            git,
            config,
            orchestrator,
        ));

        Self {
            repo,
            session,
            _providers_dir: providers_dir,
        }
    }
}
