use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
};

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::{
    error::PolicyResult,
    policy::PolicyConfig,
    role::Role,
};

/// Where a policy document comes from.
pub trait PolicySource: Send + Sync {
    /// Read and parse the document.
    fn fetch(&self) -> PolicyResult<PolicyConfig>;

    fn describe(&self) -> String;
}

/// Policy document stored on disk.
#[derive(Clone, Debug)]
pub struct FilePolicySource {
    path: PathBuf,
}

impl FilePolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for FilePolicySource {
    fn fetch(&self) -> PolicyResult<PolicyConfig> {
        PolicyConfig::from_path(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Policy document held in memory.
#[derive(Clone, Debug)]
pub struct InlinePolicySource {
    document: String,
}

impl InlinePolicySource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl PolicySource for InlinePolicySource {
    fn fetch(&self) -> PolicyResult<PolicyConfig> {
        PolicyConfig::parse(&self.document)
    }

    fn describe(&self) -> String {
        "<inline>".to_string()
    }
}

/// Load a policy, substituting [`PolicyConfig::builtin`] on any failure.
pub fn load(source: &dyn PolicySource) -> PolicyConfig {
    match source.fetch() {
        Ok(config) => config,
        Err(err) => {
            warn!(
                source = %source.describe(),
                error = %err,
                "failed to load role policy; using built-in defaults"
            );
            PolicyConfig::builtin()
        }
    }
}

/// Holder of the active policy snapshot.
///
/// Readers take an `Arc` snapshot without locking; [`PolicyStore::reload`]
/// swaps in a fully built replacement.
pub struct PolicyStore {
    source: Box<dyn PolicySource>,
    active: ArcSwap<PolicyConfig>,
}

impl fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStore")
            .field("source", &self.source.describe())
            .field("rules", &self.active.load().rule_count())
            .finish()
    }
}

impl PolicyStore {
    /// Load the initial snapshot from `source`.
    pub fn open(source: impl PolicySource + 'static) -> Self {
        let source: Box<dyn PolicySource> = Box::new(source);
        let initial = load(source.as_ref());
        info!(
            source = %source.describe(),
            rules = initial.rule_count(),
            "role policy loaded"
        );
        Self {
            source,
            active: ArcSwap::from_pointee(initial),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::open(FilePolicySource::new(path))
    }

    /// Store with a fixed policy and no backing document; reloads keep it.
    pub fn fixed(config: PolicyConfig) -> Self {
        Self {
            active: ArcSwap::from_pointee(config.clone()),
            source: Box::new(FixedPolicy(config)),
        }
    }

    pub fn snapshot(&self) -> Arc<PolicyConfig> {
        self.active.load_full()
    }

    /// Re-read the source and swap in the result.
    pub fn reload(&self) -> Arc<PolicyConfig> {
        let next = Arc::new(load(self.source.as_ref()));
        self.active.store(next.clone());
        info!(
            source = %self.source.describe(),
            rules = next.rule_count(),
            "role policy reloaded"
        );
        next
    }

    pub fn replace(&self, config: PolicyConfig) {
        self.active.store(Arc::new(config));
    }

    pub fn required_role_for(&self, path: &str, method: &str) -> Role {
        self.active.load().required_role_for(path, method).clone()
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }
}

#[derive(Debug)]
struct FixedPolicy(PolicyConfig);

impl PolicySource for FixedPolicy {
    fn fetch(&self) -> PolicyResult<PolicyConfig> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "<fixed>".to_string()
    }
}
