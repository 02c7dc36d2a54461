//! Locating and activating connector implementations.
//!
//! [`ConnectorLoader`] consults its [`ConnectorSource`]s in registration
//! order; the first source that provides a name wins. The standard loader
//! puts the [`BuiltinCatalog`] ahead of the user's [`ExtensionDir`], so a
//! user file can add connectors but never shadow a built-in one.
//!
//! Every failure between "which implementation?" and "init returned" is
//! turned into a [`LoadError`]; nothing propagates past [`ConnectorLoader::load`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::debug;

use crate::connector::{Connector, LoadError, ProcessConnector};
use crate::registry::{ConnectorSpec, LoadedConnector};

/// Constructor for a built-in connector.
pub type ConnectorCtor = Arc<dyn Fn() -> Box<dyn Connector> + Send + Sync>;

/// A place connector implementations can come from.
pub trait ConnectorSource: Send + Sync {
    /// Short label used in logs and diagnostics (`"builtin"`, `"user"`).
    fn label(&self) -> &'static str;

    /// Whether this source has an implementation for `name`.
    fn provides(&self, name: &str) -> bool;

    /// Instantiate `name`. `Ok(None)` means this source has no such connector.
    fn locate(&self, name: &str) -> Result<Option<Box<dyn Connector>>, LoadError>;
}

/// Connectors compiled into the binary.
#[derive(Clone, Default)]
pub struct BuiltinCatalog {
    ctors: HashMap<String, ConnectorCtor>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; a later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Connector> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Arc::new(ctor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ConnectorSource for BuiltinCatalog {
    fn label(&self) -> &'static str {
        "builtin"
    }

    fn provides(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn locate(&self, name: &str) -> Result<Option<Box<dyn Connector>>, LoadError> {
        let Some(ctor) = self.ctors.get(name) else {
            return Ok(None);
        };
        std::panic::catch_unwind(AssertUnwindSafe(|| ctor()))
            .map(Some)
            .map_err(|_| LoadError::Instantiate {
                name: name.to_string(),
                reason: "constructor panicked".to_string(),
            })
    }
}

/// User-supplied extensions: executables in a well-known directory.
///
/// `<dir>/<name>` is preferred over `<dir>/<name>.sh`.
#[derive(Debug, Clone)]
pub struct ExtensionDir {
    dir: PathBuf,
    timeout: Duration,
}

impl ExtensionDir {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the executable that would serve `name`, if any.
    pub fn executable_for(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_name(name) {
            return None;
        }
        [self.dir.join(name), self.dir.join(format!("{name}.sh"))]
            .into_iter()
            .find(|p| p.is_file())
    }
}

impl ConnectorSource for ExtensionDir {
    fn label(&self) -> &'static str {
        "user"
    }

    fn provides(&self, name: &str) -> bool {
        self.executable_for(name).is_some()
    }

    fn locate(&self, name: &str) -> Result<Option<Box<dyn Connector>>, LoadError> {
        let Some(program) = self.executable_for(name) else {
            return Ok(None);
        };
        if !is_executable(&program) {
            return Err(LoadError::Instantiate {
                name: name.to_string(),
                reason: format!("{} is not executable", program.display()),
            });
        }
        Ok(Some(Box::new(ProcessConnector::new(
            name,
            program,
            self.timeout,
        ))))
    }
}

/// Connector names double as file names; keep them to a safe alphabet.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolves connector names to initialized handles.
pub struct ConnectorLoader {
    sources: Vec<Box<dyn ConnectorSource>>,
    init_timeout: Duration,
}

impl ConnectorLoader {
    /// A loader with no sources; add them with [`ConnectorLoader::with_source`].
    pub fn new(init_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            init_timeout,
        }
    }

    /// Built-ins first, then the user's extension directory.
    pub fn standard(
        builtins: BuiltinCatalog,
        extensions: ExtensionDir,
        init_timeout: Duration,
    ) -> Self {
        Self::new(init_timeout)
            .with_source(builtins)
            .with_source(extensions)
    }

    /// Append a source with lower precedence than every existing one.
    pub fn with_source(mut self, source: impl ConnectorSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Label of the source that would serve `name`.
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.sources
            .iter()
            .find(|s| s.provides(name))
            .map(|s| s.label())
    }

    fn locate(&self, name: &str) -> Result<(Box<dyn Connector>, &'static str), LoadError> {
        for source in &self.sources {
            if let Some(connector) = source.locate(name)? {
                return Ok((connector, source.label()));
            }
        }
        Err(LoadError::NotFound {
            name: name.to_string(),
        })
    }

    /// Locate, instantiate and initialize the connector described by `spec`.
    pub async fn load(&self, spec: &ConnectorSpec) -> Result<LoadedConnector, LoadError> {
        let (mut connector, source) = self.locate(&spec.name)?;
        debug!(connector = %spec.name, source, "initializing connector");

        let init = AssertUnwindSafe(connector.init(&spec.config)).catch_unwind();
        let outcome = tokio::time::timeout(self.init_timeout, init).await;

        match outcome {
            Err(_) => Err(LoadError::InitTimeout {
                name: spec.name.clone(),
                timeout: self.init_timeout,
            }),
            Ok(Err(_panic)) => Err(LoadError::Panicked {
                name: spec.name.clone(),
            }),
            Ok(Ok(Err(source))) => Err(LoadError::Init {
                name: spec.name.clone(),
                source,
            }),
            Ok(Ok(Ok(()))) => Ok(LoadedConnector::new(
                spec.clone(),
                source,
                Arc::from(connector),
            )),
        }
    }
}
