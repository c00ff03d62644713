use std::fmt;
use std::path::{Path, PathBuf};

/// Named local channel shared by a server and its clients.
///
/// On Unix this is the filesystem path of the socket file. On Windows it
/// is a pipe path of the form `\\.\pipe\<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    /// Use `path` verbatim as the endpoint.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform default endpoint for a short service name.
    #[cfg(unix)]
    pub fn from_name(name: &str) -> Self {
        Self::new(std::env::temp_dir().join(format!("{name}.sock")))
    }

    /// Platform default endpoint for a short service name.
    #[cfg(windows)]
    pub fn from_name(name: &str) -> Self {
        Self::new(format!(r"\\.\pipe\{name}"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<PathBuf> for Endpoint {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for Endpoint {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for Endpoint {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for Endpoint {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<&PathBuf> for Endpoint {
    fn from(path: &PathBuf) -> Self {
        Self::new(path.clone())
    }
}

impl AsRef<Path> for Endpoint {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
