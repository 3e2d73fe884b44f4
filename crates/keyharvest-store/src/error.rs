//! Error types for cache artifacts and checkpoints

use std::fmt;
use std::path::PathBuf;

/// Failure reading or writing a cache artifact.
#[derive(Debug)]
pub enum CacheError {
    /// Filesystem failure (permissions, disk full, ...).
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The artifact exists but cannot be decoded.
    Corrupt { path: PathBuf, message: String },
    /// The record set could not be serialized.
    Encode { path: PathBuf, message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Encode {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Corruption is recoverable: callers treat it as a cache miss.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "IO error on {}: {source}", path.display()),
            Self::Corrupt { path, message } => {
                write!(f, "corrupt artifact {}: {message}", path.display())
            }
            Self::Encode { path, message } => {
                write!(f, "cannot serialize {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure loading or saving a checkpoint.
#[derive(Debug)]
pub enum CheckpointError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Corrupt { path: PathBuf, message: String },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "checkpoint IO error on {}: {source}", path.display())
            }
            Self::Corrupt { path, message } => {
                write!(f, "corrupt checkpoint {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Corrupt { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn only_corrupt_is_corruption() {
        assert!(CacheError::corrupt("a.csv", "bad header").is_corruption());
        assert!(!CacheError::encode("a.csv", "x").is_corruption());
        let io = CacheError::io("a.csv", std::io::Error::new(ErrorKind::PermissionDenied, "no"));
        assert!(!io.is_corruption());
    }

    #[test]
    fn display_names_path() {
        let err = CacheError::corrupt("cache/bluesky_fatf.json", "expected value");
        let msg = err.to_string();
        assert!(msg.contains("cache/bluesky_fatf.json"));
        assert!(msg.contains("expected value"));
    }

    #[test]
    fn checkpoint_io_has_source() {
        use std::error::Error;
        let err = CheckpointError::Io {
            path: "x.json".into(),
            source: std::io::Error::new(ErrorKind::StorageFull, "full"),
        };
        assert!(err.source().is_some());
    }
}
