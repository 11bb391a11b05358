//! DW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DwError>;

/// Top-level error type for drivewatch.
#[derive(Debug, Error)]
pub enum DwError {
    #[error("[DW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DW-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[DW-2001] hotplug subsystem failure: {details}")]
    Hotplug { details: String },

    #[error("[DW-2002] mount table read failure: {details}")]
    MountTable { details: String },

    #[error("[DW-2003] storage probe failure for {path}: {details}")]
    StorageProbe { path: PathBuf, details: String },

    #[error("[DW-2004] storage path not found: {path}")]
    StorageNotFound { path: PathBuf },

    #[error("[DW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DW-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DwError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DW-1001",
            Self::MissingConfig { .. } => "DW-1002",
            Self::ConfigParse { .. } => "DW-1003",
            Self::UnsupportedPlatform { .. } => "DW-1101",
            Self::Hotplug { .. } => "DW-2001",
            Self::MountTable { .. } => "DW-2002",
            Self::StorageProbe { .. } => "DW-2003",
            Self::StorageNotFound { .. } => "DW-2004",
            Self::Serialization { .. } => "DW-2101",
            Self::Io { .. } => "DW-3002",
            Self::ChannelClosed { .. } => "DW-3003",
            Self::Runtime { .. } => "DW-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// The poller uses this to decide between keeping a device record for
    /// the next cycle and evicting it: a `StorageProbe` failure against a
    /// tracked record means the backing device is gone or unreadable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Hotplug { .. }
                | Self::MountTable { .. }
                | Self::StorageNotFound { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DwError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<DwError> {
        vec![
            DwError::InvalidConfig {
                details: String::new(),
            },
            DwError::MissingConfig {
                path: PathBuf::new(),
            },
            DwError::ConfigParse {
                context: "",
                details: String::new(),
            },
            DwError::UnsupportedPlatform {
                details: String::new(),
            },
            DwError::Hotplug {
                details: String::new(),
            },
            DwError::MountTable {
                details: String::new(),
            },
            DwError::StorageProbe {
                path: PathBuf::new(),
                details: String::new(),
            },
            DwError::StorageNotFound {
                path: PathBuf::new(),
            },
            DwError::Serialization {
                context: "",
                details: String::new(),
            },
            DwError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            DwError::ChannelClosed { component: "" },
            DwError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_errors();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_dw_prefix() {
        for err in &all_errors() {
            assert!(
                err.code().starts_with("DW-"),
                "code {} must start with DW-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = DwError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("DW-1001"),
            "display should contain error code: {msg}"
        );
        assert!(
            msg.contains("bad value"),
            "display should contain details: {msg}"
        );
    }

    #[test]
    fn storage_probe_is_not_retryable() {
        // A probe failure against a tracked record drives eviction, so it
        // must never be classed as retryable.
        assert!(
            !DwError::StorageProbe {
                path: PathBuf::from("/media/usb0"),
                details: "input/output error".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn transient_storage_absence_is_retryable() {
        assert!(
            DwError::StorageNotFound {
                path: PathBuf::from("/media/usb0"),
            }
            .is_retryable()
        );
        assert!(
            DwError::MountTable {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            DwError::Hotplug {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(
            !DwError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DwError::MissingConfig {
                path: PathBuf::new()
            }
            .is_retryable()
        );
        assert!(
            !DwError::UnsupportedPlatform {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = DwError::io(
            "/proc/self/mounts",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "DW-3002");
        assert!(err.to_string().contains("/proc/self/mounts"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DwError = json_err.into();
        assert_eq!(err.code(), "DW-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: DwError = toml_err.into();
        assert_eq!(err.code(), "DW-1003");
    }
}
