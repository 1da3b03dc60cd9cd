//! Runtime settings: defaults, file layer, overrides, validation.
//!
//! Settings are resolved once at startup from three layers, later layers
//! winning: built-in defaults, an optional TOML config file (`--config`),
//! and CLI/environment overrides collected by the binary. The resolved
//! [`Settings`] value is frozen: it is passed around by reference and never
//! mutated after the server is constructed.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors detected while loading or validating the configuration.
///
/// All of these are fatal at startup; the process exits with code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML (or has unknown keys)
    #[error("failed to parse config file {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The data file is missing or unreadable
    #[error("data file {} is missing or unreadable: {source}", path.display())]
    DataFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `max_workers` must admit at least one connection
    #[error("max_workers must be at least 1")]
    MaxWorkers,

    /// Buffers below 1 KiB defeat their purpose
    #[error("buffer_size must be at least 1024 bytes (got {0})")]
    BufferSize(usize),

    /// A zero-length query bound would reject every request
    #[error("max_query_bytes must be at least 1")]
    MaxQueryBytes,

    /// Rate limiting without a budget is a contradiction
    #[error("requests_per_minute must be at least 1 when rate limiting is enabled")]
    RequestsPerMinute,

    /// TLS is on but its PEM material is absent
    #[error("TLS is enabled but {role} file {} does not exist", path.display())]
    TlsMaterial { role: &'static str, path: PathBuf },
}

/// Immutable runtime configuration.
///
/// Field semantics follow the wire-visible behavior they control; see the
/// per-field docs. Timeouts are stored as [`Duration`]s, configured in
/// whole seconds.
#[derive(Debug, Clone)]
pub struct Settings {
    /// File whose lines form the membership set.
    pub data_path: PathBuf,
    /// True disables the index and cache; every query re-scans the file.
    pub reread_on_query: bool,
    /// Listening host.
    pub host: String,
    /// Listening port. 0 lets the OS pick (used by tests).
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Concurrent connection cap; excess connections are closed at accept.
    pub max_workers: usize,
    /// LRU entries for the lookup cache; 0 disables the cache.
    pub cache_capacity: usize,
    /// Read buffer size for sockets and file scans.
    pub buffer_size: usize,
    /// Hard upper bound on one request.
    pub max_query_bytes: usize,
    /// Wrap accepted sockets in TLS.
    pub tls_enabled: bool,
    /// PEM certificate chain.
    pub tls_cert: PathBuf,
    /// PEM private key.
    pub tls_key: PathBuf,
    /// When set, clients must present a certificate signed by this CA.
    pub tls_client_ca: Option<PathBuf>,
    /// Apply the per-IP sliding-window limiter.
    pub rate_limit_enabled: bool,
    /// Budget per client IP per 60-second window.
    pub requests_per_minute: usize,
    /// Deadline for reading one query.
    pub read_timeout: Duration,
    /// Deadline for writing the response.
    pub write_timeout: Duration,
    /// How long shutdown waits for in-flight connections.
    pub shutdown_grace: Duration,
    /// Default log filter when RUST_LOG is not set.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/200k.txt"),
            reread_on_query: false,
            host: "127.0.0.1".to_string(),
            port: 44445,
            backlog: 128,
            max_workers: 100,
            cache_capacity: 10_000,
            buffer_size: 1024 * 1024,
            max_query_bytes: 1024 * 1024,
            tls_enabled: false,
            tls_cert: PathBuf::from("ssl/server.crt"),
            tls_key: PathBuf::from("ssl/server.key"),
            tls_client_ca: None,
            rate_limit_enabled: true,
            requests_per_minute: 1000,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Resolves settings from the file layer plus overrides.
    pub fn load(
        config_file: Option<&Path>,
        overrides: PartialSettings,
    ) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        if let Some(path) = config_file {
            settings.apply(PartialSettings::from_file(path)?);
        }
        settings.apply(overrides);
        Ok(settings)
    }

    /// Checks the resolved settings for contradictions and missing files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Open rather than stat: catches unreadable as well as missing.
        fs::File::open(&self.data_path).map_err(|source| ConfigError::DataFile {
            path: self.data_path.clone(),
            source,
        })?;

        if self.max_workers == 0 {
            return Err(ConfigError::MaxWorkers);
        }
        if self.buffer_size < 1024 {
            return Err(ConfigError::BufferSize(self.buffer_size));
        }
        if self.max_query_bytes == 0 {
            return Err(ConfigError::MaxQueryBytes);
        }
        if self.rate_limit_enabled && self.requests_per_minute == 0 {
            return Err(ConfigError::RequestsPerMinute);
        }

        if self.tls_enabled {
            for (role, path) in [("certificate", &self.tls_cert), ("key", &self.tls_key)] {
                if !path.exists() {
                    return Err(ConfigError::TlsMaterial {
                        role,
                        path: path.clone(),
                    });
                }
            }
            if let Some(ca) = &self.tls_client_ca {
                if !ca.exists() {
                    return Err(ConfigError::TlsMaterial {
                        role: "client CA",
                        path: ca.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the bind address as a string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn apply(&mut self, layer: PartialSettings) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = layer.$field {
                    self.$field = value;
                }
            };
        }
        take!(data_path);
        take!(reread_on_query);
        take!(host);
        take!(port);
        take!(backlog);
        take!(max_workers);
        take!(cache_capacity);
        take!(buffer_size);
        take!(max_query_bytes);
        take!(tls_enabled);
        take!(tls_cert);
        take!(tls_key);
        take!(rate_limit_enabled);
        take!(requests_per_minute);
        take!(log_level);
        if let Some(path) = layer.tls_client_ca {
            self.tls_client_ca = Some(path);
        }
        if let Some(secs) = layer.read_timeout {
            self.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = layer.write_timeout {
            self.write_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = layer.shutdown_grace {
            self.shutdown_grace = Duration::from_secs(secs);
        }
    }
}

/// One configuration layer: every option, all optional.
///
/// This is both the deserialization target for the TOML config file and
/// the shape in which the binary hands over its CLI/env values.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialSettings {
    pub data_path: Option<PathBuf>,
    pub reread_on_query: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub backlog: Option<u32>,
    pub max_workers: Option<usize>,
    pub cache_capacity: Option<usize>,
    pub buffer_size: Option<usize>,
    pub max_query_bytes: Option<usize>,
    pub tls_enabled: Option<bool>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub tls_client_ca: Option<PathBuf>,
    pub rate_limit_enabled: Option<bool>,
    pub requests_per_minute: Option<usize>,
    /// Seconds.
    pub read_timeout: Option<u64>,
    /// Seconds.
    pub write_timeout: Option<u64>,
    /// Seconds.
    pub shutdown_grace: Option<u64>,
    pub log_level: Option<String>,
}

impl PartialSettings {
    /// Parses one TOML config file into a layer.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
