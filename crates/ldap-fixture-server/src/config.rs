//! Server options and their resolved, immutable form.

use ldap_fixture_core::types::{DEFAULT_HOST, DEFAULT_ROOTDN, DEFAULT_SUFFIX};
use ldap_fixture_core::{DistinguishedName, Error, Result, Snapshot, TlsConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use validator::{Validate, ValidationError};

use crate::paths::{default_binary_dirs, default_schema_dirs, ToolPaths};

/// Length of generated admin passwords.
pub const GENERATED_PASSWORD_LEN: usize = 20;

/// Default schema list.
pub const DEFAULT_SCHEMAS: &[&str] = &["core.schema"];

/// Default startup timeout in seconds.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 15;

/// Everything a caller can configure about a fixture server.
///
/// Every field has a usable default; use the `with_*` methods to override.
#[derive(Debug, Clone, Validate)]
pub struct ServerOptions {
    /// DN of the root entry
    #[validate(length(min = 1), custom(function = "validate_dn"))]
    pub suffix: String,

    /// DN of the admin user
    #[validate(length(min = 1), custom(function = "validate_dn"))]
    pub rootdn: String,

    /// Admin password; empty means generate one
    pub rootpw: String,

    /// Schema files to include, by name or absolute path
    pub schemas: Vec<String>,

    /// Log and skip schemas that cannot be found instead of failing
    pub skip_missing_schemas: bool,

    /// Entries loaded after the root entry on every start and reset
    pub initial_data: Snapshot,

    /// How long to wait for the server to accept connections, in seconds
    #[validate(range(min = 1, max = 300))]
    pub startup_timeout_secs: u64,

    /// Listen port; `None` picks a free one
    pub port: Option<u16>,

    /// Listen host
    #[validate(length(min = 1))]
    pub host: String,

    /// slapd `-d` debug level
    pub slapd_debug: u32,

    /// Serve `ldaps://` with this material
    pub tls: Option<TlsConfig>,

    /// `host:port` of the control endpoint, if one should be started
    pub control_address: Option<String>,

    /// Directories searched for the OpenLDAP binaries
    pub binary_dirs: Option<Vec<PathBuf>>,

    /// Directories searched for `core.schema`
    pub schema_dirs: Option<Vec<PathBuf>>,
}

fn validate_dn(value: &str) -> std::result::Result<(), ValidationError> {
    DistinguishedName::parse(value)
        .map(drop)
        .map_err(|_| ValidationError::new("distinguished_name"))
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            rootdn: DEFAULT_ROOTDN.to_string(),
            rootpw: String::new(),
            schemas: DEFAULT_SCHEMAS.iter().map(ToString::to_string).collect(),
            skip_missing_schemas: false,
            initial_data: Snapshot::new(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            port: None,
            host: DEFAULT_HOST.to_string(),
            slapd_debug: 0,
            tls: None,
            control_address: None,
            binary_dirs: None,
            schema_dirs: None,
        }
    }
}

impl ServerOptions {
    /// Options with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Set the admin DN.
    #[must_use]
    pub fn with_rootdn(mut self, rootdn: impl Into<String>) -> Self {
        self.rootdn = rootdn.into();
        self
    }

    /// Set the admin password.
    #[must_use]
    pub fn with_rootpw(mut self, rootpw: impl Into<String>) -> Self {
        self.rootpw = rootpw.into();
        self
    }

    /// Replace the schema list.
    #[must_use]
    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Skip schemas that cannot be found.
    #[must_use]
    pub const fn with_skip_missing_schemas(mut self, skip: bool) -> Self {
        self.skip_missing_schemas = skip;
        self
    }

    /// Set the initial data.
    #[must_use]
    pub fn with_initial_data(mut self, data: Snapshot) -> Self {
        self.initial_data = data;
        self
    }

    /// Set the startup timeout.
    ///
    /// The timeout is kept in whole seconds; a fractional part rounds up.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs();
        self.startup_timeout_secs = if timeout.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        };
        self
    }

    /// Set the listen port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the listen host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the slapd debug level.
    #[must_use]
    pub const fn with_slapd_debug(mut self, level: u32) -> Self {
        self.slapd_debug = level;
        self
    }

    /// Serve over TLS.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Start a control endpoint on `address` together with the server.
    #[must_use]
    pub fn with_control_address(mut self, address: impl Into<String>) -> Self {
        self.control_address = Some(address.into());
        self
    }

    /// Search these directories for the OpenLDAP binaries.
    #[must_use]
    pub fn with_binary_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.binary_dirs = Some(dirs);
        self
    }

    /// Search these directories for `core.schema`.
    #[must_use]
    pub fn with_schema_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.schema_dirs = Some(dirs);
        self
    }

    /// Validates the options and resolves them against the local installation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid options, missing binaries or
    /// schemas, or when no free port can be found.
    pub fn resolve(self) -> Result<ServerConfig> {
        self.validate()
            .map_err(|err| Error::ConfigError(format!("Invalid configuration: {err}")))?;

        let binary_dirs = self.binary_dirs.unwrap_or_else(default_binary_dirs);
        let schema_dirs = self.schema_dirs.unwrap_or_else(default_schema_dirs);
        let tools = ToolPaths::discover(&binary_dirs, &schema_dirs)?;

        let mut schema_paths = Vec::with_capacity(self.schemas.len());
        for schema in &self.schemas {
            let path = tools.schema_path(schema);
            if path.is_file() {
                schema_paths.push(path);
            } else if self.skip_missing_schemas {
                warn!(schema = %path.display(), "schema not found, skipping");
            } else {
                return Err(Error::ConfigError(format!(
                    "schema {} not found",
                    path.display()
                )));
            }
        }

        let port = match self.port {
            Some(port) => port,
            None => find_available_port(&self.host)?,
        };
        let rootpw = if self.rootpw.is_empty() {
            generate_password()
        } else {
            self.rootpw
        };

        let config = ServerConfig {
            suffix: DistinguishedName::parse(&self.suffix)?,
            rootdn: self.rootdn,
            rootpw,
            schema_paths,
            host: self.host,
            port,
            slapd_debug: self.slapd_debug,
            tls: self.tls,
            control_address: self.control_address,
            initial_data: self.initial_data,
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            tools,
        };
        debug!(uri = %config.uri(), suffix = %config.suffix, "resolved server configuration");
        Ok(config)
    }
}

/// Validated, fully resolved server configuration.
///
/// Built once by [`ServerOptions::resolve`]; never changes afterwards.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// DN of the root entry
    pub suffix: DistinguishedName,
    /// DN of the admin user
    pub rootdn: String,
    /// Admin password
    pub rootpw: String,
    /// Schema files, in include order
    pub schema_paths: Vec<PathBuf>,
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// slapd `-d` debug level
    pub slapd_debug: u32,
    /// TLS material
    pub tls: Option<TlsConfig>,
    /// Control endpoint address
    pub control_address: Option<String>,
    /// Entries loaded after the root entry
    pub initial_data: Snapshot,
    /// Readiness deadline
    pub startup_timeout: Duration,
    /// OpenLDAP executables and schema directory
    pub tools: ToolPaths,
}

impl ServerConfig {
    /// LDAP URI of the server.
    #[must_use]
    pub fn uri(&self) -> String {
        ldap_fixture_core::types::ldap_uri(&self.host, self.port, self.tls.is_some())
    }
}

/// Generates an alphanumeric admin password.
#[must_use]
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Asks the OS for a free port on `host`.
///
/// The port is released before returning, so another process may grab it
/// before the server binds.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] if `host` cannot be bound.
pub fn find_available_port(host: &str) -> Result<u16> {
    let listener = TcpListener::bind((host, 0))
        .map_err(|err| Error::ConfigError(format!("cannot bind {host} to find a free port: {err}")))?;
    Ok(listener.local_addr()?.port())
}
