//! The disposable directory server.

use async_trait::async_trait;
use ldap_fixture_control::ControlServer;
use ldap_fixture_core::ldif::{Entry, Snapshot};
use ldap_fixture_core::{DirectoryServer, Error, Result, TlsConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, ServerOptions};
use crate::process::ServerProcess;
use crate::slapd;
use crate::tools::{DirectoryClient, SystemToolRunner, ToolInvocation, ToolRunner};
use crate::workspace::Workspace;

/// A slapd instance living in a temporary directory.
///
/// Created stopped. [`start`](DirectoryServer::start) brings it up with the
/// root entry and the initial data; [`stop`](DirectoryServer::stop) removes
/// every trace of it. Owners must call [`stop`](DirectoryServer::stop) or
/// [`LdapServer::shutdown`] themselves: dropping a running server only logs a
/// warning and leaves slapd running.
pub struct LdapServer {
    config: ServerConfig,
    runner: Arc<dyn ToolRunner>,
    state: Mutex<ServerState>,
    control: Mutex<Option<ControlServer>>,
    this: Weak<LdapServer>,
}

#[derive(Default)]
struct ServerState {
    workspace: Option<Workspace>,
    process: Option<ServerProcess>,
    client: Option<DirectoryClient>,
}

impl ServerState {
    fn client(&self) -> Result<&DirectoryClient> {
        match (&self.process, &self.client) {
            (Some(_), Some(client)) => Ok(client),
            _ => Err(Error::InvalidState("server is not running".to_string())),
        }
    }
}

impl std::fmt::Debug for LdapServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapServer")
            .field("uri", &self.config.uri())
            .field("suffix", &self.config.suffix)
            .finish_non_exhaustive()
    }
}

impl LdapServer {
    /// Resolves `options` against the local OpenLDAP installation.
    ///
    /// The server is not started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid options or a missing installation.
    pub fn new(options: ServerOptions) -> Result<Arc<Self>> {
        Ok(Self::with_runner(options.resolve()?, Arc::new(SystemToolRunner)))
    }

    /// Builds a server from a resolved configuration and a tool runner.
    #[must_use]
    pub fn with_runner(config: ServerConfig, runner: Arc<dyn ToolRunner>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            runner,
            state: Mutex::new(ServerState::default()),
            control: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether slapd is running under this instance.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.process.is_some()
    }

    /// Process id of slapd while running.
    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.process.as_ref().map(ServerProcess::pid)
    }

    /// Workspace directory while running.
    pub async fn workspace_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .workspace
            .as_ref()
            .map(|workspace| workspace.path().to_path_buf())
    }

    /// Bound address of the control endpoint, once started.
    pub async fn control_address(&self) -> Option<SocketAddr> {
        self.control.lock().await.as_ref().map(ControlServer::local_addr)
    }

    /// Stops the server and the control endpoint.
    ///
    /// # Errors
    ///
    /// Returns the error of stopping the server; the endpoint is stopped
    /// regardless.
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self.stop().await;
        let control = self.control.lock().await.take();
        if let Some(mut control) = control {
            control.stop().await;
        }
        stopped
    }

    async fn launch(&self, state: &mut ServerState) -> Result<()> {
        let uri = self.config.uri();
        info!(uri = %uri, suffix = %self.config.suffix, "starting LDAP server");

        let workspace = state
            .workspace
            .insert(Workspace::create(self.config.tls.as_ref())?);
        let conf = slapd::write_config(&self.config, workspace)?;
        let conf = conf.display().to_string();
        let ca_bundle = workspace.has_tls().then(|| workspace.ca_bundle_path());

        let check = ToolInvocation {
            program: self.config.tools.slaptest.clone(),
            args: vec!["-f".to_string(), conf.clone(), "-u".to_string()],
            env: Vec::new(),
            stdin: None,
        };
        let output = self.runner.run(&check).await?;
        if !output.success() {
            let err = output.into_error(check.name());
            return Err(Error::ConfigError(format!("slapd.conf rejected: {err}")));
        }

        let args = vec![
            "-f".to_string(),
            conf,
            "-h".to_string(),
            uri,
            "-d".to_string(),
            self.config.slapd_debug.to_string(),
        ];
        let process = state
            .process
            .insert(ServerProcess::launch(&self.config.tools.slapd, &args)?);
        process
            .wait_ready(&self.config.host, self.config.port, self.config.startup_timeout)
            .await?;

        state.client = Some(DirectoryClient::new(
            self.runner.clone(),
            &self.config,
            ca_bundle,
        ));
        Ok(())
    }

    async fn populate(&self, client: &DirectoryClient) -> Result<()> {
        client.add(&core_entry(&self.config)).await?;
        if !self.config.initial_data.is_empty() {
            client.add(&self.config.initial_data).await?;
        }
        Ok(())
    }

    async fn start_control(&self) -> Result<()> {
        let Some(address) = &self.config.control_address else {
            return Ok(());
        };
        let mut control = self.control.lock().await;
        if control.is_none() {
            let target: Weak<dyn DirectoryServer> = self.this.clone();
            *control = Some(ControlServer::start(address, target).await?);
        }
        Ok(())
    }

    async fn teardown(state: &mut ServerState) -> Result<()> {
        let mut result = Ok(());
        state.client = None;
        if let Some(process) = state.process.take() {
            if let Err(err) = process.terminate().await {
                error!(error = %err, "failed to terminate slapd");
                result = Err(err);
            }
        }
        if let Some(mut workspace) = state.workspace.take() {
            if let Err(err) = workspace.destroy() {
                error!(error = %err, path = %workspace.path().display(), "failed to remove workspace");
                result = result.and(Err(err));
            }
        }
        result
    }
}

/// The root entry every server starts with.
#[must_use]
pub fn core_entry(config: &ServerConfig) -> Snapshot {
    Snapshot::new().with_entry(
        config.suffix.as_str(),
        Entry::new()
            .with_value("objectClass", "dcObject")
            .with_value("objectClass", "organization")
            .with_value("dc", config.suffix.leaf_value())
            .with_value("o", config.suffix.as_str()),
    )
}

#[async_trait]
impl DirectoryServer for LdapServer {
    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut result = if state.process.is_some() {
            debug!("server already running, clearing it");
            match state.client() {
                Ok(client) => client.clear().await,
                Err(err) => Err(err),
            }
        } else {
            self.launch(&mut state).await
        };
        if result.is_ok() {
            result = match state.client() {
                Ok(client) => self.populate(client).await,
                Err(err) => Err(err),
            };
        }
        if result.is_ok() {
            result = self.start_control().await;
        }

        if let Err(err) = result {
            warn!(error = %err, "start failed, rolling back");
            if let Err(cleanup) = Self::teardown(&mut state).await {
                warn!(error = %cleanup, "rollback was incomplete");
            }
            return Err(err);
        }
        info!(uri = %self.config.uri(), "LDAP server ready");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.process.is_none() && state.workspace.is_none() {
            debug!("server already stopped");
            return Ok(());
        }
        let result = Self::teardown(&mut state).await;
        info!(uri = %self.config.uri(), "LDAP server stopped");
        result
    }

    async fn reset(&self) -> Result<()> {
        let state = self.state.lock().await;
        let client = state.client()?;
        client.clear().await?;
        self.populate(client).await?;
        debug!("server reset to initial data");
        Ok(())
    }

    async fn add(&self, data: &Snapshot) -> Result<()> {
        let state = self.state.lock().await;
        state.client()?.add(data).await
    }

    async fn get(&self, dn: &str) -> Result<Entry> {
        let state = self.state.lock().await;
        state.client()?.get(dn).await
    }

    async fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let exit = {
            let state = self.state.lock().await;
            state.process.as_ref().map(ServerProcess::exit_watch)
        };
        match exit {
            Some(exit) => exit.wait(timeout).await.map(drop),
            None => Ok(()),
        }
    }

    fn suffix(&self) -> &str {
        self.config.suffix.as_str()
    }

    fn rootdn(&self) -> &str {
        &self.config.rootdn
    }

    fn rootpw(&self) -> &str {
        &self.config.rootpw
    }

    fn host(&self) -> &str {
        &self.config.host
    }

    fn port(&self) -> u16 {
        self.config.port
    }

    fn tls_config(&self) -> Option<&TlsConfig> {
        self.config.tls.as_ref()
    }
}

impl Drop for LdapServer {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(process) = &state.process {
            // slapd still reads its configuration and database from here.
            let workspace = state.workspace.take().map(Workspace::keep);
            warn!(
                pid = process.pid(),
                uri = %self.config.uri(),
                workspace = ?workspace,
                "LdapServer dropped while slapd is still running; call stop() or shutdown()"
            );
        }
    }
}
