//! [`DirectoryServer`] implementation backed by a remote control endpoint.

use async_trait::async_trait;
use ldap_fixture_core::client::ClientConfig;
use ldap_fixture_core::ldif::{self, Entry, Snapshot};
use ldap_fixture_core::{DirectoryServer, Error, Result, TlsConfig};
use reqwest::{header, Client, ClientBuilder, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::protocol::{RemoteConfig, LDIF_CONTENT_TYPE};

const USER_AGENT: &str = concat!("ldap-fixture-control/", env!("CARGO_PKG_VERSION"));

/// Drives a directory server living in another process.
///
/// The connection settings are fetched once, in [`ProxyServer::connect`];
/// every operation afterwards is one or more HTTP requests.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    http: Client,
    base_url: Url,
    config: RemoteConfig,
    tls: Option<TlsConfig>,
}

impl ProxyServer {
    /// Connects to the control endpoint at `base_url` with default HTTP settings.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or `GET /config` does not succeed.
    pub async fn connect(base_url: &str) -> Result<Self> {
        Self::connect_with(base_url, &ClientConfig::default()).await
    }

    /// Connects using the given HTTP client settings.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid, the HTTP client cannot be built or
    /// `GET /config` does not succeed.
    pub async fn connect_with(base_url: &str, http_config: &ClientConfig) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(http_config.timeout)
            .connect_timeout(http_config.connect_timeout)
            .pool_idle_timeout(http_config.pool_idle_timeout)
            .pool_max_idle_per_host(http_config.pool_max_idle_per_host)
            .build()
            .map_err(|err| Error::ConfigError(format!("Failed to build HTTP client: {err}")))?;

        let response = http.get(base_url.join("config")?).send().await?;
        let config: RemoteConfig = check(response).await?.json().await?;
        let tls = config.tls_root.clone().map(TlsConfig::root_only);

        info!(url = %base_url, suffix = %config.suffix, "connected to control endpoint");

        Ok(Self {
            http,
            base_url,
            config,
            tls,
        })
    }

    /// Base URL of the control endpoint.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn control(&self, action: &str) -> Result<()> {
        let url = self.base_url.join(&format!("control/{action}"))?;
        debug!(%url, "sending control request");
        let response = self.http.post(url).send().await?;
        check(response).await.map(drop)
    }

    fn entry_url(&self, dn: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::ConfigError(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("entry")
            .push(dn);
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::GATEWAY_TIMEOUT => Error::Timeout(message),
        status => Error::RemoteFailure {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl DirectoryServer for ProxyServer {
    async fn start(&self) -> Result<()> {
        self.control("start").await
    }

    async fn stop(&self) -> Result<()> {
        self.control("stop").await
    }

    async fn reset(&self) -> Result<()> {
        self.control("reset").await
    }

    async fn add(&self, data: &Snapshot) -> Result<()> {
        let url = self.base_url.join("entry")?;
        let body = ldif::encode(data)?;
        let response = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, LDIF_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        check(response).await.map(drop)
    }

    async fn get(&self, dn: &str) -> Result<Entry> {
        let response = self.http.get(self.entry_url(dn)?).send().await?;
        let body = check(response).await?.bytes().await?;
        let snapshot = ldif::decode(&body)?;
        if snapshot.len() != 1 {
            return Err(Error::LdifFormat(format!(
                "expected one entry for {dn}, got {}",
                snapshot.len()
            )));
        }
        snapshot
            .into_iter()
            .next()
            .map(|(_, entry)| entry)
            .ok_or_else(|| Error::NotFound(dn.to_string()))
    }

    async fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let url = self.base_url.join("control/wait")?;
        loop {
            let response = self.http.get(url.clone()).send().await?;
            match check(response).await {
                Ok(_) => return Ok(()),
                Err(Error::Timeout(_)) if deadline.map_or(true, |d| Instant::now() < d) => {
                    debug!("remote server still running");
                }
                Err(Error::Timeout(_)) => {
                    return Err(Error::Timeout(format!(
                        "server at {} still running",
                        self.uri()
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn suffix(&self) -> &str {
        &self.config.suffix
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
        self.tls.as_ref()
    }
}
