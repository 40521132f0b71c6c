//! HTTP endpoint forwarding control requests to a directory server.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ldap_fixture_core::{DirectoryServer, Error, Result};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::protocol::{RemoteConfig, LDIF_CONTENT_TYPE, REMOTE_WAIT_SLICE};

/// A running control endpoint.
///
/// The endpoint only holds a weak reference to its directory server; requests
/// that arrive after the server was dropped are answered with 503. Call
/// [`ControlServer::stop`] to shut it down, dropping it merely signals the
/// background task without waiting for it.
#[derive(Debug)]
pub struct ControlServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
struct ControlState {
    target: Weak<dyn DirectoryServer>,
}

impl ControlState {
    fn target(&self) -> Result<Arc<dyn DirectoryServer>> {
        self.target
            .upgrade()
            .ok_or_else(|| Error::ServiceUnavailable("directory server has been dropped".into()))
    }
}

impl ControlServer {
    /// Binds `addr` (`host:port`, port 0 picks a free one) and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the address cannot be bound.
    pub async fn start(addr: &str, target: Weak<dyn DirectoryServer>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| Error::ConfigError(format!("cannot bind control address {addr}: {err}")))?;
        let local_addr = listener.local_addr()?;

        let app = router(ControlState { target });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "control endpoint terminated");
            }
        });

        info!(address = %local_addr, "control endpoint listening");

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address the endpoint is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL for a [`ProxyServer`](crate::ProxyServer).
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/", self.local_addr)
    }

    /// Stops accepting requests, lets in-flight ones finish and joins the task.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "control endpoint task did not finish cleanly");
            }
            info!(address = %self.local_addr, "control endpoint stopped");
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn router(state: ControlState) -> Router {
    Router::new()
        .route("/control/start", post(start_server))
        .route("/control/stop", post(stop_server))
        .route("/control/reset", post(reset_server))
        .route("/control/wait", get(wait_server))
        .route("/config", get(config))
        .route("/entry", post(add_entries))
        .route("/entry/*dn", get(get_entry))
        .with_state(state)
}

/// Error rendered as a plain-text response with its mapped status.
struct ControlError(Error);

impl From<Error> for ControlError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.0.should_log() {
            error!(code = self.0.error_code(), error = %self.0, "control request failed");
        } else {
            debug!(code = self.0.error_code(), error = %self.0, "control request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

type Handled<T> = std::result::Result<T, ControlError>;

async fn start_server(State(state): State<ControlState>) -> Handled<StatusCode> {
    state.target()?.start().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_server(State(state): State<ControlState>) -> Handled<StatusCode> {
    state.target()?.stop().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_server(State(state): State<ControlState>) -> Handled<StatusCode> {
    state.target()?.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn wait_server(State(state): State<ControlState>) -> Handled<StatusCode> {
    state.target()?.wait(Some(REMOTE_WAIT_SLICE)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn config(State(state): State<ControlState>) -> Handled<Json<RemoteConfig>> {
    let target = state.target()?;
    Ok(Json(RemoteConfig {
        suffix: target.suffix().to_string(),
        rootdn: target.rootdn().to_string(),
        rootpw: target.rootpw().to_string(),
        port: target.port(),
        host: target.host().to_string(),
        tls_root: target.tls_config().map(|tls| tls.root.clone()),
    }))
}

async fn get_entry(State(state): State<ControlState>, Path(dn): Path<String>) -> Handled<Response> {
    let dn = dn.trim_start_matches('/');
    let body = state.target()?.get_ldif(dn).await?;
    Ok(([(header::CONTENT_TYPE, LDIF_CONTENT_TYPE)], body).into_response())
}

async fn add_entries(State(state): State<ControlState>, body: Bytes) -> Handled<StatusCode> {
    state.target()?.add_ldif(&body).await?;
    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ControlError(err).into_response().status()
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Error::Timeout("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(Error::LdifFormat("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::ServiceUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::InvalidState("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn bind_failure_is_config_error() {
        let err = ControlServer::start("not an address", Weak::<NoServer>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    struct NoServer;

    #[async_trait::async_trait]
    impl DirectoryServer for NoServer {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn reset(&self) -> Result<()> {
            Ok(())
        }
        async fn add(&self, _data: &ldap_fixture_core::Snapshot) -> Result<()> {
            Ok(())
        }
        async fn get(&self, dn: &str) -> Result<ldap_fixture_core::Entry> {
            Err(Error::NotFound(dn.to_string()))
        }
        async fn wait(&self, _timeout: Option<std::time::Duration>) -> Result<()> {
            Ok(())
        }
        fn suffix(&self) -> &str {
            "dc=example,dc=org"
        }
        fn rootdn(&self) -> &str {
            "cn=testadmin,dc=example,dc=org"
        }
        fn rootpw(&self) -> &str {
            ""
        }
        fn host(&self) -> &str {
            "localhost"
        }
        fn port(&self) -> u16 {
            389
        }
        fn tls_config(&self) -> Option<&ldap_fixture_core::TlsConfig> {
            None
        }
    }
}
