//! Shared fixture types.

use serde::{Deserialize, Serialize};

/// Default suffix of the fixture directory.
pub const DEFAULT_SUFFIX: &str = "dc=example,dc=org";
/// Default admin DN.
pub const DEFAULT_ROOTDN: &str = "cn=testadmin,dc=example,dc=org";
/// Default LDAP host.
pub const DEFAULT_HOST: &str = "localhost";

/// PEM material used to serve the directory over TLS.
///
/// The fixture never generates certificates; callers hand in ready-made PEM
/// blobs which are written to the server's workspace at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Trust root clients should use to verify the server.
    pub root: String,
    /// Certificate chain presented by the server, in order.
    pub chain: Vec<String>,
    /// Leaf certificate.
    pub certificate: String,
    /// Private key of the leaf certificate.
    pub key: String,
}

impl TlsConfig {
    /// Creates a TLS configuration from its four PEM parts.
    #[must_use]
    pub fn new(
        root: impl Into<String>,
        chain: Vec<String>,
        certificate: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            chain,
            certificate: certificate.into(),
            key: key.into(),
        }
    }

    /// A configuration that only knows the trust root.
    ///
    /// This is what a remote proxy learns from the control endpoint: enough to
    /// verify the server, nothing to impersonate it.
    #[must_use]
    pub fn root_only(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            chain: Vec::new(),
            certificate: String::new(),
            key: String::new(),
        }
    }

    /// The chain certificates, trimmed and joined into one PEM bundle.
    #[must_use]
    pub fn chain_pem(&self) -> String {
        self.chain
            .iter()
            .map(|cert| cert.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Listen URI for a directory server.
///
/// `ldaps://` is used whenever TLS material is configured.
#[must_use]
pub fn ldap_uri(host: &str, port: u16, tls: bool) -> String {
    let scheme = if tls { "ldaps" } else { "ldap" };
    format!("{scheme}://{host}:{port}")
}
