//! Wire types and constants shared by both ends of the control API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long `GET /control/wait` blocks before answering 504.
pub const REMOTE_WAIT_SLICE: Duration = Duration::from_secs(5);

/// Media type of LDIF request and response bodies.
pub const LDIF_CONTENT_TYPE: &str = "text/ldif";

/// Body of `GET /config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// DN of the root entry
    pub suffix: String,
    /// DN of the admin user
    pub rootdn: String,
    /// Password of the admin user
    pub rootpw: String,
    /// LDAP port
    pub port: u16,
    /// LDAP host
    pub host: String,
    /// Trust-root PEM when the server speaks `ldaps://`
    pub tls_root: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_serializes_missing_root_as_null() {
        let config = RemoteConfig {
            suffix: "dc=example,dc=org".to_string(),
            rootdn: "cn=testadmin,dc=example,dc=org".to_string(),
            rootpw: "secret".to_string(),
            port: 3890,
            host: "localhost".to_string(),
            tls_root: None,
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["tls_root"], serde_json::Value::Null);
        assert_eq!(value["port"], 3890);

        let back: RemoteConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
