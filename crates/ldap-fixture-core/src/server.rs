//! The capability shared by local and remote directory fixtures.
//!
//! Test code written against [`DirectoryServer`] runs unchanged whether it
//! drives an in-process server or a proxy talking to a control endpoint in
//! another process.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::ldif::{self, Entry, Snapshot};
use crate::types::{ldap_uri, TlsConfig};

/// Lifecycle and data operations of a disposable directory server.
#[async_trait]
pub trait DirectoryServer: Send + Sync {
    /// Starts the server if stopped; otherwise wipes it back to its initial data.
    async fn start(&self) -> Result<()>;

    /// Stops the server and removes its files. Safe to call repeatedly.
    async fn stop(&self) -> Result<()>;

    /// Restores the directory to the core entry plus the initial data.
    async fn reset(&self) -> Result<()>;

    /// Adds entries, parents before children.
    ///
    /// DNs that do not end with the suffix get it appended.
    async fn add(&self, data: &Snapshot) -> Result<()>;

    /// Fetches one entry; the suffix may be omitted from `dn`.
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) when the entry does not exist.
    async fn get(&self, dn: &str) -> Result<Entry>;

    /// Waits for the server process to exit.
    ///
    /// Returns [`Error::Timeout`](crate::Error::Timeout) if it is still running
    /// once `timeout` has elapsed. `None` waits indefinitely.
    async fn wait(&self, timeout: Option<Duration>) -> Result<()>;

    /// DN of the root entry.
    fn suffix(&self) -> &str;

    /// DN of the admin user.
    fn rootdn(&self) -> &str;

    /// Password of the admin user.
    fn rootpw(&self) -> &str;

    /// Host the server listens on.
    fn host(&self) -> &str;

    /// Port the server listens on.
    fn port(&self) -> u16;

    /// TLS material, when the server speaks `ldaps://`.
    fn tls_config(&self) -> Option<&TlsConfig>;

    /// LDAP URI clients should connect to.
    fn uri(&self) -> String {
        ldap_uri(self.host(), self.port(), self.tls_config().is_some())
    }

    /// Appends the suffix to `dn` unless it is already there.
    fn normalize_dn(&self, dn: &str) -> String {
        normalize_dn(dn, self.suffix())
    }

    /// Adds entries from LDIF text.
    async fn add_ldif(&self, text: &[u8]) -> Result<()> {
        let data = ldif::decode(text)?;
        self.add(&data).await
    }

    /// Fetches one entry rendered as a single-entry LDIF document.
    async fn get_ldif(&self, dn: &str) -> Result<String> {
        let dn = self.normalize_dn(dn);
        let entry = self.get(&dn).await?;
        ldif::encode(&Snapshot::new().with_entry(dn, entry))
    }
}

/// Appends `suffix` to `dn` unless `dn` already ends with it.
#[must_use]
pub fn normalize_dn(dn: &str, suffix: &str) -> String {
    if dn.is_empty() {
        suffix.to_string()
    } else if dn.ends_with(suffix) {
        dn.to_string()
    } else {
        format!("{dn},{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    /// Records what it is given and serves entries from a snapshot.
    struct Recorder {
        added: Mutex<Vec<Snapshot>>,
        entries: Snapshot,
    }

    #[async_trait]
    impl DirectoryServer for Recorder {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            Ok(())
        }

        async fn add(&self, data: &Snapshot) -> Result<()> {
            self.added.lock().unwrap().push(data.clone());
            Ok(())
        }

        async fn get(&self, dn: &str) -> Result<Entry> {
            self.entries
                .get(dn)
                .cloned()
                .ok_or_else(|| Error::NotFound(dn.to_string()))
        }

        async fn wait(&self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }

        fn suffix(&self) -> &str {
            "dc=example,dc=org"
        }

        fn rootdn(&self) -> &str {
            "cn=testadmin,dc=example,dc=org"
        }

        fn rootpw(&self) -> &str {
            "secret"
        }

        fn host(&self) -> &str {
            "localhost"
        }

        fn port(&self) -> u16 {
            3890
        }

        fn tls_config(&self) -> Option<&TlsConfig> {
            None
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            added: Mutex::new(Vec::new()),
            entries: Snapshot::new().with_entry(
                "ou=test,dc=example,dc=org",
                Entry::new().with_value("ou", "test"),
            ),
        }
    }

    #[tokio::test]
    async fn add_ldif_decodes_before_adding() {
        let server = recorder();
        server
            .add_ldif(b"version: 1\n\ndn: ou=new\nou: new\n")
            .await
            .unwrap();

        let added = server.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert!(added[0].contains("ou=new"));
    }

    #[tokio::test]
    async fn add_ldif_rejects_malformed_text() {
        let server = recorder();
        let err = server.add_ldif(b"dn: ou=new\ngarbage\n").await.unwrap_err();
        assert!(matches!(err, Error::LdifFormat(_)));
        assert!(server.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_ldif_keys_entry_by_full_dn() {
        let server = recorder();
        assert_eq!(
            server.get_ldif("ou=test").await.unwrap(),
            "version: 1\n\ndn: ou=test,dc=example,dc=org\nou: test\n"
        );
        assert!(server.get_ldif("ou=missing").await.unwrap_err().is_not_found());
    }

    #[test]
    fn uri_follows_tls_setting() {
        assert_eq!(recorder().uri(), "ldap://localhost:3890");
    }

    #[test]
    fn normalize_appends_missing_suffix() {
        assert_eq!(
            normalize_dn("ou=test", "dc=example,dc=org"),
            "ou=test,dc=example,dc=org"
        );
        assert_eq!(
            normalize_dn("ou=test,dc=example,dc=org", "dc=example,dc=org"),
            "ou=test,dc=example,dc=org"
        );
        assert_eq!(
            normalize_dn("dc=example,dc=org", "dc=example,dc=org"),
            "dc=example,dc=org"
        );
        assert_eq!(normalize_dn("", "dc=example,dc=org"), "dc=example,dc=org");
    }
}
