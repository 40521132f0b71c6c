//! # ldap-fixture-server
//!
//! Disposable OpenLDAP servers for integration tests.
//!
//! An [`LdapServer`] renders a `slapd.conf` into a temporary directory, runs
//! `slapd` on a free port and loads a root entry plus optional initial data.
//! Tests then add and read entries through the OpenLDAP command-line clients,
//! reset the directory between cases and stop it when done.
//!
//! ## Example
//!
//! ```no_run
//! use ldap_fixture_server::{DirectoryServer, LdapServer, ServerOptions};
//!
//! # async fn example() -> ldap_fixture_server::Result<()> {
//! let server = LdapServer::new(ServerOptions::new().with_rootpw("secret"))?;
//! server.start().await?;
//! let root = server.get("dc=example,dc=org").await?;
//! assert_eq!(root.first_str("dc"), Some("example"));
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Options, defaults and the resolved configuration
//! - [`paths`] - Locating the OpenLDAP binaries and schemas
//! - [`workspace`] - The per-instance temporary directory
//! - [`slapd`] - `slapd.conf` rendering
//! - [`process`] - Supervision of the slapd process
//! - [`tools`] - Directory operations via `ldapadd`/`ldapsearch`/`ldapdelete`
//! - [`server`] - The [`LdapServer`] lifecycle

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod paths;
pub mod process;
pub mod server;
pub mod slapd;
pub mod tools;
pub mod workspace;

pub use config::{ServerConfig, ServerOptions};
pub use paths::ToolPaths;
pub use server::LdapServer;

pub use ldap_fixture_core::{DirectoryServer, Entry, Error, Result, Snapshot, TlsConfig};
