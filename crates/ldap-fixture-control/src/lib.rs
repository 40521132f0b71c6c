//! Remote control for disposable LDAP test servers.
//!
//! [`ControlServer`] exposes one [`DirectoryServer`] over a small HTTP API so
//! a harness in another process can drive it; [`ProxyServer`] is the client
//! side of that API and implements the same trait.
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | `POST` | `/control/start` | 204 |
//! | `POST` | `/control/stop` | 204 |
//! | `POST` | `/control/reset` | 204 |
//! | `GET` | `/control/wait` | 204, or 504 while still running after five seconds |
//! | `GET` | `/config` | 200 JSON [`RemoteConfig`] |
//! | `GET` | `/entry/{dn}` | 200 `text/ldif` |
//! | `POST` | `/entry` | 201 |
//!
//! [`DirectoryServer`]: ldap_fixture_core::DirectoryServer

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod protocol;
pub mod proxy;
pub mod server;

pub use protocol::RemoteConfig;
pub use proxy::ProxyServer;
pub use server::ControlServer;

pub use ldap_fixture_core::{Error, Result};
