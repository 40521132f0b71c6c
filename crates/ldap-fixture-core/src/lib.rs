//! # ldap-fixture-core
//!
//! Core types and utilities shared by the disposable LDAP server fixture.
//!
//! This crate holds everything that does not need an OpenLDAP installation:
//! the error taxonomy, the LDIF interchange codec, distinguished names and the
//! [`DirectoryServer`] contract implemented both by the local server and by the
//! remote control proxy.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and error codes
//! - [`ldif`] - LDIF encoder/decoder and the [`Entry`]/[`Snapshot`] data model
//! - [`dn`] - Distinguished name parsing
//! - [`types`] - TLS material and shared constants
//! - [`server`] - The [`DirectoryServer`] capability trait
//! - [`client`] - HTTP client settings for talking to a control endpoint

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod dn;
pub mod error;
pub mod ldif;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use dn::{DistinguishedName, DistinguishedNameError};
pub use error::{Error, Result};
pub use ldif::{Entry, Snapshot};
pub use server::DirectoryServer;
pub use types::TlsConfig;
