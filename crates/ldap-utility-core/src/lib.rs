//! # ldap-utility-core
//!
//! Core types shared by the ldap-utility crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for directory operations
//! - [`status`] - Protocol result codes and the status reported by a connection

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod status;

// Re-export commonly used types
pub use error::{Error, Result};
pub use status::LdapStatus;
