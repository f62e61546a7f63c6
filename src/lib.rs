//! Mutating admission webhook core: forces TLS onto Ingress objects created
//! in one namespace and answers the API server with a JSON patch.
//!
//! The HTTP server lives in the `tool` crate; everything here is synchronous
//! and free of I/O.

pub mod config_defs;
pub mod error;
pub mod mutate;
pub mod patch;
pub mod typings;

pub use config_defs::{Configuration, SecretRef};
pub use error::{Error, Result};
pub use mutate::Mutator;
