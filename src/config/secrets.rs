//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the database connection string.

pub use secrecy::{ExposeSecret, SecretString};
