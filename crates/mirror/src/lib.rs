//! `galsync-mirror` library crate.
//!
//! Configuration, token resolution and logging setup for the mirror
//! binary, exposed for integration testing.  The entrypoint lives in
//! `main.rs`.

pub mod config;
pub mod logging;
pub mod token;
