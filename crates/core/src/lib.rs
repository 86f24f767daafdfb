//! Domain core of the gallery mirror.
//!
//! Holds everything that does not touch the network: the adaptive
//! [`backoff`] policy, the typed gallery [`schema`], the on-disk
//! [`cache`] of model metadata, and the [`asset`] layout that decides
//! where an image and its sidecars land and which timestamps they carry.

pub mod asset;
pub mod backoff;
pub mod cache;
pub mod error;
pub mod fs;
pub mod schema;
