//! Network side of the gallery mirror.
//!
//! Provides the [`transport`] seam and its reqwest implementation,
//! outgoing [`headers`] sanitization, the unbounded [`retry`] loop, the
//! paginated [`gallery`] cursor, and the read-through model metadata
//! [`lookup`].

pub mod gallery;
pub mod headers;
pub mod lookup;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;
