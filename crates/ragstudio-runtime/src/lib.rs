//! ragstudio-runtime
//!
//! Owns the live model handles. Before a generation model is constructed,
//! the requested configuration is negotiated against what the accelerators
//! actually have free, so a handle is never built with a context window the
//! hardware cannot host.

pub mod builder;
pub mod error;
pub mod lifecycle;
pub mod negotiate;
pub mod profile;
pub mod resources;
