//! ragstudio-storage
//!
//! Versioned folder-of-files repositories: the snapshot repository trait,
//! an S3 implementation, and a local filesystem implementation.

pub mod client;
pub mod error;
pub mod local;
pub mod objects;
pub mod repository;
pub mod s3;
pub mod state;
