//! ragstudio-search
//!
//! Knowledge index lifecycle: open from a storage root, ingest documents,
//! persist locally, checkpoint to a snapshot repository, and build the
//! request-scoped query and chat engines over it.

pub mod chunk;
pub mod docstore;
pub mod engine;
pub mod error;
pub mod loader;
pub mod store;
pub mod vectors;
