//! ragstudio-core
//!
//! Pure domain types, the conversation thread store, settings documents,
//! prompt templates, and storage-root layout conventions.
//! No AWS SDK dependency.

pub mod error;
pub mod layout;
pub mod models;
pub mod prompts;
pub mod runtime;
pub mod threads;
