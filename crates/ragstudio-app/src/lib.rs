//! ragstudio-app
//!
//! The coordination layer behind a RAG studio: one [`studio::Studio`] ties
//! together the storage repository, the knowledge index, the live models,
//! the settings document and per-user conversation threads.

pub mod config;
pub mod error;
pub mod preferences;
pub mod studio;
