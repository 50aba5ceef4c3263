//! ragstudio-bedrock
//!
//! Model builder for Amazon Bedrock: generation through the Converse API,
//! embeddings through Titan text embeddings.

pub mod builder;
pub mod catalog;
pub mod chat;
pub mod embed;
pub mod error;
