//! ragstudio-vllm
//!
//! Model builder for locally hosted models. Each handle owns a `vllm serve`
//! process launched with the negotiated precision, context length and
//! tensor parallelism, and talks to it over its OpenAI compatible API.

pub mod builder;
pub mod chat;
pub mod embed;
pub mod error;
pub mod hub;
pub mod server;
