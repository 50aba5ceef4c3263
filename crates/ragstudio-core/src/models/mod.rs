pub mod chat;
pub mod commit;
pub mod node;
pub mod preferences;
pub mod sampling;
pub mod settings;
