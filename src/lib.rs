pub mod animation;
pub mod chat;
pub mod error;
pub mod events;
pub mod extract;
pub mod llm;
pub mod look;
pub mod model;
pub mod paths;
pub mod pattern;
pub mod prompt;
pub mod settings;
pub mod storage;
pub mod store;
pub mod transport;
pub mod validate;
