//! Core domain logic for the Sanitas hospital management system.
//!
//! Everything here is transport-agnostic: the REST crate and the CLI both
//! sit on top of these services. State lives in SQLite behind [`Store`];
//! live updates fan out through the in-process [`EventBus`].

pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod events;
pub mod export;
pub mod rbac;
pub mod repositories;
pub mod search;
pub mod seed;
pub mod sequence;

pub use config::CoreConfig;
pub use db::Store;
pub use error::{HmisError, HmisResult};
pub use events::EventBus;
