//! Maata: a small community-posting service backed by flat CSV tables.

pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod session;
pub mod storage;
pub mod table;
pub mod user_models;
pub mod user_storage;

pub use config::{Config, Limits};
pub use error::{StoreError, StoreResult};
pub use session::{Session, SessionRegistry};
pub use storage::PostStore;
pub use user_storage::UserStorage;
