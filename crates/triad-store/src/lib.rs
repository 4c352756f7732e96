pub mod database;
pub mod error;
pub mod memory;
pub mod messages;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod store;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use messages::MessageRow;
pub use sessions::SessionRow;
pub use store::{RunArchive, RunStore, SqliteStore};
