pub mod adapter;
pub mod backend;

pub use adapter::{keys, ChangeEvent, StorageDirs, StoreAdapter, StoreTarget, CURRENT_VERSION};
pub use backend::{payload_size, FileStore, QuotaLimits, SYNCED_QUOTA};
