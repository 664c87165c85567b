pub mod kv;
pub mod store;

pub use kv::{FileKv, KvStore, MemoryKv, StoreError};
pub use store::{RuleStore, StoreStats};
