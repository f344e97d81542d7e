pub mod kv_lock;
pub mod kv_store;
pub mod table_lock;

pub use kv_lock::{KvLock, KvLockFactory};
pub use kv_store::{InMemoryKvStore, KvStore};
pub use table_lock::{TableLock, TableLockFactory};
