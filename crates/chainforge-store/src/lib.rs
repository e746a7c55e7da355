pub mod error;
pub mod memory;
pub mod record;
pub mod redb_store;
pub mod store;
pub mod tx;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::ProvisionStore;
pub use tx::StoreTx;

/// Marker written over provider credentials before the row is removed, so no
/// plaintext (or recoverable ciphertext) survives a delete.
pub const CREDENTIALS_TOMBSTONE: &str = "[DELETED]";
