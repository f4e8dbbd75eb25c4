//! Local persistence, consumed as a get/set byte-map.

mod file;
mod memory;
mod records;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use records::{
    delete_pairing_record, delete_user_cache, load_cached_keystore, load_keystore_tag,
    load_pairing_record, save_cached_keystore, save_keystore_tag, save_pairing_record,
    PairedUser, PairingRecord,
};

use crate::error::Result;

/// Durable key/value storage for the pairing record and encrypted keystore cache.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
