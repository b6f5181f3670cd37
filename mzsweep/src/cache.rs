use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use identity_hash::BuildIdentityHasher;
use tracing::debug;

use crate::scan_store::{ScanStore, ScanStoreError};

/// Parsed [`ScanStore`]s keyed by a hash of their source, so that selecting the same
/// dataset again does not re-parse it.
#[derive(Debug, Default, Clone)]
pub struct StoreCache {
    stores: HashMap<u64, Arc<ScanStore>, BuildIdentityHasher<u64>>,
}

pub fn content_key(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stores.contains_key(&content_key(key.as_bytes()))
    }

    pub fn clear(&mut self) {
        self.stores.clear()
    }

    /// Parse `bytes` unless identical content was loaded before
    pub fn get_or_load(&mut self, bytes: &[u8]) -> Result<Arc<ScanStore>, ScanStoreError> {
        self.get_or_insert_with(content_key(bytes), || Ok(bytes.to_vec()))
    }

    /// Look up a caller-chosen key such as a URL or path, calling `fetch` for the raw
    /// bytes only on a miss. A failed load leaves the cache untouched.
    pub fn get_or_load_keyed<F>(&mut self, key: &str, fetch: F) -> Result<Arc<ScanStore>, ScanStoreError>
    where
        F: FnOnce() -> Result<Vec<u8>, ScanStoreError>,
    {
        self.get_or_insert_with(content_key(key.as_bytes()), fetch)
    }

    fn get_or_insert_with<F>(&mut self, key: u64, fetch: F) -> Result<Arc<ScanStore>, ScanStoreError>
    where
        F: FnOnce() -> Result<Vec<u8>, ScanStoreError>,
    {
        if let Some(store) = self.stores.get(&key) {
            debug!("Cache hit for {key:016x}");
            return Ok(Arc::clone(store));
        }
        debug!("Cache miss for {key:016x}");
        let bytes = fetch()?;
        let store = Arc::new(ScanStore::load(&bytes)?);
        self.stores.insert(key, Arc::clone(&store));
        Ok(store)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test_log::test]
    fn test_reuse() -> Result<(), ScanStoreError> {
        let bytes = fs::read("../test/data/energy_ramp.mzML")?;
        let mut cache = StoreCache::new();
        let a = cache.get_or_load(&bytes)?;
        let b = cache.get_or_load(&bytes)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(a.len(), 11);

        let gz = fs::read("../test/data/energy_ramp.mzML.gz")?;
        let c = cache.get_or_load(&gz)?;
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
        Ok(())
    }

    #[test_log::test]
    fn test_keyed() -> Result<(), ScanStoreError> {
        let mut cache = StoreCache::new();
        let err = cache.get_or_load_keyed("bad.mzML", || Ok(b"not a spectrum file".to_vec()));
        assert!(matches!(err, Err(ScanStoreError::NotMzML)));
        assert!(cache.is_empty());

        let key = "../test/data/energy_ramp.mzML";
        cache.get_or_load_keyed(key, || Ok(fs::read("../test/data/energy_ramp.mzML")?))?;
        let mut called = false;
        assert!(cache.contains(key));
        cache.get_or_load_keyed(key, || {
            called = true;
            Ok(Vec::new())
        })?;
        assert!(!called);
        Ok(())
    }
}
