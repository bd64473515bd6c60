//! Write-through cache in front of the KV engine.
//!
//! Only keys under one of the configured cacheable paths are kept. The cache
//! never answers for keys it does not hold, so dropping it wholesale is always
//! a safe way to re-establish consistency after a rollback.

use crate::storage::radix_tree::RadixTree;

pub struct DatabaseCache<V> {
    cacheable_paths: Vec<String>,
    cache: RadixTree<V>,
}

impl<V> Default for DatabaseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DatabaseCache<V> {
    pub fn new() -> Self {
        Self {
            cacheable_paths: Vec::new(),
            cache: RadixTree::new(),
        }
    }

    pub fn with_paths(paths: impl IntoIterator<Item = String>) -> Self {
        let mut cache = Self::new();
        for path in paths {
            cache.add_cacheable_path(path);
        }
        cache
    }

    pub fn add_cacheable_path(&mut self, path: String) {
        // already covered by a more general path
        if self.is_cacheable(&path) {
            return;
        }
        // the new path generalizes existing ones
        self.cacheable_paths.retain(|existing| !existing.starts_with(&path));
        self.cacheable_paths.push(path);
        self.cacheable_paths.sort();
    }

    pub fn is_cacheable(&self, key: &str) -> bool {
        self.cacheable_paths
            .iter()
            .any(|path| key.starts_with(path.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.cache.find(key)
    }

    pub fn set(&mut self, key: &str, value: V) -> bool {
        if !self.is_cacheable(key) {
            return false;
        }
        self.cache.insert(key, value);
        true
    }

    pub fn erase(&mut self, key: &str) {
        self.cache.erase(key);
    }

    pub fn filter_delete(&mut self, prefix: &str) {
        self.cache.filter_delete(prefix);
    }

    pub fn drop_all(&mut self) {
        self.cache = RadixTree::new();
    }
}
