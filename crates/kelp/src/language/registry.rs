use crate::error::LoadError;
use crate::language::Language;
use hashbrown::HashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(16) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

/// Maps language ids to compiled blobs and loads them on demand.
///
/// Blobs are decoded the first time an id is requested; the resulting
/// handles are kept in a bounded LRU cache. Registering a blob under an id
/// that was already loaded drops the cached handle.
pub struct LanguageRegistry {
    blobs: RwLock<HashMap<String, Arc<[u8]>, ahash::RandomState>>,
    loaded: Mutex<(LruCache<String, Language>, RegistryStats)>,
}

impl LanguageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            blobs: RwLock::new(HashMap::default()),
            loaded: Mutex::new((LruCache::new(capacity), RegistryStats::default())),
        }
    }

    pub fn register(&self, id: impl Into<String>, blob: impl Into<Arc<[u8]>>) {
        let id = id.into();
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .pop(&id);
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, blob.into());
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Load the language registered under `id`.
    ///
    /// # Errors
    ///
    /// [`LoadError::UnknownLanguage`] if nothing is registered under `id`,
    /// otherwise whatever [`Language::from_blob`] reports.
    pub fn load(&self, id: &str) -> Result<Language, LoadError> {
        {
            let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            let (cache, stats) = &mut *loaded;
            if let Some(language) = cache.get(id) {
                stats.hits += 1;
                return Ok(language.clone());
            }
            stats.misses += 1;
        }

        let blob = self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::UnknownLanguage { id: id.to_owned() })?;
        let language = Language::from_blob(&blob)?;

        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        let (cache, stats) = &mut *loaded;
        if cache.len() >= cache.cap().get() && !cache.contains(id) {
            stats.evictions += 1;
        }
        cache.put(id.to_owned(), language.clone());
        Ok(language)
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("ids", &self.ids())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_language() {
        let registry = LanguageRegistry::new();
        assert_eq!(
            registry.load("nope").unwrap_err(),
            LoadError::UnknownLanguage { id: "nope".into() }
        );
        assert_eq!(registry.stats().misses, 1);
    }

    #[test]
    fn test_corrupt_blob_is_reported() {
        let registry = LanguageRegistry::new();
        registry.register("broken", b"KELP".to_vec());
        assert!(registry.contains("broken"));
        assert!(matches!(
            registry.load("broken"),
            Err(LoadError::CorruptBlob { .. })
        ));
        assert_eq!(registry.ids(), vec!["broken".to_string()]);
    }
}
