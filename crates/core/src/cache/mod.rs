//! Two-tier announcement cache with remote generation as the last resort.
//!
//! Lookups walk an ordered list of [`CacheTier`]s (memory, persistent store,
//! generator). A hit at depth `n` is written back into every tier above it.
//! Concurrent resolutions of the same key are not deduplicated; each writes
//! an equivalent value.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    audio::{AudioBuffer, AudioDecoder},
    deck::Face,
    speech::{AnnouncementGenerator, Language},
    store::LocalStore,
    Result,
};

/// Identifies one cached announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub face: Face,
    pub language: Language,
}

impl CacheKey {
    pub fn new(face: Face, language: Language) -> Self {
        Self { face, language }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.language, self.face)
    }
}

/// Encoded bytes together with the buffer decoded from them.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub raw: Arc<[u8]>,
    pub buffer: AudioBuffer,
}

impl CacheEntry {
    pub fn decode(raw: Vec<u8>, decoder: &dyn AudioDecoder) -> Result<Self> {
        let buffer = decoder.decode(&raw)?;
        Ok(Self {
            raw: raw.into(),
            buffer,
        })
    }
}

/// One level of the cache hierarchy.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;
}

/// Statistics snapshot from a [`MemoryTier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Process-lifetime map of decoded buffers.
#[derive(Default)]
pub struct MemoryTier {
    state: Mutex<MemoryState>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
        }
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut state = self.state();
        let found = state.entries.get(key).cloned();
        if found.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        Ok(found)
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.state().entries.insert(*key, entry.clone());
        Ok(())
    }
}

/// Durable tier: stores the encoded bytes, decodes on the way out.
pub struct PersistentTier {
    store: Arc<dyn LocalStore>,
    decoder: Arc<dyn AudioDecoder>,
}

impl PersistentTier {
    pub fn new(store: Arc<dyn LocalStore>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { store, decoder }
    }
}

#[async_trait]
impl CacheTier for PersistentTier {
    fn name(&self) -> &'static str {
        "persistent"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        match self.store.get(&key.to_string()).await? {
            Some(raw) => CacheEntry::decode(raw, self.decoder.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.store.put(&key.to_string(), &entry.raw).await
    }
}

/// Terminal tier that asks the remote generator for fresh audio.
pub struct GeneratorTier {
    generator: Arc<dyn AnnouncementGenerator>,
    decoder: Arc<dyn AudioDecoder>,
}

impl GeneratorTier {
    pub fn new(generator: Arc<dyn AnnouncementGenerator>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { generator, decoder }
    }
}

#[async_trait]
impl CacheTier for GeneratorTier {
    fn name(&self) -> &'static str {
        "generator"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let text = key.language.announcement(key.face);
        debug!(%key, text, "generating announcement");
        let raw = self.generator.generate(&text, key.language).await?;
        CacheEntry::decode(raw, self.decoder.as_ref()).map(Some)
    }

    async fn put(&self, _key: &CacheKey, _entry: &CacheEntry) -> Result<()> {
        Ok(())
    }
}

/// Ordered tier list with back-filling resolution.
pub struct AudioCache {
    memory: Arc<MemoryTier>,
    tiers: Vec<Arc<dyn CacheTier>>,
}

impl AudioCache {
    /// Cache with only the in-memory tier. Add more with [`AudioCache::with_tier`].
    pub fn new() -> Self {
        let memory = Arc::new(MemoryTier::new());
        Self {
            tiers: vec![memory.clone() as Arc<dyn CacheTier>],
            memory,
        }
    }

    /// Memory, then `store`, then `generator`.
    pub fn layered(
        store: Arc<dyn LocalStore>,
        generator: Arc<dyn AnnouncementGenerator>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Self {
        Self::new()
            .with_tier(Arc::new(PersistentTier::new(store, decoder.clone())))
            .with_tier(Arc::new(GeneratorTier::new(generator, decoder)))
    }

    /// Appends a tier below the existing ones.
    pub fn with_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Looks `key` up tier by tier. Tier failures count as misses, so the
    /// worst outcome is `None`.
    pub async fn resolve(&self, key: &CacheKey) -> Option<AudioBuffer> {
        for (depth, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(entry)) => {
                    debug!(%key, tier = tier.name(), "announcement cache hit");
                    self.backfill(&self.tiers[..depth], key, &entry).await;
                    return Some(entry.buffer);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%key, tier = tier.name(), error = %err, "cache tier lookup failed");
                }
            }
        }
        debug!(%key, "announcement unavailable");
        None
    }

    /// Resolves `key` only if it is not already held in memory.
    pub async fn precache(&self, key: &CacheKey) -> bool {
        if self.memory.contains(key) {
            return true;
        }
        self.resolve(key).await.is_some()
    }

    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    async fn backfill(&self, tiers: &[Arc<dyn CacheTier>], key: &CacheKey, entry: &CacheEntry) {
        for tier in tiers {
            if let Err(err) = tier.put(key, entry).await {
                warn!(%key, tier = tier.name(), error = %err, "cache back-fill failed");
            }
        }
    }
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioCache")
            .field("tiers", &self.tier_names())
            .field("memory", &self.memory.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deck::{Rank, Suit},
        store::MemoryStore,
        test_support::{CountingGenerator, FailingGenerator, TestDecoder},
    };

    fn key(rank: Rank, suit: Suit, language: Language) -> CacheKey {
        CacheKey::new(Face::new(rank, suit), language)
    }

    fn layered(
        generator: Arc<dyn AnnouncementGenerator>,
    ) -> (AudioCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = AudioCache::layered(store.clone(), generator, Arc::new(TestDecoder));
        (cache, store)
    }

    #[test]
    fn key_string_form_matches_asset_names() {
        assert_eq!(key(Rank::Ace, Suit::Spades, Language::En).to_string(), "en_A_spades");
        assert_eq!(key(Rank::Ten, Suit::Hearts, Language::Es).to_string(), "es_10_hearts");
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_memory() {
        let generator = Arc::new(CountingGenerator::default());
        let (cache, store) = layered(generator.clone());
        let key = key(Rank::Queen, Suit::Hearts, Language::En);

        let first = cache.resolve(&key).await.expect("generated");
        let second = cache.resolve(&key).await.expect("cached");

        assert_eq!(first, second);
        assert_eq!(generator.calls(), 1);
        assert_eq!(generator.texts(), vec!["Q of Hearts".to_string()]);
        assert_eq!(store.len(), 1);
        assert_eq!(cache.memory_stats().hits, 1);
    }

    #[tokio::test]
    async fn languages_are_cached_separately() {
        let generator = Arc::new(CountingGenerator::default());
        let (cache, _) = layered(generator.clone());

        cache.resolve(&key(Rank::King, Suit::Clubs, Language::En)).await.unwrap();
        cache.resolve(&key(Rank::King, Suit::Clubs, Language::Es)).await.unwrap();

        assert_eq!(generator.calls(), 2);
        assert_eq!(generator.texts()[1], "Rey de Tréboles");
    }

    #[tokio::test]
    async fn persistent_hit_is_promoted_to_memory() {
        let generator = Arc::new(CountingGenerator::default());
        let (cache, store) = layered(generator.clone());
        let key = key(Rank::Two, Suit::Diamonds, Language::En);
        store.put(&key.to_string(), b"stored").await.unwrap();

        let buffer = cache.resolve(&key).await.expect("persistent hit");
        assert_eq!(buffer, TestDecoder.decode(b"stored").unwrap());
        assert_eq!(generator.calls(), 0);
        assert!(cache.precache(&key).await);
        assert_eq!(cache.memory_stats().entries, 1);
    }

    #[tokio::test]
    async fn generator_failure_resolves_to_none() {
        let (cache, store) = layered(Arc::new(FailingGenerator));
        let key = key(Rank::Five, Suit::Spades, Language::Es);

        assert!(cache.resolve(&key).await.is_none());
        assert!(!cache.precache(&key).await);
        assert!(store.is_empty());
        assert_eq!(cache.memory_stats().entries, 0);
    }

    #[tokio::test]
    async fn undecodable_bytes_fall_through_to_next_tier() {
        let generator = Arc::new(CountingGenerator::default());
        let (cache, store) = layered(generator.clone());
        let key = key(Rank::Nine, Suit::Clubs, Language::En);
        store.put(&key.to_string(), b"").await.unwrap();

        assert!(cache.resolve(&key).await.is_some());
        assert_eq!(generator.calls(), 1);
        assert_ne!(store.get(&key.to_string()).await.unwrap().unwrap(), b"");
    }

    #[tokio::test]
    async fn memory_only_cache_misses_quietly() {
        let cache = AudioCache::new();
        assert_eq!(cache.tier_names(), vec!["memory"]);
        assert!(cache.resolve(&key(Rank::Ace, Suit::Hearts, Language::En)).await.is_none());
        assert_eq!(cache.memory_stats().misses, 1);
    }
}
