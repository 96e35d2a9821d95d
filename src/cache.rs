use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::template::{Delimiters, Template};

/// Identity of a compiled template: the source text, the delimiters it was
/// parsed with and the registry fingerprint it was bound against.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct CacheKey {
    pub source: String,
    pub delimiters: Delimiters,
    pub fingerprint: u64,
}

impl CacheKey {
    pub fn new(source: &str, delimiters: &Delimiters, fingerprint: u64) -> CacheKey {
        CacheKey {
            source: source.to_owned(),
            delimiters: delimiters.clone(),
            fingerprint,
        }
    }
}

/// Storage for compiled templates shared between render calls.
pub trait TemplateCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<Template>>;

    /// Store a compiled template and return the one callers should use.
    /// When two callers race on the same key, both get the first stored.
    fn put(&self, key: CacheKey, template: Arc<Template>) -> Arc<Template>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// When entries leave a `ConcurrentTemplateCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Unbounded,
    /// evicts the oldest entry once the limit is reached
    MaxEntries(usize),
    TimeToLive(Duration),
}

#[derive(Debug)]
struct CacheEntry {
    template: Arc<Template>,
    inserted: Instant,
}

/// A sharded in-memory cache, safe to use from many threads at once.
#[derive(Debug, Default)]
pub struct ConcurrentTemplateCache {
    entries: DashMap<CacheKey, CacheEntry>,
    policy: CachePolicy,
}

impl ConcurrentTemplateCache {
    pub fn new() -> ConcurrentTemplateCache {
        ConcurrentTemplateCache::default()
    }

    pub fn with_policy(policy: CachePolicy) -> ConcurrentTemplateCache {
        ConcurrentTemplateCache {
            entries: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        match self.policy {
            CachePolicy::TimeToLive(ttl) => entry.inserted.elapsed() > ttl,
            _ => false,
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            debug!("evicting cached template ({} bytes of source)", key.source.len());
            self.entries.remove(&key);
        }
    }
}

impl TemplateCache for ConcurrentTemplateCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<Template>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(&entry) => return Some(entry.template.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn put(&self, key: CacheKey, template: Arc<Template>) -> Arc<Template> {
        if let CachePolicy::MaxEntries(max) = self.policy {
            if !self.entries.contains_key(&key) {
                while max > 0 && self.entries.len() >= max {
                    self.evict_oldest();
                }
            }
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut o) => {
                if self.is_expired(o.get()) {
                    o.insert(CacheEntry {
                        template: template.clone(),
                        inserted: Instant::now(),
                    });
                    template
                } else {
                    o.get().template.clone()
                }
            }
            Entry::Vacant(v) => {
                v.insert(CacheEntry {
                    template: template.clone(),
                    inserted: Instant::now(),
                });
                template
            }
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A cache that stores nothing; every render compiles afresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl TemplateCache for NoCache {
    fn get(&self, _: &CacheKey) -> Option<Arc<Template>> {
        None
    }

    fn put(&self, _: CacheKey, template: Arc<Template>) -> Arc<Template> {
        template
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}
