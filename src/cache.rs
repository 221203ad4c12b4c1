//! Cache
//!
//! Bounded, oldest-eviction cache for explanation results, keyed by an instance
//! fingerprint. It is the only structure shared between concurrent explanation
//! calls; a caller owns it behind an `Arc` and hands it to the engines.
use crate::attribution::AttributionResult;
use crate::constants::CACHE_CAPACITY;
use hashbrown::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

/// Hash of everything that determines an explanation.
///
/// Floating point values are rounded to a fixed number of decimals first, so
/// vectors that differ only by float noise share a fingerprint.
#[derive(Debug)]
pub struct Fingerprint {
    hasher: DefaultHasher,
    scale: f64,
}

impl Fingerprint {
    pub fn new(decimals: i32) -> Self {
        Fingerprint {
            hasher: DefaultHasher::new(),
            scale: 10f64.powi(decimals),
        }
    }

    pub fn with_str(mut self, s: &str) -> Self {
        s.hash(&mut self.hasher);
        self
    }

    pub fn with_strs(mut self, items: &[String]) -> Self {
        items.hash(&mut self.hasher);
        self
    }

    pub fn with_u64(mut self, v: u64) -> Self {
        v.hash(&mut self.hasher);
        self
    }

    pub fn with_values(mut self, values: &[f64]) -> Self {
        values.len().hash(&mut self.hasher);
        for v in values {
            // +0.0 so that -0.0 and 0.0 hash the same.
            let rounded = (v * self.scale).round() + 0.0;
            rounded.to_bits().hash(&mut self.hasher);
        }
        self
    }

    pub fn finish(self) -> u64 {
        self.hasher.finish()
    }
}

struct CacheInner<V> {
    entries: HashMap<u64, Arc<V>>,
    order: VecDeque<u64>,
}

/// Bounded cache evicting the oldest inserted entry first.
///
/// Concurrent requests for the same key may both miss and both insert; the
/// second insert simply replaces the first.
pub struct FingerprintCache<V> {
    capacity: usize,
    inner: RwLock<CacheInner<V>>,
}

/// Cache of Shapley attribution results.
pub type AttributionCache = FingerprintCache<AttributionResult>;

impl<V> FingerprintCache<V> {
    pub fn new(capacity: usize) -> Self {
        FingerprintCache {
            capacity,
            inner: RwLock::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn get(&self, key: u64) -> Option<Arc<V>> {
        let inner = self.inner.read().ok()?;
        inner.entries.get(&key).cloned()
    }

    pub fn insert(&self, key: u64, value: Arc<V>) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut inner) = self.inner.write() {
            if inner.entries.insert(key, value).is_some() {
                return;
            }
            inner.order.push_back(key);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.clear();
            inner.order.clear();
        }
    }
}

impl<V> Default for FingerprintCache<V> {
    fn default() -> Self {
        FingerprintCache::new(CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_rounding() {
        let a = Fingerprint::new(6).with_str("shap").with_values(&[1.0, 2.0000000001]).finish();
        let b = Fingerprint::new(6).with_str("shap").with_values(&[1.0, 2.0]).finish();
        let c = Fingerprint::new(6).with_str("shap").with_values(&[1.0, 2.001]).finish();
        let d = Fingerprint::new(6).with_str("lime").with_values(&[1.0, 2.0]).finish();
        assert_eq!(a, b);
        assert_ne!(b, c);
        assert_ne!(b, d);
        let z = Fingerprint::new(6).with_values(&[-0.0]).finish();
        let pz = Fingerprint::new(6).with_values(&[0.0]).finish();
        assert_eq!(z, pz);
    }

    #[test]
    fn test_oldest_eviction() {
        assert_eq!(AttributionCache::default().capacity(), CACHE_CAPACITY);
        let cache: FingerprintCache<u32> = FingerprintCache::new(2);
        cache.insert(1, Arc::new(10));
        cache.insert(2, Arc::new(20));
        // Reading does not refresh an entry.
        assert_eq!(cache.get(1).as_deref(), Some(&10));
        cache.insert(3, Arc::new(30));
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2).as_deref(), Some(&20));
        assert_eq!(cache.get(3).as_deref(), Some(&30));
        assert_eq!(cache.len(), 2);
        cache.insert(3, Arc::new(31));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(3).as_deref(), Some(&31));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache: FingerprintCache<u32> = FingerprintCache::new(0);
        cache.insert(1, Arc::new(1));
        assert!(cache.is_empty());
    }
}
