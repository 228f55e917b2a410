use crate::tensor::{TensorData, TensorMap};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bounds applied to a [`ResultCache`].
///
/// `max_entries = 0` disables the size bound. A TTL of zero expires entries
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Maximum number of entries; least recently used entries go first.
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<usize>,
    /// Maximum age of an entry in seconds.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_max_entries() -> Option<usize> {
    Some(256)
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: None,
        }
    }
}

impl CachePolicy {
    /// Keep everything forever.
    pub fn unbounded() -> Self {
        Self {
            max_entries: None,
            ttl_secs: None,
        }
    }

    /// Effective size bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.max_entries.filter(|&n| n > 0)
    }

    /// Effective age bound, if any.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Identity of a memoized result: the model plus a digest of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Model the result was computed by.
    pub model_id: String,
    /// Hex SHA-256 of the canonical JSON encoding of the inputs.
    pub digest: String,
}

impl CacheKey {
    /// Key for `inputs` on `model_id`.
    ///
    /// The digest covers every name, shape, dtype and the exact bit pattern
    /// of every element, so distinct non-finite floats never collide.
    /// [`TensorMap`] is name-ordered, so equal inputs always hash equally.
    pub fn new(model_id: &str, inputs: &TensorMap) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((inputs.len() as u64).to_le_bytes());
        for (name, tensor) in inputs {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((tensor.shape.len() as u64).to_le_bytes());
            for dim in &tensor.shape {
                hasher.update((*dim as u64).to_le_bytes());
            }
            hasher.update((tensor.data.len() as u64).to_le_bytes());
            match &tensor.data {
                TensorData::F32(values) => {
                    hasher.update([0u8]);
                    for v in values {
                        hasher.update(v.to_bits().to_le_bytes());
                    }
                }
                TensorData::I64(values) => {
                    hasher.update([1u8]);
                    for v in values {
                        hasher.update(v.to_le_bytes());
                    }
                }
            }
        }
        Self {
            model_id: model_id.to_string(),
            digest: hex::encode(hasher.finalize()),
        }
    }
}

struct Entry<V> {
    value: Arc<V>,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    tick: u64,
}

/// Memoized results guarded by a single lock.
pub struct ResultCache<V> {
    policy: CachePolicy,
    state: Mutex<CacheState<V>>,
}

impl<V> ResultCache<V> {
    /// Empty cache governed by `policy`.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// The active policy.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Look up `key`, dropping the entry if it has outlived the TTL.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;

        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => self
                .policy
                .ttl()
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
        };
        if expired {
            debug!(model_id = %key.model_id, "Result cache entry expired");
            state.entries.remove(key);
            return None;
        }

        state.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    /// Store `value` under `key`, evicting least recently used entries when
    /// over capacity.
    pub fn insert(&self, key: CacheKey, value: Arc<V>) {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        state.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );

        if let Some(capacity) = self.policy.capacity() {
            while state.entries.len() > capacity {
                let victim = state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(k) => {
                        debug!(model_id = %k.model_id, "Evicted result cache entry");
                        state.entries.remove(&k);
                    }
                    None => break,
                }
            }
        }
    }

    /// Drop every entry computed by `model_id`. Returns how many were removed.
    pub fn invalidate_model(&self, model_id: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|k, _| k.model_id != model_id);
        before - state.entries.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of stored entries (expired ones included until next read).
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
