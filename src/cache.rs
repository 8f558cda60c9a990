//! Band/chunk cache.
//!
//! A fingerprint-keyed, LRU-bounded, single-flight cache: concurrent
//! requests for the same fingerprint share one decode, and decoding
//! itself runs outside the guarding mutex so a slow decompression never
//! blocks unrelated lookups. Generalizes the single-slot chunk caches
//! the surrounding codebase's format readers each keep for themselves
//! (one entry, one owner) into a shared, multi-entry, multi-reader cache.
//!
//! A reader's hold on a `Ready` entry's bytes is the `Arc<Vec<u8>>`
//! clone `get` hands back, not a count tracked inside the map: eviction
//! only ever drops the map's own `Arc`, so bytes already on loan stay
//! alive and valid for as long as the caller holds them, evicted from
//! the cache or not. There is deliberately no `refcount` field here to
//! go stale.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};

/// Identifies a decoded region uniquely: same fingerprint, same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub file_id: u64,
    pub physical_offset: u64,
    pub physical_size: u64,
}

enum Slot {
    Loading,
    Ready(Arc<Vec<u8>>),
    Evicted(Error),
}

struct Entry {
    slot: Slot,
    /// Monotonically increasing touch counter; the least-recently
    /// touched `Ready` entry is evicted first.
    last_touch: u64,
}

struct Inner {
    entries: HashMap<Fingerprint, Entry>,
    /// Byte count reserved by `Ready` entries only.
    bytes_in_use: u64,
    clock: u64,
}

/// Shared band/chunk cache, safe to use from multiple reader threads.
pub struct Cache {
    budget: u64,
    state: Mutex<Inner>,
    condvar: Condvar,
}

impl Cache {
    /// `budget` is the maximum total size in bytes of `Ready` entries;
    /// there is no built-in default, callers size it to their workload.
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            state: Mutex::new(Inner {
                entries: HashMap::new(),
                bytes_in_use: 0,
                clock: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Returns the bytes for `fingerprint`, invoking `loader` at most
    /// once across all concurrent callers that race on a cold entry.
    /// `loader` runs outside the mutex.
    pub fn get(
        &self,
        fingerprint: Fingerprint,
        loader: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<Arc<Vec<u8>>> {
        let mut state = self.state.lock().expect("cache mutex poisoned");

        loop {
            match state.entries.get(&fingerprint) {
                Some(Entry { slot: Slot::Ready(bytes), .. }) => {
                    let bytes = Arc::clone(bytes);
                    let clock = state.clock + 1;
                    state.clock = clock;
                    state.entries.get_mut(&fingerprint).unwrap().last_touch = clock;
                    return Ok(bytes);
                }
                Some(Entry { slot: Slot::Evicted(err), .. }) => return Err(clone_error(err)),
                Some(Entry { slot: Slot::Loading, .. }) => {
                    state = self
                        .condvar
                        .wait(state)
                        .expect("cache condvar wait poisoned");
                    continue;
                }
                None => break,
            }
        }

        state.entries.insert(
            fingerprint,
            Entry {
                slot: Slot::Loading,
                last_touch: 0,
            },
        );
        drop(state);

        let loaded = loader();

        let mut state = self.state.lock().expect("cache mutex poisoned");
        let result = match loaded {
            Ok(bytes) => {
                let bytes = Arc::new(bytes);
                let size = bytes.len() as u64;
                state.bytes_in_use += size;
                let clock = state.clock + 1;
                state.clock = clock;
                state.entries.insert(
                    fingerprint,
                    Entry {
                        slot: Slot::Ready(Arc::clone(&bytes)),
                        last_touch: clock,
                    },
                );
                evict_over_budget(&mut state, self.budget, Some(fingerprint));
                // If eviction above removed the entry we just inserted
                // (it alone exceeds budget), hand the bytes back
                // without caching them.
                if !state.entries.contains_key(&fingerprint) {
                    state.bytes_in_use = state.bytes_in_use.saturating_sub(size);
                }
                Ok(bytes)
            }
            Err(err) => {
                state.entries.insert(
                    fingerprint,
                    Entry {
                        slot: Slot::Evicted(clone_error(&err)),
                        last_touch: 0,
                    },
                );
                Err(err)
            }
        };
        drop(state);
        self.condvar.notify_all();
        result
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.state.lock().expect("cache mutex poisoned").bytes_in_use
    }
}

/// Evicts `Ready` entries in least-recently-touched order until
/// `bytes_in_use <= budget`, never evicting `protect` itself and never
/// evicting `Loading` entries. Bytes already handed out to a caller
/// survive eviction through their own `Arc` clone, so there is no
/// refcount to consult here.
fn evict_over_budget(state: &mut Inner, budget: u64, protect: Option<Fingerprint>) {
    while state.bytes_in_use > budget {
        let victim = state
            .entries
            .iter()
            .filter(|(fp, e)| Some(**fp) != protect && matches!(e.slot, Slot::Ready(_)))
            .min_by_key(|(_, e)| e.last_touch)
            .map(|(fp, _)| *fp);
        let Some(victim) = victim else { break };
        if let Some(Entry { slot: Slot::Ready(bytes), .. }) = state.entries.remove(&victim) {
            state.bytes_in_use = state.bytes_in_use.saturating_sub(bytes.len() as u64);
        }
    }
}

fn clone_error(err: &Error) -> Error {
    Error::Runtime(crate::error::RuntimeError::GetFailed {
        message: format!("cached load previously failed: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fp(n: u64) -> Fingerprint {
        Fingerprint { file_id: 0, physical_offset: n, physical_size: 16 }
    }

    #[test]
    fn hit_after_load_does_not_reload() {
        let cache = Cache::new(1024);
        let calls = AtomicUsize::new(0);
        let a = cache.get(fp(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }).unwrap();
        let b = cache.get(fp(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![9, 9, 9])
        }).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a, *b);
    }

    #[test]
    fn single_flight_across_threads() {
        let cache = Arc::new(Cache::new(1024));
        let calls = Arc::new(AtomicUsize::new(0));
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                scope.spawn(move || {
                    cache
                        .get(fp(1), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(vec![7u8; 4])
                        })
                        .unwrap();
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn budget_is_respected() {
        let cache = Cache::new(10);
        cache.get(fp(0), || Ok(vec![0u8; 8])).unwrap();
        cache.get(fp(1), || Ok(vec![0u8; 8])).unwrap();
        assert!(cache.bytes_in_use() <= 10);
    }

    #[test]
    fn failed_load_propagates_to_waiters() {
        let cache = Cache::new(1024);
        let err = cache.get(fp(0), || Err(Error::invalid_data("boom"))).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        let err2 = cache.get(fp(0), || Ok(vec![1])).unwrap_err();
        assert!(matches!(err2, Error::Runtime(_)));
    }
}
