//! Subscription Registry
//!
//! Desired subscription state, independent of the connection. Mutated by the
//! caller, read in full by the session on every successful authentication.
//! One lock guards the map; it is held for the update or snapshot only,
//! never across a send.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use parking_lot::Mutex;
use tickstream_codec::FeedRequest;
use tickstream_core::{InstrumentKey, SubscriptionMode};

use crate::error::{FeedError, FeedResult};

/// Instrument key → mode, with per-mode ceilings enforced on every mutation
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<InstrumentKey, SubscriptionMode>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `keys` under `mode`, replacing any previous mode per key
    ///
    /// All-or-nothing: if the resulting count for `mode` would pass its
    /// ceiling, nothing is applied. Returns the de-duplicated keys.
    pub fn subscribe(
        &self,
        keys: &[InstrumentKey],
        mode: SubscriptionMode,
    ) -> FeedResult<Vec<InstrumentKey>> {
        let keys = dedup(keys);
        let mut entries = self.entries.lock();

        let joining = keys
            .iter()
            .filter(|key| entries.get(*key) != Some(&mode))
            .count();
        check_ceiling(&entries, mode, joining)?;

        for key in &keys {
            entries.insert(key.clone(), mode);
        }
        debug!(
            "Registry: {} keys under {} ({} total)",
            keys.len(),
            mode,
            count_of(&entries, mode)
        );
        Ok(keys)
    }

    /// Remove `keys`; unknown keys are ignored. Returns the keys that were removed.
    pub fn unsubscribe(&self, keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
        let keys = dedup(keys);
        let mut entries = self.entries.lock();
        keys.into_iter()
            .filter(|key| entries.remove(key).is_some())
            .collect()
    }

    /// Move already-subscribed `keys` to `mode`
    ///
    /// Keys that are not subscribed are skipped and logged. The ceiling check
    /// covers the keys that actually move. Returns the subscribed keys.
    pub fn change_mode(
        &self,
        keys: &[InstrumentKey],
        mode: SubscriptionMode,
    ) -> FeedResult<Vec<InstrumentKey>> {
        let keys = dedup(keys);
        let mut entries = self.entries.lock();

        let (known, unknown): (Vec<_>, Vec<_>) =
            keys.into_iter().partition(|key| entries.contains_key(key));
        if !unknown.is_empty() {
            warn!(
                "change_mode to {}: skipping {} unsubscribed keys",
                mode,
                unknown.len()
            );
        }

        let moving = known
            .iter()
            .filter(|key| entries.get(*key) != Some(&mode))
            .count();
        check_ceiling(&entries, mode, moving)?;

        for key in &known {
            entries.insert(key.clone(), mode);
        }
        Ok(known)
    }

    pub fn mode_of(&self, key: &InstrumentKey) -> Option<SubscriptionMode> {
        self.entries.lock().get(key).copied()
    }

    /// Number of keys under `mode`
    pub fn count(&self, mode: SubscriptionMode) -> usize {
        count_of(&self.entries.lock(), mode)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the registry grouped by mode, keys sorted
    pub fn snapshot(&self) -> BTreeMap<SubscriptionMode, Vec<InstrumentKey>> {
        let entries = self.entries.lock();
        let mut by_mode: BTreeMap<SubscriptionMode, Vec<InstrumentKey>> = BTreeMap::new();
        for (key, mode) in entries.iter() {
            by_mode.entry(*mode).or_default().push(key.clone());
        }
        drop(entries);

        for keys in by_mode.values_mut() {
            keys.sort();
        }
        by_mode
    }

    /// Subscribe requests restoring the full registry on a fresh connection
    ///
    /// One request per mode, split into chunks of `max_per_message` keys when
    /// set. A mode holding more keys than its ceiling is sliced to the ceiling
    /// and the excess is logged.
    pub fn replay_requests(&self, max_per_message: Option<usize>) -> Vec<FeedRequest> {
        let mut requests = Vec::new();
        for (mode, mut keys) in self.snapshot() {
            let ceiling = mode.max_instruments();
            if keys.len() > ceiling {
                let excess = keys.split_off(ceiling);
                warn!(
                    "Replay for {} exceeds ceiling {}: {} keys not resubscribed (first: {})",
                    mode,
                    ceiling,
                    excess.len(),
                    excess[0]
                );
            }
            requests.extend(
                chunk_keys(keys, max_per_message)
                    .into_iter()
                    .map(|chunk| FeedRequest::subscribe(mode, chunk)),
            );
        }
        requests
    }
}

/// Split `keys` into chunks of at most `max` (one chunk when `max` is unset)
pub(crate) fn chunk_keys(keys: Vec<InstrumentKey>, max: Option<usize>) -> Vec<Vec<InstrumentKey>> {
    match max {
        Some(max) if max > 0 && keys.len() > max => {
            keys.chunks(max).map(|chunk| chunk.to_vec()).collect()
        }
        _ if keys.is_empty() => Vec::new(),
        _ => vec![keys],
    }
}

fn check_ceiling(
    entries: &HashMap<InstrumentKey, SubscriptionMode>,
    mode: SubscriptionMode,
    joining: usize,
) -> FeedResult<()> {
    let limit = mode.max_instruments();
    let requested = count_of(entries, mode) + joining;
    if requested > limit {
        return Err(FeedError::SubscriptionLimitExceeded {
            mode,
            limit,
            requested,
        });
    }
    Ok(())
}

fn count_of(entries: &HashMap<InstrumentKey, SubscriptionMode>, mode: SubscriptionMode) -> usize {
    entries.values().filter(|m| **m == mode).count()
}

fn dedup(keys: &[InstrumentKey]) -> Vec<InstrumentKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert(*key))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(prefix: &str, n: usize) -> Vec<InstrumentKey> {
        (0..n)
            .map(|i| InstrumentKey::new(format!("{}|{:05}", prefix, i)))
            .collect()
    }

    #[test]
    fn test_subscribe_over_ceiling_is_rejected_whole() {
        let registry = SubscriptionRegistry::new();
        let result = registry.subscribe(&keys("NSE_EQ", 2001), SubscriptionMode::Full);

        assert_eq!(
            result,
            Err(FeedError::SubscriptionLimitExceeded {
                mode: SubscriptionMode::Full,
                limit: 2000,
                requested: 2001,
            })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ceiling_counts_existing_keys() {
        let registry = SubscriptionRegistry::new();
        registry
            .subscribe(&keys("A", 1999), SubscriptionMode::FullD30)
            .unwrap();

        // Re-subscribing the same keys under the same mode adds nothing
        registry
            .subscribe(&keys("A", 1999), SubscriptionMode::FullD30)
            .unwrap();
        assert!(registry.subscribe(&keys("B", 2), SubscriptionMode::FullD30).is_err());
        assert_eq!(registry.count(SubscriptionMode::FullD30), 1999);
        assert!(registry.mode_of(&InstrumentKey::new("B|00000")).is_none());

        registry.subscribe(&keys("B", 1), SubscriptionMode::FullD30).unwrap();
        assert_eq!(registry.count(SubscriptionMode::FullD30), 2000);
    }

    #[test]
    fn test_resubscribe_replaces_mode() {
        let registry = SubscriptionRegistry::new();
        let key = InstrumentKey::new("NSE_FO|45450");
        registry.subscribe(&[key.clone()], SubscriptionMode::Ltpc).unwrap();
        registry.subscribe(&[key.clone()], SubscriptionMode::Full).unwrap();

        assert_eq!(registry.mode_of(&key), Some(SubscriptionMode::Full));
        assert_eq!(registry.count(SubscriptionMode::Ltpc), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_keys_in_one_call() {
        let registry = SubscriptionRegistry::new();
        let key = InstrumentKey::new("NSE_EQ|X");
        let applied = registry
            .subscribe(&[key.clone(), key.clone(), key], SubscriptionMode::Ltpc)
            .unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(registry.count(SubscriptionMode::Ltpc), 1);
    }

    #[test]
    fn test_unsubscribe_returns_removed() {
        let registry = SubscriptionRegistry::new();
        let subscribed = keys("NSE_EQ", 3);
        registry.subscribe(&subscribed, SubscriptionMode::Ltpc).unwrap();

        let removed = registry.unsubscribe(&[subscribed[1].clone(), InstrumentKey::new("NOPE|1")]);
        assert_eq!(removed, vec![subscribed[1].clone()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_change_mode_skips_unknown_keys() {
        let registry = SubscriptionRegistry::new();
        let subscribed = keys("NSE_EQ", 2);
        registry.subscribe(&subscribed, SubscriptionMode::Ltpc).unwrap();

        let mut request = subscribed.clone();
        request.push(InstrumentKey::new("NSE_EQ|unknown"));
        let moved = registry
            .change_mode(&request, SubscriptionMode::OptionGreeks)
            .unwrap();

        assert_eq!(moved, subscribed);
        assert_eq!(registry.count(SubscriptionMode::OptionGreeks), 2);
        assert_eq!(registry.mode_of(&InstrumentKey::new("NSE_EQ|unknown")), None);
    }

    #[test]
    fn test_change_mode_respects_ceiling() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&keys("F", 2000), SubscriptionMode::Full).unwrap();
        registry.subscribe(&keys("L", 5), SubscriptionMode::Ltpc).unwrap();

        let result = registry.change_mode(&keys("L", 5), SubscriptionMode::Full);
        assert!(matches!(
            result,
            Err(FeedError::SubscriptionLimitExceeded { requested: 2005, .. })
        ));
        assert_eq!(registry.count(SubscriptionMode::Ltpc), 5);
    }

    #[test]
    fn test_replay_one_request_per_mode() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&keys("L", 3), SubscriptionMode::Ltpc).unwrap();
        registry.subscribe(&keys("F", 2), SubscriptionMode::Full).unwrap();

        let requests = registry.replay_requests(None);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].data.mode, Some(SubscriptionMode::Ltpc));
        assert_eq!(requests[0].instrument_keys(), keys("L", 3).as_slice());
        assert_eq!(requests[1].data.mode, Some(SubscriptionMode::Full));
        assert_eq!(requests[1].instrument_keys().len(), 2);
    }

    #[test]
    fn test_replay_chunks_large_modes() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&keys("L", 250), SubscriptionMode::Ltpc).unwrap();

        let requests = registry.replay_requests(Some(100));
        let sizes: Vec<usize> = requests.iter().map(|r| r.instrument_keys().len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);

        let replayed: Vec<InstrumentKey> = requests
            .iter()
            .flat_map(|r| r.instrument_keys().to_vec())
            .collect();
        assert_eq!(replayed, keys("L", 250));
    }

    #[test]
    fn test_replay_of_empty_registry() {
        assert!(SubscriptionRegistry::new().replay_requests(Some(10)).is_empty());
    }

    #[test]
    fn test_random_sequences_never_exceed_ceilings() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(7);
        let registry = SubscriptionRegistry::new();
        let pool = keys("P", 6000);

        for _ in 0..200 {
            let mode = SubscriptionMode::ALL[rng.gen_range(0..4)];
            let start = rng.gen_range(0..pool.len());
            let len = rng.gen_range(0..1500).min(pool.len() - start);
            let batch = &pool[start..start + len];
            let before = registry.snapshot();

            let result = match rng.gen_range(0..3) {
                0 => registry.subscribe(batch, mode).map(|_| ()),
                1 => {
                    registry.unsubscribe(batch);
                    Ok(())
                }
                _ => registry.change_mode(batch, mode).map(|_| ()),
            };

            if result.is_err() {
                assert_eq!(registry.snapshot(), before);
            }
            for mode in SubscriptionMode::ALL {
                assert!(registry.count(mode) <= mode.max_instruments());
            }
        }
    }
}
