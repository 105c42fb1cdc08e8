//! Per-symbol profile cache with single-flight refresh.
//!
//! Published profiles live in a concurrent map and are read without waiting.
//! Each symbol also owns a compute lock: a caller that finds the profile
//! stale recomputes it while holding that lock, and concurrent callers for
//! the same symbol wait and then observe the fresh profile. Different symbols
//! never contend.

use chrono::Utc;
use dashmap::DashMap;
use risk_core::types::RiskProfile;
use risk_core::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

type ComputeLock = Arc<Mutex<()>>;

pub struct ProfileCache {
    profiles: DashMap<String, RiskProfile>,
    locks: DashMap<String, ComputeLock>,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            profiles: DashMap::new(),
            locks: DashMap::new(),
            ttl,
        }
    }

    fn lock_for(&self, symbol: &str) -> ComputeLock {
        self.locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn existing_lock(&self, symbol: &str) -> Option<ComputeLock> {
        self.locks.get(symbol).map(|entry| entry.value().clone())
    }

    /// Return the cached profile, or compute a new one if it is missing,
    /// stale, or `force` is set.
    ///
    /// `compute` receives the previous profile, if any. On failure the
    /// previous profile stays in place; a symbol that never produced a
    /// profile leaves nothing behind.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        symbol: &str,
        force: bool,
        compute: F,
    ) -> Result<RiskProfile>
    where
        F: FnOnce(Option<RiskProfile>) -> Fut,
        Fut: Future<Output = Result<RiskProfile>>,
    {
        let lock = self.lock_for(symbol);
        let result = {
            let _guard = lock.lock().await;
            let previous = self.get(symbol);

            match previous {
                Some(profile) if !force && !profile.is_stale(self.ttl, Utc::now()) => {
                    debug!(symbol = %symbol, "Profile cache hit");
                    Ok(profile)
                }
                previous => {
                    let fresh = compute(previous).await;
                    if let Ok(profile) = &fresh {
                        self.profiles.insert(symbol.to_string(), profile.clone());
                    }
                    fresh
                }
            }
        };
        drop(lock);

        if result.is_err() {
            self.release_unused_lock(symbol);
        }
        result
    }

    /// Drop the compute lock of a symbol without a profile, unless another
    /// caller is waiting on it.
    fn release_unused_lock(&self, symbol: &str) {
        let removed = self.locks.remove_if(symbol, |_, lock| {
            Arc::strong_count(lock) == 1 && !self.profiles.contains_key(symbol)
        });
        if removed.is_some() {
            debug!(symbol = %symbol, "Released cache slot without a profile");
        }
    }

    /// Cached profile without triggering an assessment.
    pub fn get(&self, symbol: &str) -> Option<RiskProfile> {
        self.profiles.get(symbol).map(|entry| entry.value().clone())
    }

    /// Mutate a cached profile in place. Returns the updated copy.
    ///
    /// Waits for an in-flight refresh of the same symbol so the mutation is
    /// applied to the fresh profile.
    pub async fn update<F>(&self, symbol: &str, mutate: F) -> Option<RiskProfile>
    where
        F: FnOnce(&mut RiskProfile),
    {
        let lock = self.existing_lock(symbol)?;
        let _guard = lock.lock().await;
        let mut entry = self.profiles.get_mut(symbol)?;
        mutate(entry.value_mut());
        Some(entry.value().clone())
    }

    /// All published profiles, in no particular order.
    pub fn snapshot(&self) -> Vec<RiskProfile> {
        self.profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Symbols that currently hold a profile.
    pub fn symbols(&self) -> Vec<String> {
        self.profiles.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of symbols tracked, including those mid-assessment.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_core::{Error, RiskConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(symbol: &str, score: f64) -> RiskProfile {
        let mut p = RiskProfile::new(symbol, &RiskConfig::default());
        p.risk_score = score;
        p
    }

    #[tokio::test]
    async fn test_fresh_profile_is_reused() {
        let cache = ProfileCache::new(Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let p = cache
                .get_or_refresh("BTC", false, |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(profile("BTC", 10.0))
                })
                .await
                .unwrap();
            assert_eq!(p.risk_score, 10.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refreshes() {
        let cache = ProfileCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_refresh("BTC", false, |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(profile("BTC", 10.0))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(ProfileCache::new(Duration::from_secs(3600)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_refresh("ETH", false, |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(profile("ETH", 42.0))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let p = task.await.unwrap().unwrap();
            assert_eq!(p.risk_score, 42.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_profile() {
        let cache = ProfileCache::new(Duration::from_secs(3600));
        cache
            .get_or_refresh("SOL", false, |_| async { Ok(profile("SOL", 30.0)) })
            .await
            .unwrap();

        let err = cache
            .get_or_refresh("SOL", true, |previous| async move {
                assert_eq!(previous.map(|p| p.risk_score), Some(30.0));
                Err(Error::upstream("SOL", "down"))
            })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.get("SOL").map(|p| p.risk_score), Some(30.0));
    }

    #[tokio::test]
    async fn test_update_and_snapshot() {
        let cache = ProfileCache::new(Duration::from_secs(3600));
        assert!(cache.update("BTC", |p| p.risk_score = 1.0).await.is_none());

        for symbol in ["BTC", "ETH"] {
            cache
                .get_or_refresh(symbol, false, |_| async move { Ok(profile(symbol, 5.0)) })
                .await
                .unwrap();
        }
        let updated = cache.update("BTC", |p| p.risk_score = 55.0).await.unwrap();
        assert_eq!(updated.risk_score, 55.0);

        let mut symbols = cache.symbols();
        symbols.sort();
        assert_eq!(symbols, vec!["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_assessment_leaves_no_slot() {
        let cache = ProfileCache::new(Duration::from_secs(3600));
        for symbol in ["../etc", "NOPE", "NOPE"] {
            let result = cache
                .get_or_refresh(symbol, false, |_| async move {
                    Err(Error::upstream(symbol, "unknown symbol"))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(cache.tracked(), 0);
        assert!(cache.get("NOPE").is_none());
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_other_refreshes() {
        let cache = Arc::new(ProfileCache::new(Duration::from_secs(3600)));
        cache
            .get_or_refresh("FAST", false, |_| async { Ok(profile("FAST", 10.0)) })
            .await
            .unwrap();

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_refresh("SLOW", false, |_| async {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        Ok(profile("SLOW", 50.0))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        assert_eq!(cache.snapshot().len(), 1);
        assert_eq!(cache.get("FAST").map(|p| p.risk_score), Some(10.0));
        assert!(started.elapsed() < Duration::from_millis(100));

        slow.abort();
    }

    #[tokio::test]
    async fn test_update_waits_for_refresh_of_same_symbol() {
        let cache = Arc::new(ProfileCache::new(Duration::from_secs(3600)));
        cache
            .get_or_refresh("BTC", false, |_| async { Ok(profile("BTC", 10.0)) })
            .await
            .unwrap();

        let refresh = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_refresh("BTC", true, |_| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(profile("BTC", 20.0))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let updated = cache.update("BTC", |p| p.risk_score += 1.0).await.unwrap();
        assert_eq!(updated.risk_score, 21.0);
        refresh.await.unwrap().unwrap();
        assert_eq!(cache.get("BTC").map(|p| p.risk_score), Some(21.0));
    }
}
