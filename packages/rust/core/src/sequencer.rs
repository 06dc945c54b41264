//! Paced, order-preserving detail fetching.
//!
//! Consecutive fetches start at least `min_interval` apart, plus a uniform
//! random share of `fluctuation`, so the remote service never sees a fixed
//! request cadence. There is no wait before the first fetch.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use zivi_records::DetailRecord;
use zivi_shared::{PacingConfig, Result};

/// Capability to look up one detail record by id.
pub trait DetailSource {
    fn fetch_detail(&self, id: u64) -> impl Future<Output = Result<DetailRecord>> + Send;
}

/// Draw the wait between two fetch starts from `[min, min + fluctuation)`.
pub fn jittered_interval<R: Rng + ?Sized>(pacing: &PacingConfig, rng: &mut R) -> Duration {
    if pacing.fluctuation.is_zero() {
        return pacing.min_interval;
    }
    let span = u64::try_from(pacing.fluctuation.as_nanos()).unwrap_or(u64::MAX);
    pacing.min_interval + Duration::from_nanos(rng.random_range(0..span))
}

/// Lazy sequence of detail records, one per id, in input order.
///
/// Not restartable. After a failed fetch the sequence ends.
pub struct PacedFetcher<'a, S> {
    source: &'a S,
    ids: std::vec::IntoIter<u64>,
    pacing: PacingConfig,
    last_start: Option<Instant>,
    failed: bool,
}

impl<'a, S: DetailSource> PacedFetcher<'a, S> {
    pub fn new(source: &'a S, ids: Vec<u64>, pacing: PacingConfig) -> Self {
        Self {
            source,
            ids: ids.into_iter(),
            pacing,
            last_start: None,
            failed: false,
        }
    }

    /// Ids not fetched yet.
    pub fn remaining(&self) -> usize {
        if self.failed { 0 } else { self.ids.len() }
    }

    /// Fetch the next record, waiting out the pacing interval first.
    ///
    /// Returns `None` once every id has been fetched or a fetch has failed.
    pub async fn next(&mut self) -> Option<Result<(u64, DetailRecord)>> {
        if self.failed {
            return None;
        }
        let id = self.ids.next()?;

        if let Some(last) = self.last_start {
            let wait = jittered_interval(&self.pacing, &mut rand::rng());
            debug!(id, wait_ms = wait.as_millis() as u64, "pacing before fetch");
            tokio::time::sleep_until(last + wait).await;
        }
        self.last_start = Some(Instant::now());

        debug!(id, "fetching detail");
        match self.source.fetch_detail(id).await {
            Ok(record) => Some(Ok((id, record))),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySource;
    use super::*;
    use serde_json::json;
    use zivi_shared::ZiviError;

    fn pacing(min_ms: u64, fluct_ms: u64) -> PacingConfig {
        PacingConfig {
            min_interval: Duration::from_millis(min_ms),
            fluctuation: Duration::from_millis(fluct_ms),
        }
    }

    fn source(ids: &[u64]) -> MemorySource {
        MemorySource::new(ids.iter().map(|&id| (id, json!({ "id": id }))))
    }

    #[test]
    fn jitter_stays_in_window() {
        let p = pacing(100, 50);
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let d = jittered_interval(&p, &mut rng);
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
        assert_eq!(jittered_interval(&pacing(80, 0), &mut rng), Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_are_paced_and_ordered() {
        let ids = [3, 1, 2, 9];
        let src = source(&ids);
        let test_start = Instant::now();
        let mut fetcher = PacedFetcher::new(&src, ids.to_vec(), pacing(1500, 1500));

        let mut seen = Vec::new();
        while let Some(item) = fetcher.next().await {
            let (id, record) = item.unwrap();
            assert_eq!(record.id(), Some(id));
            seen.push(id);
        }
        assert_eq!(seen, ids);

        let starts = src.starts.lock().unwrap().clone();
        assert_eq!(starts[0].1, test_start);
        for pair in starts.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_millis(1500), "gap {gap:?} too short");
            assert!(gap < Duration::from_millis(3000), "gap {gap:?} too long");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_ends_the_sequence() {
        let src = source(&[1, 3]);
        let mut fetcher = PacedFetcher::new(&src, vec![1, 2, 3], pacing(10, 0));

        assert!(fetcher.next().await.unwrap().is_ok());
        let err = fetcher.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ZiviError::Api { status: Some(404), .. }));
        assert!(fetcher.next().await.is_none());
        assert_eq!(fetcher.remaining(), 0);
        assert_eq!(src.fetched_ids(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_fetches_nothing() {
        let src = source(&[]);
        let mut fetcher = PacedFetcher::new(&src, Vec::new(), pacing(10, 10));
        assert!(fetcher.next().await.is_none());
        assert!(src.fetched_ids().is_empty());
    }
}
