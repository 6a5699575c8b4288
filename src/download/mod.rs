//! Bounded-concurrency download orchestration (§4.10): per-item mirror
//! fallback, bundle-then-singleton-split on any HTTP failure (explicitly
//! including 413 Payload Too Large), and hash verification before the
//! caller's atomic install into the depot.

use std::time::{Duration, Instant};

use url::Url;

use crate::external::Fetcher;

#[derive(Debug, Clone)]
pub struct DownloadItem {
    /// A single request expected to cover several hashes at once, tried
    /// before `mirrors`. `None` when there is no bundling for this item.
    pub bundle_url: Option<Url>,
    /// Per-item mirrors, tried in order after the bundle.
    pub mirrors: Vec<Url>,
    pub expected_hash: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DownloadError {
    #[error("every mirror for {hash} failed (HTTP error or hash mismatch)")]
    Exhausted { hash: String },
    #[error("download of {hash} did not complete within its deadline")]
    TimedOut { hash: String },
}

/// Runs every item to completion, at most `concurrency` at a time.
///
/// Each item tries its bundle URL first; any failure there (HTTP error,
/// including 413, or a hash mismatch) falls through to its mirrors tried
/// in order. The first mirror whose response verifies against
/// `expected_hash` wins; exhausting every candidate is reported per-item,
/// not as a whole-batch failure.
pub fn fetch_all(
    items: Vec<DownloadItem>,
    fetcher: &(dyn Fetcher + Sync),
    concurrency: usize,
    per_item_deadline: Duration,
) -> Vec<Result<Vec<u8>, DownloadError>> {
    let concurrency = concurrency.max(1);
    let indexed: Vec<(usize, DownloadItem)> = items.into_iter().enumerate().collect();
    let mut results: Vec<Option<Result<Vec<u8>, DownloadError>>> =
        (0..indexed.len()).map(|_| None).collect();

    for chunk in indexed.chunks(concurrency) {
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (idx, item) in chunk {
                let idx = *idx;
                handles.push(scope.spawn(move || (idx, fetch_one(item, fetcher, per_item_deadline))));
            }
            for handle in handles {
                let (idx, result) = handle.join().expect("download worker thread panicked");
                results[idx] = Some(result);
            }
        });
    }

    results
        .into_iter()
        .map(|r| r.expect("every item index was assigned a result"))
        .collect()
}

fn fetch_one(
    item: &DownloadItem,
    fetcher: &dyn Fetcher,
    deadline_budget: Duration,
) -> Result<Vec<u8>, DownloadError> {
    let deadline = Instant::now() + deadline_budget;

    if let Some(bundle) = &item.bundle_url {
        if Instant::now() < deadline {
            if let Ok(bytes) = fetcher.get(bundle) {
                if hash_matches(&bytes, &item.expected_hash) {
                    return Ok(bytes);
                }
            }
            // Any bundle failure, including a 413, falls through to the
            // singleton mirrors below rather than failing the item.
        }
    }

    for mirror in &item.mirrors {
        if Instant::now() >= deadline {
            return Err(DownloadError::TimedOut {
                hash: item.expected_hash.clone(),
            });
        }
        if let Ok(bytes) = fetcher.get(mirror) {
            if hash_matches(&bytes, &item.expected_hash) {
                return Ok(bytes);
            }
        }
    }

    Err(DownloadError::Exhausted {
        hash: item.expected_hash.clone(),
    })
}

fn hash_matches(bytes: &[u8], expected: &str) -> bool {
    crate::hash::verify_tarball(bytes, expected).unwrap_or(false)
}
