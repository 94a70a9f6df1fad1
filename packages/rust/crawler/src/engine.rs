//! Bounded concurrent crawl-and-merge expansion.
//!
//! [`expand`] fetches the children of every seed document through a
//! [`Fetcher`], with at most `max_concurrency` fetches in flight, then merges
//! seeds and children into one deduplicated list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use seedcrawl_shared::{CrawlConfig, Document, FetchErrorPolicy, Result, SeedcrawlError};

use crate::fetcher::Fetcher;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Knobs for a single [`expand`] call.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Maximum number of fetches in flight at once. Must be at least 1.
    pub max_concurrency: usize,
    /// Time limit for one seed's whole fetch; a timeout counts as a failed seed.
    pub fetch_timeout: Option<Duration>,
    /// What to do when fetching one seed fails.
    pub on_fetch_error: FetchErrorPolicy,
}

impl ExpandOptions {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            fetch_timeout: None,
            on_fetch_error: FetchErrorPolicy::Skip,
        }
    }
}

impl From<&CrawlConfig> for ExpandOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_concurrency: config.max_workers as usize,
            fetch_timeout: config.seed_timeout(),
            on_fetch_error: config.on_fetch_error,
        }
    }
}

/// A seed whose children could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedFailure {
    pub url: String,
    pub error: String,
}

/// Before/after counts of one expansion.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    /// Number of seed documents.
    pub before: usize,
    /// Number of documents after merging and deduplication.
    pub after: usize,
    /// `after - before`. Negative only if the seeds themselves contained duplicates.
    pub new: i64,
    /// Seeds skipped under [`FetchErrorPolicy::Skip`].
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SeedFailure>,
    /// Wall-clock time of the expansion.
    #[serde(skip)]
    pub duration: Duration,
}

impl CrawlStats {
    fn new(before: usize, after: usize) -> Self {
        Self {
            before,
            after,
            new: after as i64 - before as i64,
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Counts in the shape recorded as step output metadata.
    pub fn step_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "len_documents_before_crawling": self.before,
            "len_documents_after_crawling": self.after,
            "len_documents_new": self.new,
        })
    }
}

/// Observer notified as each seed finishes.
pub trait CrawlProgress: Send + Sync {
    /// `completed` of `total` seeds are done; `url` is the one that just finished.
    fn seed_done(&self, url: &str, completed: usize, total: usize);
}

/// No-op progress observer.
pub struct SilentProgress;

impl CrawlProgress for SilentProgress {
    fn seed_done(&self, _url: &str, _completed: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Fetch the children of every seed and merge them with the seeds.
///
/// Seeds are dispatched in input order; children are appended in completion
/// order, then the whole list is deduplicated by document identity. Seeds
/// keep their position at the front.
#[instrument(skip_all, fields(seeds = seeds.len(), max_concurrency = options.max_concurrency))]
pub async fn expand<F>(
    fetcher: Arc<F>,
    seeds: Vec<Document>,
    options: &ExpandOptions,
    progress: &dyn CrawlProgress,
) -> Result<(Vec<Document>, CrawlStats)>
where
    F: Fetcher + ?Sized + 'static,
{
    if options.max_concurrency == 0 {
        return Err(SeedcrawlError::validation("max_concurrency must be at least 1"));
    }

    let start_time = Instant::now();
    let total = seeds.len();
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
    let mut tasks = JoinSet::new();
    let mut task_urls = HashMap::with_capacity(total);

    for seed in &seeds {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let url = seed.url.clone();
        let seed = seed.clone();
        let timeout = options.fetch_timeout;

        let handle = tasks.spawn(async move {
            let outcome = fetch_seed(fetcher.as_ref(), &seed, &semaphore, timeout).await;
            (seed.url, outcome)
        });
        task_urls.insert(handle.id(), url);
    }

    let mut accumulated = seeds;
    let mut failures = Vec::new();
    let mut completed = 0;

    while let Some(joined) = tasks.join_next().await {
        completed += 1;

        let (url, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                let url = task_urls
                    .get(&e.id())
                    .cloned()
                    .unwrap_or_else(|| "unknown".into());
                let err = SeedcrawlError::fetch(&url, format!("fetch task failed: {e}"));
                (url, Err(err))
            }
        };

        match outcome {
            Ok(children) => {
                debug!(%url, children = children.len(), "seed fetched");
                accumulated.extend(children);
            }
            Err(e) => match options.on_fetch_error {
                FetchErrorPolicy::Skip => {
                    warn!(%url, error = %e, "fetch failed, keeping seed without children");
                    failures.push(SeedFailure {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
                FetchErrorPolicy::Abort => {
                    warn!(%url, error = %e, "fetch failed, aborting expansion");
                    tasks.abort_all();
                    return Err(e);
                }
            },
        }

        progress.seed_done(&url, completed, total);
    }

    let accumulated_len = accumulated.len();
    let merged = dedup_documents(accumulated);

    let mut stats = CrawlStats::new(total, merged.len());
    stats.failures = failures;
    stats.duration = start_time.elapsed();

    info!(
        before = stats.before,
        accumulated = accumulated_len,
        after = stats.after,
        new = stats.new,
        failures = stats.failures.len(),
        duration_ms = stats.duration.as_millis(),
        "expansion completed"
    );

    Ok((merged, stats))
}

/// Wait for a slot, then fetch one seed's children.
async fn fetch_seed<F>(
    fetcher: &F,
    seed: &Document,
    semaphore: &Semaphore,
    timeout: Option<Duration>,
) -> Result<Vec<Document>>
where
    F: Fetcher + ?Sized,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| SeedcrawlError::fetch(&seed.url, "fetch slots closed"))?;

    match timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(seed))
            .await
            .map_err(|_| {
                let message = format!("timed out after {}ms", limit.as_millis());
                SeedcrawlError::fetch(&seed.url, message)
            })?,
        None => fetcher.fetch(seed).await,
    }
}

/// Remove documents with a repeated identity (see [`Document`]'s `Eq`). The first
/// occurrence wins.
pub fn dedup_documents(documents: Vec<Document>) -> Vec<Document> {
    let keep: Vec<bool> = {
        let mut seen: HashSet<&Document> = HashSet::with_capacity(documents.len());
        documents.iter().map(|doc| seen.insert(doc)).collect()
    };

    documents
        .into_iter()
        .zip(keep)
        .filter_map(|(doc, keep)| keep.then_some(doc))
        .collect()
}
