//! End-to-end crawl step: seed pages on disk → expand → crawled pages on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use seedcrawl_crawler::{CrawlProgress, CrawlStats, ExpandOptions, Fetcher};
use seedcrawl_shared::{CrawlConfig, Document, Page, Result, SeedcrawlError};
use seedcrawl_storage::{PersistOptions, load_pages_dir, persist_page};

/// Configuration for [`crawl_step`].
#[derive(Debug, Clone)]
pub struct CrawlStepConfig {
    /// Directory holding the seed page records.
    pub input_dir: PathBuf,
    /// Directory the merged pages are written to.
    pub output_dir: PathBuf,
    /// Where to write the step metadata JSON, if anywhere.
    pub stats_path: Option<PathBuf>,
    /// Crawl configuration.
    pub crawl: CrawlConfig,
}

/// Result of [`crawl_step`].
#[derive(Debug)]
pub struct CrawlStepResult {
    /// Seeds plus newly crawled documents, deduplicated.
    pub documents: Vec<Document>,
    /// Counts reported for the step.
    pub stats: CrawlStats,
    /// Directory the pages were written to.
    pub output_dir: PathBuf,
    /// Total elapsed time, including loading and persisting.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting step status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a seed's children have been fetched (or have failed).
    fn seed_crawled(&self, url: &str, current: usize, total: usize);
    /// Called when a page has been written.
    fn page_persisted(&self, path: &Path, current: usize, total: usize);
    /// Called when the step completes.
    fn done(&self, result: &CrawlStepResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn seed_crawled(&self, _url: &str, _current: usize, _total: usize) {}
    fn page_persisted(&self, _path: &Path, _current: usize, _total: usize) {}
    fn done(&self, _result: &CrawlStepResult) {}
}

/// Forwards expander progress to the step's reporter.
struct ExpandProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl CrawlProgress for ExpandProgress<'_> {
    fn seed_done(&self, url: &str, completed: usize, total: usize) {
        self.inner.seed_crawled(url, completed, total);
    }
}

/// File name of the `index`-th merged page.
///
/// Position-based so obfuscated output does not leak ids through file names.
pub fn page_file_name(index: usize) -> String {
    format!("page_{index:05}.json")
}

/// Whether `name` is a record or text file written by [`crawl_step`].
fn is_step_output(name: &str) -> bool {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    let Some(index) = stem.strip_prefix("page_") else {
        return false;
    };
    matches!(ext, "json" | "txt")
        && !index.is_empty()
        && index.chars().all(|c| c.is_ascii_digit())
}

/// Remove pages left in `dir` by an earlier step so the directory holds
/// exactly the pages of this run. Other files are left alone.
fn clear_previous_output(dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(SeedcrawlError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| SeedcrawlError::io(dir, e))?.path();
        let is_output = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_step_output);
        if is_output && path.is_file() {
            std::fs::remove_file(&path).map_err(|e| SeedcrawlError::io(&path, e))?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Run the crawl step.
///
/// 1. Load seed pages from `input_dir`
/// 2. Expand them through `fetcher`
/// 3. Replace the pages of any earlier step in `output_dir` with the merged documents
/// 4. Optionally write the step metadata to `stats_path`
#[instrument(
    skip_all,
    fields(input = %config.input_dir.display(), output = %config.output_dir.display())
)]
pub async fn crawl_step<F>(
    config: &CrawlStepConfig,
    fetcher: Arc<F>,
    progress: &dyn ProgressReporter,
) -> Result<CrawlStepResult>
where
    F: Fetcher + ?Sized + 'static,
{
    let start = Instant::now();

    // --- Phase 1: Seeds ---
    progress.phase("Loading seed pages");
    let seeds: Vec<Document> = load_pages_dir(&config.input_dir)?
        .into_iter()
        .map(Document::from)
        .collect();

    // --- Phase 2: Expand ---
    progress.phase("Crawling child URLs of given documents");
    let options = ExpandOptions::from(&config.crawl);
    let (documents, stats) = seedcrawl_crawler::expand(
        fetcher,
        seeds,
        &options,
        &ExpandProgress { inner: progress },
    )
    .await?;

    info!("Before crawling, we had {} documents.", stats.before);
    info!("After crawling, we have a total of {} documents.", stats.after);
    info!("After crawling, we have {} new documents.", stats.new);

    // --- Phase 3: Persist ---
    progress.phase("Writing pages");
    let removed = clear_previous_output(&config.output_dir)?;
    if removed > 0 {
        debug!(removed, "removed pages from a previous step");
    }

    let persist_options = PersistOptions {
        obfuscate: config.crawl.obfuscate,
        also_write_text: config.crawl.also_write_text,
    };

    let total = documents.len();
    for (i, doc) in documents.iter().enumerate() {
        let path = config.output_dir.join(page_file_name(i));
        persist_page(&Page::from(doc), &path, &persist_options)?;
        progress.page_persisted(&path, i + 1, total);
    }

    // --- Phase 4: Step metadata ---
    if let Some(stats_path) = &config.stats_path {
        write_step_metadata(stats_path, &stats)?;
    }

    let result = CrawlStepResult {
        documents,
        stats,
        output_dir: config.output_dir.clone(),
        elapsed: start.elapsed(),
    };

    info!(
        pages = result.documents.len(),
        failures = result.stats.failures.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "crawl step completed"
    );
    progress.done(&result);

    Ok(result)
}

fn write_step_metadata(path: &Path, stats: &CrawlStats) -> Result<()> {
    let metadata = serde_json::json!({
        "crawled_documents": stats.step_metadata(),
        "failures": stats.failures,
    });
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| SeedcrawlError::validation(format!("failed to encode step metadata: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SeedcrawlError::io(parent, e))?;
    }
    std::fs::write(path, json).map_err(|e| SeedcrawlError::io(path, e))
}
