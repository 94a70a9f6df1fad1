//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use seedcrawl_core::pipeline::{CrawlStepConfig, CrawlStepResult, ProgressReporter};
use seedcrawl_crawler::HttpFetcher;
use seedcrawl_shared::{
    AppConfig, CrawlConfig, FetchErrorPolicy, init_config, load_config, load_config_from,
};
use seedcrawl_storage::{PersistOptions, load_page, load_pages_dir, persist_page};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// seedcrawl — expand a set of seed pages with the pages they link to.
#[derive(Parser)]
#[command(
    name = "seedcrawl",
    version,
    about = "Crawl the outbound links of seed pages and merge the results into one page set.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.seedcrawl/seedcrawl.toml.
    #[arg(long, global = true, env = "SEEDCRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl the links of every seed page and write the merged page set.
    Crawl {
        /// Directory of seed page records (*.json).
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (defaults to `output_dir` from the config).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum number of seeds fetched concurrently.
        #[arg(short = 'w', long)]
        max_workers: Option<u32>,

        /// Per-request timeout in seconds (0 disables it).
        #[arg(long)]
        timeout: Option<u64>,

        /// Time limit in seconds for all requests of one seed (0 disables it).
        #[arg(long)]
        seed_timeout: Option<u64>,

        /// Replace page ids with random surrogates in the written records.
        #[arg(long)]
        obfuscate: bool,

        /// Also write a .txt file with each page's content.
        #[arg(long)]
        txt: bool,

        /// Abort the whole crawl when one seed fails.
        #[arg(long)]
        fail_fast: bool,

        /// Write step metadata (document counts) to this JSON file.
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },

    /// Write an anonymized copy of a single page record.
    Obfuscate {
        /// Page record to read.
        file: PathBuf,

        /// Destination (defaults to `<name>.obfuscated.json` next to the input).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also write a .txt file with the page content.
        #[arg(long)]
        txt: bool,
    },

    /// Check that every page record in a directory loads.
    Validate {
        /// Directory of page records.
        dir: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seedcrawl=info",
        1 => "seedcrawl=debug",
        _ => "seedcrawl=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Crawl {
            input,
            out,
            max_workers,
            timeout,
            seed_timeout,
            obfuscate,
            txt,
            fail_fast,
            stats_out,
        } => {
            let mut crawl = CrawlConfig::from(&config);
            if let Some(workers) = max_workers {
                crawl.max_workers = workers;
            }
            if let Some(secs) = timeout {
                crawl.timeout_secs = secs;
            }
            if let Some(secs) = seed_timeout {
                crawl.seed_timeout_secs = secs;
            }
            crawl.obfuscate |= obfuscate;
            crawl.also_write_text |= txt;
            if fail_fast {
                crawl.on_fetch_error = FetchErrorPolicy::Abort;
            }

            let step = CrawlStepConfig {
                input_dir: input,
                output_dir: out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
                stats_path: stats_out,
                crawl,
            };
            cmd_crawl(&step).await
        }
        Command::Obfuscate { file, out, txt } => cmd_obfuscate(&file, out.as_deref(), txt),
        Command::Validate { dir } => cmd_validate(&dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(step: &CrawlStepConfig) -> Result<()> {
    if step.crawl.max_workers == 0 {
        return Err(eyre!("--max-workers must be at least 1"));
    }

    info!(
        input = %step.input_dir.display(),
        output = %step.output_dir.display(),
        max_workers = step.crawl.max_workers,
        obfuscate = step.crawl.obfuscate,
        "crawling seed pages"
    );

    let fetcher = Arc::new(HttpFetcher::new(&step.crawl)?);
    let reporter = CliProgress::new();

    let result = seedcrawl_core::pipeline::crawl_step(step, fetcher, &reporter).await?;

    println!();
    println!("  Crawl complete!");
    println!("  Before:   {}", result.stats.before);
    println!("  After:    {}", result.stats.after);
    println!("  New:      {}", result.stats.new);
    println!("  Failed:   {}", result.stats.failures.len());
    println!("  Output:   {}", result.output_dir.display());
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    for failure in &result.stats.failures {
        println!("  ! {}: {}", failure.url, failure.error);
    }

    Ok(())
}

fn cmd_obfuscate(file: &Path, out: Option<&Path>, txt: bool) -> Result<()> {
    let page = load_page(file)?;

    let destination = match out {
        Some(p) => p.to_path_buf(),
        None => {
            let stem = file
                .file_stem()
                .ok_or_else(|| eyre!("'{}' has no file name", file.display()))?;
            file.with_file_name(format!("{}.obfuscated.json", stem.to_string_lossy()))
        }
    };

    let options = PersistOptions {
        obfuscate: true,
        also_write_text: txt,
    };
    persist_page(&page, &destination, &options)?;

    info!(source = %file.display(), destination = %destination.display(), "wrote obfuscated page");
    println!("Obfuscated page written to: {}", destination.display());
    Ok(())
}

fn cmd_validate(dir: &Path) -> Result<()> {
    let pages = load_pages_dir(dir)?;
    println!("{} page records in {} are valid.", pages.len(), dir.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn seed_crawled(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Crawling [{current}/{total}] {url}"));
    }

    fn page_persisted(&self, path: &Path, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {}", path.display()));
    }

    fn done(&self, _result: &CrawlStepResult) {
        self.spinner.finish_and_clear();
    }
}
