//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use zivi_api::{ClientConfig, SearchQuery, ZiviClient};
use zivi_core::{ProgressReporter, RunOptions, RunSummary, Sink, SinkMode};
use zivi_shared::{
    AppConfig, Locale, OutputFormat, PacingConfig, RowConfig, ZiviError, init_config, load_config,
    resolve_token,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// zivi: search ZiviConnect assignment specifications and export them.
#[derive(Parser)]
#[command(
    name = "zivi",
    version,
    about = "Search civil-service assignment specifications and export them as JSON or CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Locale of the results: de-CH, fr-CH or it-CH (default from config).
    #[arg(long, global = true)]
    pub locale: Option<Locale>,

    /// Output format: json or csv (default from config).
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Append output to this file instead of stdout.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Bearer token (overrides the environment variable named in config).
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Minimum ms between the starts of two detail fetches.
    #[arg(long, global = true)]
    pub min_interval_ms: Option<u64>,

    /// Random ms added on top of the minimum interval (exclusive bound).
    #[arg(long, global = true)]
    pub fluctuation_ms: Option<u64>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Search assignment specifications.
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Also fetch every hit's full record; with DIR, write files there.
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        scrape: Option<Option<PathBuf>>,

        /// Write contact and organisation cards (.vcf) below this directory.
        #[arg(long, value_name = "DIR")]
        cards: Option<PathBuf>,
    },

    /// Fetch the full record of one assignment specification.
    Details {
        /// Numeric id of the assignment specification.
        id: u64,

        /// Write contact and organisation cards (.vcf) below this directory.
        #[arg(long, value_name = "DIR")]
        cards: Option<PathBuf>,
    },

    /// Export saved detail records (JSON files) without contacting the service.
    Convert {
        /// Detail record files, processed in the given order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write contact and organisation cards (.vcf) below this directory.
        #[arg(long, value_name = "DIR")]
        cards: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Search filters.
#[derive(Args, Debug, Default)]
pub(crate) struct QueryArgs {
    /// Text to search for.
    #[arg(long)]
    pub text: Option<String>,

    /// Id of the assignment location.
    #[arg(long)]
    pub location_id: Option<u64>,

    /// Radius around the location in km (0-25 in steps of 5).
    #[arg(long)]
    pub radius: Option<u32>,

    /// Duration in weeks (1-52).
    #[arg(long)]
    pub duration: Option<u32>,

    /// Activity area ids.
    #[arg(long, num_args = 1..)]
    pub activity_areas: Option<Vec<u64>>,

    /// Language ids (max 3).
    #[arg(long, num_args = 1..)]
    pub languages: Option<Vec<u64>>,

    /// Special marking codes (max 3).
    #[arg(long, num_args = 1..)]
    pub special_codes: Option<Vec<String>>,
}

impl From<QueryArgs> for SearchQuery {
    fn from(args: QueryArgs) -> Self {
        Self {
            text: args.text,
            location_id: args.location_id,
            radius_km: args.radius,
            duration_weeks: args.duration,
            activity_areas: args.activity_areas,
            languages: args.languages,
            special_codes: args.special_codes,
        }
    }
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

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries
/// the exported document.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "zivi=info",
        1 => "zivi=debug",
        _ => "zivi=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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

/// Run the CLI command. Ctrl-C aborts the run as it stands; output already
/// written is not closed off.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    tokio::select! {
        result = dispatch(cli) => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("interrupted by user");
            Err(ZiviError::Interrupted.into())
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let settings = Settings::new(&cli, config);

    match cli.command {
        Command::Search {
            query,
            scrape,
            cards,
        } => cmd_search(&settings, query.into(), scrape, cards).await,
        Command::Details { id, cards } => cmd_details(&settings, id, cards).await,
        Command::Convert { files, cards } => cmd_convert(&settings, &files, cards),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&settings.config),
        },
    }
}

/// Config file values with CLI flags applied on top.
struct Settings {
    config: AppConfig,
    locale: Locale,
    format: OutputFormat,
    pacing: PacingConfig,
    output: Option<PathBuf>,
    token: Option<String>,
}

impl Settings {
    fn new(cli: &Cli, config: AppConfig) -> Self {
        let mut pacing = PacingConfig::from(&config);
        if let Some(ms) = cli.min_interval_ms {
            pacing.min_interval = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = cli.fluctuation_ms {
            pacing.fluctuation = std::time::Duration::from_millis(ms);
        }

        Self {
            locale: cli.locale.unwrap_or(config.defaults.locale),
            format: cli.format.unwrap_or(config.defaults.format),
            pacing,
            output: cli.output.clone(),
            token: cli.token.clone(),
            config,
        }
    }

    fn run_options(&self, scrape: bool, card_dir: Option<PathBuf>) -> RunOptions {
        RunOptions {
            format: self.format,
            row: RowConfig::new(&self.config, self.locale),
            pacing: self.pacing,
            scrape,
            card_dir,
        }
    }

    /// The sink for this run: a scrape directory, the `-o` file, or stdout.
    fn sink_mode(&self, directory: Option<PathBuf>) -> Result<SinkMode> {
        match (directory, &self.output) {
            (Some(_), Some(_)) => Err(eyre!("--scrape DIR and --output cannot be combined")),
            (Some(dir), None) => Ok(SinkMode::Directory(dir)),
            (None, Some(file)) => Ok(SinkMode::File(file.clone())),
            (None, None) => Ok(SinkMode::Stdout),
        }
    }

    fn client(&self) -> Result<ZiviClient> {
        let token = resolve_token(&self.config, self.token.as_deref())?;
        let client_config = ClientConfig::new(&self.config, self.locale, token)?;
        Ok(ZiviClient::new(client_config)?)
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    settings: &Settings,
    query: SearchQuery,
    scrape: Option<Option<PathBuf>>,
    cards: Option<PathBuf>,
) -> Result<()> {
    query.validate()?;
    let client = settings.client()?;

    let directory = scrape.clone().flatten();
    let mode = settings.sink_mode(directory)?;
    let options = settings.run_options(scrape.is_some(), cards);

    info!(
        locale = %settings.locale,
        format = %settings.format,
        scrape = options.scrape,
        "searching assignment specifications"
    );

    let hits = client.search(&query).await?;

    let reporter = CliProgress::new();
    let mut sink = Sink::new(mode);
    let summary =
        zivi_core::run_search(&hits, &client, &options, &mut sink, &reporter).await?;

    report(sink.mode(), &summary);
    Ok(())
}

async fn cmd_details(settings: &Settings, id: u64, cards: Option<PathBuf>) -> Result<()> {
    let client = settings.client()?;
    let options = settings.run_options(false, cards);
    let mut sink = Sink::new(settings.sink_mode(None)?);

    let summary = zivi_core::run_details(id, &client, &options, &mut sink).await?;
    report(sink.mode(), &summary);
    Ok(())
}

fn cmd_convert(settings: &Settings, files: &[PathBuf], cards: Option<PathBuf>) -> Result<()> {
    let options = settings.run_options(false, cards);
    let mut sink = Sink::new(settings.sink_mode(None)?);

    let reporter = CliProgress::new();
    let summary = zivi_core::run_convert(files, &options, &mut sink, &reporter)?;
    report(sink.mode(), &summary);
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

/// Summarize a run on stderr when stdout did not carry the output.
fn report(mode: &SinkMode, summary: &RunSummary) {
    let location = match mode {
        SinkMode::Stdout => return,
        SinkMode::File(path) | SinkMode::Directory(path) => path,
    };

    eprintln!();
    eprintln!("  Hits:    {}", summary.hits);
    eprintln!("  Details: {}", summary.details);
    eprintln!("  Output:  {}", location.display());
    eprintln!("  Time:    {:.1}s", summary.elapsed.as_secs_f64());
    eprintln!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn detail_written(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Details [{current}/{total}] {title}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn scrape_flag_takes_optional_directory() {
        let cli = parse(&["zivi", "search", "--text", "Wald"]);
        let Command::Search { scrape, query, .. } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(scrape, None);
        assert_eq!(query.text.as_deref(), Some("Wald"));

        let cli = parse(&["zivi", "search", "--scrape"]);
        let Command::Search { scrape, .. } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(scrape, Some(None));

        let cli = parse(&["zivi", "search", "--scrape", "out"]);
        let Command::Search { scrape, .. } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(scrape, Some(Some(PathBuf::from("out"))));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&[
            "zivi",
            "details",
            "42",
            "--locale",
            "fr-CH",
            "--format",
            "csv",
            "--min-interval-ms",
            "10",
        ]);
        assert_eq!(cli.locale, Some(Locale::FrCh));
        assert_eq!(cli.format, Some(OutputFormat::Csv));

        let settings = Settings::new(&cli, AppConfig::default());
        assert_eq!(settings.pacing.min_interval, std::time::Duration::from_millis(10));
        assert_eq!(settings.pacing.fluctuation, std::time::Duration::from_millis(1500));
        assert!(matches!(cli.command, Command::Details { id: 42, .. }));
    }

    #[test]
    fn unknown_locale_is_rejected() {
        assert!(Cli::try_parse_from(["zivi", "--locale", "en-US", "details", "1"]).is_err());
    }

    #[test]
    fn query_args_map_to_search_query() {
        let cli = parse(&[
            "zivi",
            "search",
            "--radius",
            "10",
            "--languages",
            "1",
            "2",
            "--special-codes",
            "A",
        ]);
        let Command::Search { query, .. } = cli.command else {
            panic!("expected search");
        };
        let query = SearchQuery::from(query);
        assert_eq!(query.radius_km, Some(10));
        assert_eq!(query.languages, Some(vec![1, 2]));
        assert_eq!(query.special_codes, Some(vec!["A".to_string()]));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn scrape_directory_conflicts_with_output_file() {
        let cli = parse(&["zivi", "-o", "out.json", "search"]);
        let settings = Settings::new(&cli, AppConfig::default());
        assert!(settings.sink_mode(Some(PathBuf::from("dir"))).is_err());
        assert_eq!(
            settings.sink_mode(None).unwrap(),
            SinkMode::File(PathBuf::from("out.json"))
        );
    }
}
