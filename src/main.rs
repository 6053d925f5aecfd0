use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Parser};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod browser;
mod config;
mod error;
mod gemini;
mod generate;
mod navigator;
mod pipeline;
mod retry;
mod review;
mod scrape;
mod stats;
mod types;
mod utils;

use browser::ChromeLauncher;
use config::{resolve_api_key, Config};
use gemini::{GeminiClient, RateLimiter};
use generate::{clue_dates, clue_image_path};
use navigator::Navigator;
use pipeline::{Pipeline, PipelineSettings};
use retry::RetryPolicy;
use scrape::Scraper;

#[derive(Parser)]
#[command(name = "name-that-yankee")]
#[command(about = "Identify \"Name That Yankee\" trivia cards and build their answer pages")]
#[command(group(ArgGroup::new("mode").args(["date", "from", "all"])))]
struct Cli {
    /// Website project folder (contains index.html and images/)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Process a single trivia date (YYYY-MM-DD)
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// First date of an inclusive range (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last date of an inclusive range (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Process every clue image, newest first
    #[arg(short, long)]
    all: bool,

    /// Run Chrome without a window
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Show the Chrome window
    #[arg(long)]
    headed: bool,

    /// Take the first search match instead of asking
    #[arg(long)]
    auto_pick: bool,

    /// Skip the review/edit step
    #[arg(long)]
    no_review: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Single(NaiveDate),
    Range(NaiveDate, NaiveDate),
    All,
}

impl Cli {
    fn mode(&self) -> Option<Mode> {
        if let Some(date) = self.date {
            Some(Mode::Single(date))
        } else if let (Some(from), Some(to)) = (self.from, self.to) {
            Some(Mode::Range(from, to))
        } else if self.all {
            Some(Mode::All)
        } else {
            None
        }
    }

    fn headless(&self, config: &Config) -> bool {
        if self.headed {
            false
        } else {
            self.headless || config.headless
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> Result<String> {
    write!(output, "{}", message)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed");
    }
    Ok(line.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
}

fn resolve_project_dir<R: BufRead, W: Write>(
    flag: Option<PathBuf>,
    config: &Config,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf> {
    let chosen = match flag {
        Some(path) => path,
        None => {
            let message = match &config.last_project_path {
                Some(last) => format!(
                    "Enter the path to your website project folder [default: {}]: ",
                    last.display()
                ),
                None => "Enter the path to your website project folder: ".to_string(),
            };
            let answer = prompt(input, output, &message)?;
            match (answer.is_empty(), &config.last_project_path) {
                (true, Some(last)) => last.clone(),
                (true, None) => bail!("no project folder given"),
                (false, _) => PathBuf::from(answer),
            }
        }
    };

    let dir = chosen
        .canonicalize()
        .with_context(|| format!("project folder not found: {}", chosen.display()))?;
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    Ok(dir)
}

fn ask_mode<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Mode> {
    let answer = prompt(
        input,
        output,
        "Enter a specific date (YYYY-MM-DD) or type 'ALL' to process all clue images: ",
    )?;
    if answer.eq_ignore_ascii_case("all") {
        return Ok(Mode::All);
    }
    let date = NaiveDate::parse_from_str(&answer, "%Y-%m-%d")
        .with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", answer))?;
    Ok(Mode::Single(date))
}

/// Dates to process for `mode`, given the clue dates on disk (newest first).
fn dates_for(mode: &Mode, available: &[NaiveDate]) -> Vec<NaiveDate> {
    match mode {
        Mode::Single(date) => vec![*date],
        Mode::Range(from, to) => {
            let mut dates: Vec<_> = available
                .iter()
                .copied()
                .filter(|d| d >= from && d <= to)
                .collect();
            dates.sort();
            dates
        }
        Mode::All => available.to_vec(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut input = io::stdin().lock();
    let mut output = io::stdout();
    let mut config = Config::load();

    let project_dir = resolve_project_dir(cli.project.clone(), &config, &mut input, &mut output)?;
    config.last_project_path = Some(project_dir.clone());
    let api_key = resolve_api_key(
        &mut config,
        |var| std::env::var(var).ok(),
        &mut input,
        &mut output,
    )?;
    config.save();

    let mode = match cli.mode() {
        Some(mode) => mode,
        None => ask_mode(&mut input, &mut output)?,
    };
    if let Mode::Single(date) = mode {
        let clue = clue_image_path(&project_dir, date);
        if !clue.is_file() {
            bail!("clue image not found at {}", clue.display());
        }
    }
    let dates = dates_for(&mode, &clue_dates(&project_dir)?);
    if dates.is_empty() {
        println!("No clue images to process.");
        return Ok(());
    }
    info!(count = dates.len(), project = %project_dir.display(), "starting");

    let generator = GeminiClient::new(
        &api_key,
        &config.gemini_model,
        RateLimiter::new(config.request_interval()),
    )?;
    let scraper = Scraper::new(
        ChromeLauncher::new(cli.headless(&config), config.navigation_timeout()),
        Navigator::new(config.settle_delay()),
    );
    let retry_policy = RetryPolicy::new(config.max_attempts, config.retry_backoff());
    let settings = PipelineSettings {
        auto_pick: cli.auto_pick,
        review: !cli.no_review,
        gemini_retry: retry_policy,
        scrape_retry: retry_policy,
    };

    let mut pipeline = Pipeline::new(generator, scraper, project_dir, settings, input, output);
    let summary = pipeline.run_batch(&dates, Local::now().date_naive());
    summary.print();

    let usage = pipeline.generator().usage();
    info!(
        model = pipeline.generator().model(),
        requests = usage.requests,
        prompt_tokens = usage.prompt_tokens,
        cached_tokens = usage.cached_tokens,
        output_tokens = usage.output_tokens,
        "Gemini usage"
    );

    if let Some(date) = summary.halted_at {
        bail!("stopped at {} because the Gemini quota is exhausted", date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_cli_modes() {
        let cli = Cli::parse_from(["name-that-yankee", "--date", "2024-05-01"]);
        assert_eq!(cli.mode(), Some(Mode::Single(date("2024-05-01"))));

        let cli = Cli::parse_from(["name-that-yankee", "--from", "2024-05-01", "--to", "2024-06-01"]);
        assert_eq!(cli.mode(), Some(Mode::Range(date("2024-05-01"), date("2024-06-01"))));

        assert_eq!(Cli::parse_from(["name-that-yankee", "--all"]).mode(), Some(Mode::All));
        assert_eq!(Cli::parse_from(["name-that-yankee"]).mode(), None);

        assert!(Cli::try_parse_from(["name-that-yankee", "--all", "--date", "2024-05-01"]).is_err());
        assert!(Cli::try_parse_from(["name-that-yankee", "--from", "2024-05-01"]).is_err());
        assert!(Cli::try_parse_from(["name-that-yankee", "--date", "May 1"]).is_err());
    }

    #[test]
    fn test_headless_resolution() {
        let config = Config::default();
        assert!(Cli::parse_from(["name-that-yankee"]).headless(&config));
        assert!(!Cli::parse_from(["name-that-yankee", "--headed"]).headless(&config));

        let headed_config = Config {
            headless: false,
            ..Config::default()
        };
        assert!(Cli::parse_from(["name-that-yankee", "--headless"]).headless(&headed_config));
        assert!(!Cli::parse_from(["name-that-yankee"]).headless(&headed_config));
    }

    #[test]
    fn test_dates_for_modes() {
        let available = vec![date("2024-07-04"), date("2024-05-20"), date("2024-05-01")];
        assert_eq!(
            dates_for(&Mode::Range(date("2024-05-01"), date("2024-06-30")), &available),
            vec![date("2024-05-01"), date("2024-05-20")]
        );
        assert_eq!(dates_for(&Mode::All, &available), available);
        assert_eq!(
            dates_for(&Mode::Single(date("2023-01-01")), &available),
            vec![date("2023-01-01")]
        );
    }

    #[test]
    fn test_ask_mode() {
        let mut out = Vec::new();
        assert_eq!(ask_mode(&mut Cursor::new("ALL\n"), &mut out).unwrap(), Mode::All);
        assert_eq!(
            ask_mode(&mut Cursor::new("2024-05-01\n"), &mut out).unwrap(),
            Mode::Single(date("2024-05-01"))
        );
        assert!(ask_mode(&mut Cursor::new("yesterday\n"), &mut out).is_err());
    }

    #[test]
    fn test_project_dir_defaults_to_last_used() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            last_project_path: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let resolved = resolve_project_dir(None, &config, &mut Cursor::new("\n"), &mut Vec::new()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());

        let quoted = format!("'{}'\n", dir.path().display());
        let resolved = resolve_project_dir(None, &Config::default(), &mut Cursor::new(quoted), &mut Vec::new()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());

        let missing = dir.path().join("missing");
        assert!(resolve_project_dir(Some(missing), &config, &mut Cursor::new(""), &mut Vec::new()).is_err());
    }
}
