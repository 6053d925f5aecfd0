//! Per-date processing and the batch loop around it.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::browser::SessionLauncher;
use crate::error::{GeminiError, Retryable};
use crate::gemini::{GenerationService, Identification};
use crate::generate::{clue_image_path, generate_detail_page, rebuild_index};
use crate::navigator::{FirstCandidate, InteractivePrompt};
use crate::retry::{retry, RetryPolicy};
use crate::review::review_and_edit;
use crate::scrape::Scraper;
use crate::types::PlayerPage;

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Take the first search candidate instead of asking
    pub auto_pick: bool,
    pub review: bool,
    pub gemini_retry: RetryPolicy,
    pub scrape_retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOutcome {
    Generated { with_stats: bool },
    Skipped { reason: String },
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub generated: Vec<NaiveDate>,
    pub without_stats: Vec<NaiveDate>,
    pub skipped: Vec<(NaiveDate, String)>,
    /// First date not processed because the API quota ran out
    pub halted_at: Option<NaiveDate>,
    pub index_rebuilt: bool,
}

impl BatchSummary {
    pub fn pages_written(&self) -> usize {
        self.generated.len() + self.without_stats.len()
    }

    pub fn print(&self) {
        println!("\nSummary:");
        println!("  Pages generated:        {}", self.generated.len());
        println!("  Pages without stats:    {}", self.without_stats.len());
        for date in &self.without_stats {
            println!("    - {}", date);
        }
        println!("  Dates skipped:          {}", self.skipped.len());
        for (date, reason) in &self.skipped {
            println!("    - {}: {}", date, reason);
        }
        if let Some(date) = self.halted_at {
            println!("\nGemini quota exhausted. Resume from {} once the quota resets.", date);
        }
    }
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GeminiError>().is_some_and(|e| e.is_fatal())
}

/// Run `op` under `policy`; non-fatal failures degrade to the default value.
fn optional<T: Default>(
    policy: RetryPolicy,
    label: &str,
    op: impl FnMut() -> Result<T, GeminiError>,
) -> Result<T, GeminiError> {
    match retry(policy, label, op) {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(label, "giving up: {}", e);
            Ok(T::default())
        }
    }
}

pub struct Pipeline<G, L, R, W> {
    generator: G,
    scraper: Scraper<L>,
    project_dir: PathBuf,
    settings: PipelineSettings,
    input: R,
    output: W,
}

impl<G, L, R, W> Pipeline<G, L, R, W>
where
    G: GenerationService,
    L: SessionLauncher,
    R: BufRead,
    W: Write,
{
    pub fn new(
        generator: G,
        scraper: Scraper<L>,
        project_dir: PathBuf,
        settings: PipelineSettings,
        input: R,
        output: W,
    ) -> Self {
        Self {
            generator,
            scraper,
            project_dir,
            settings,
            input,
            output,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Identify, scrape, enrich, review and write the page for one date.
    ///
    /// Errors are reserved for conditions that should stop the batch (quota)
    /// or that leave the page unwritten (I/O).
    pub fn process_date(&mut self, date: NaiveDate) -> Result<DateOutcome> {
        let Pipeline {
            generator,
            scraper,
            project_dir,
            settings,
            input,
            output,
        } = self;

        let clue = clue_image_path(project_dir, date);
        if !clue.exists() {
            return Ok(DateOutcome::Skipped {
                reason: format!("clue image {} not found", clue.display()),
            });
        }
        info!(%date, "processing");

        let identification = match retry(settings.gemini_retry, "identify", || generator.identify(&clue)) {
            Ok(identification) => identification,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                return Ok(DateOutcome::Skipped {
                    reason: format!("identification failed: {}", e),
                })
            }
        };
        let (name, nickname) = match identification {
            Identification::Success { name, nickname } => (name, nickname),
            Identification::Failure { reason } => {
                return Ok(DateOutcome::Skipped {
                    reason: format!("player not identified: {}", reason),
                })
            }
        };

        let scraped = if settings.auto_pick {
            retry(settings.scrape_retry, "scrape", || {
                scraper.resolve_and_scrape(&name, &mut FirstCandidate)
            })
        } else {
            let mut prompt = InteractivePrompt::new(&mut *input, &mut *output);
            retry(settings.scrape_retry, "scrape", || {
                scraper.resolve_and_scrape(&name, &mut prompt)
            })
        };
        let stats = scraped.unwrap_or_else(|e| {
            warn!(player = name.as_str(), "scrape failed: {}", e);
            None
        });

        let facts = optional(settings.gemini_retry, "facts", || generator.facts(&name))?;
        let qa = optional(settings.gemini_retry, "qa", || generator.qa(&name, &facts))?;

        let mut page = PlayerPage::new(name, nickname);
        page.facts = facts;
        page.qa = qa;
        let with_stats = stats.is_some();
        if let Some(stats) = stats {
            page = page.with_stats(stats);
        }

        if settings.review {
            page = review_and_edit(page, project_dir, &mut *input, &mut *output)?;
        }

        generate_detail_page(&page, date, project_dir)?;
        Ok(DateOutcome::Generated { with_stats })
    }

    /// Process `dates` in order. A quota failure stops the loop; the index is
    /// rebuilt once if any page was written.
    pub fn run_batch(&mut self, dates: &[NaiveDate], today: NaiveDate) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (i, &date) in dates.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, dates.len(), date);
            match self.process_date(date) {
                Ok(DateOutcome::Generated { with_stats: true }) => summary.generated.push(date),
                Ok(DateOutcome::Generated { with_stats: false }) => summary.without_stats.push(date),
                Ok(DateOutcome::Skipped { reason }) => {
                    warn!(%date, "skipped: {}", reason);
                    summary.skipped.push((date, reason));
                }
                Err(e) if is_fatal(&e) => {
                    error!(%date, "{:#}", e);
                    summary.halted_at = Some(date);
                    break;
                }
                Err(e) => {
                    error!(%date, "{:#}", e);
                    summary.skipped.push((date, format!("{:#}", e)));
                }
            }
        }

        if summary.pages_written() > 0 {
            match rebuild_index(&self.project_dir, today) {
                Ok(()) => summary.index_rebuilt = true,
                Err(e) => error!("could not rebuild index: {:#}", e),
            }
        }
        summary
    }
}
