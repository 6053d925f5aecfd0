//! One browser session per player: resolve the profile, read the rendered
//! page, parse both stat blocks.

use scraper::Html;
use tracing::{info, warn};

use crate::browser::{BrowserSession, SessionLauncher};
use crate::error::ScrapeError;
use crate::navigator::{DisambiguationPolicy, Navigator};
use crate::stats::{parse_career_totals, parse_yearly};
use crate::types::CareerStats;

pub struct Scraper<L> {
    launcher: L,
    navigator: Navigator,
}

impl<L: SessionLauncher> Scraper<L> {
    pub fn new(launcher: L, navigator: Navigator) -> Self {
        Self {
            launcher,
            navigator,
        }
    }

    /// Find `name` on Baseball-Reference and scrape career totals plus yearly WAR.
    ///
    /// `Ok(None)` covers every "nothing usable" outcome: no search candidates,
    /// or only one of the two stat blocks on the page. Errors are browser or
    /// prompt faults; whether to retry is the caller's call. The session is
    /// dropped on every path.
    pub fn resolve_and_scrape(
        &self,
        name: &str,
        policy: &mut dyn DisambiguationPolicy,
    ) -> Result<Option<CareerStats>, ScrapeError> {
        info!(player = name, "scraping stats from Baseball-Reference");
        let mut session = self.launcher.launch()?;
        self.scrape_in(&mut session, name, policy)
    }

    fn scrape_in(
        &self,
        session: &mut L::Session,
        name: &str,
        policy: &mut dyn DisambiguationPolicy,
    ) -> Result<Option<CareerStats>, ScrapeError> {
        let Some(reference) = self.navigator.resolve(session, name, policy)? else {
            warn!(player = name, "no player page found");
            return Ok(None);
        };

        info!(url = %reference, "reading player page");
        let doc = Html::parse_document(&session.page_source()?);
        let totals = parse_career_totals(&doc);
        let yearly = parse_yearly(&doc);

        let has_totals = totals.as_ref().is_some_and(|t| !t.is_empty());
        let seasons = yearly.len();
        match CareerStats::from_parts(totals, yearly) {
            Some(stats) => {
                info!(
                    stats = stats.career_totals.len(),
                    seasons, "all stats scraped"
                );
                Ok(Some(stats))
            }
            None => {
                warn!(
                    player = name,
                    career_totals = has_totals,
                    seasons,
                    "incomplete stats, discarding"
                );
                Ok(None)
            }
        }
    }
}
