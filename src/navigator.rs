//! Turn a player name into exactly one profile page on Baseball-Reference.
//!
//! The site's search either redirects straight to a profile or shows a results
//! listing. Listings are narrowed to the "major leagues" group when present;
//! more than one survivor is handed to a [`DisambiguationPolicy`].

use std::io::{self, BufRead, Write};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use reqwest::Url;
use scraper::{CaseSensitivity, ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::ScrapeError;
use crate::types::{PlayerProfileReference, SearchResultCandidate};
use crate::utils::{collapsed_text, css};

pub const SITE_ROOT: &str = "https://www.baseball-reference.com";
const SEARCH_PATH: &str = "/search/search.fcgi";
const PROFILE_MARKER: &str = "/players/";
const MAJOR_LEAGUES_HEADING: &str = "major leagues";
const SEARCH_ITEM_CLASS: &str = "search-item";

static H3: LazyLock<Selector> = LazyLock::new(|| css("h3"));
static SEARCH_ITEM: LazyLock<Selector> = LazyLock::new(|| css("div.search-item"));
static ITEM_NAME: LazyLock<Selector> = LazyLock::new(|| css("div.search-item-name"));
static LINK: LazyLock<Selector> = LazyLock::new(|| css("a[href]"));

/// Picks one of several search candidates.
pub trait DisambiguationPolicy {
    /// Zero-based index into `candidates`; only called with two or more.
    fn choose(&mut self, candidates: &[SearchResultCandidate]) -> Result<usize, ScrapeError>;
}

/// Unattended runs take the first listed candidate. The site lists the most
/// prominent match first.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidate;

impl DisambiguationPolicy for FirstCandidate {
    fn choose(&mut self, candidates: &[SearchResultCandidate]) -> Result<usize, ScrapeError> {
        info!(
            chosen = candidates.first().map(|c| c.display_text.as_str()).unwrap_or(""),
            count = candidates.len(),
            "several players matched, taking the first"
        );
        Ok(0)
    }
}

/// Lists the candidates on a terminal and reads a 1-based choice.
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> DisambiguationPolicy for InteractivePrompt<R, W> {
    fn choose(&mut self, candidates: &[SearchResultCandidate]) -> Result<usize, ScrapeError> {
        writeln!(self.output, "\n  Multiple players found. Please choose one:")?;
        for (i, candidate) in candidates.iter().enumerate() {
            writeln!(self.output, "    {}: {}", i + 1, candidate.display_text)?;
        }

        loop {
            write!(self.output, "  Enter the number of the correct player: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no player selected").into());
            }
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=candidates.len()).contains(&n) => return Ok(n - 1),
                Ok(_) => writeln!(self.output, "  Invalid number.")?,
                Err(_) => writeln!(self.output, "  Invalid input.")?,
            }
        }
    }
}

/// Drop punctuation the search backend chokes on ("Chili Davis Jr." -> "Chili Davis Jr")
pub fn normalize_query(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

fn is_search_item(element: &ElementRef<'_>) -> bool {
    element.value().name() == "div"
        && element
            .value()
            .has_class(SEARCH_ITEM_CLASS, CaseSensitivity::CaseSensitive)
}

fn candidate_from_item(item: ElementRef<'_>) -> Option<SearchResultCandidate> {
    let link = item.select(&LINK).next()?;
    let profile_path = link.value().attr("href")?.trim().to_string();
    if profile_path.is_empty() {
        return None;
    }
    let display_text = item
        .select(&ITEM_NAME)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| collapsed_text(link));
    Some(SearchResultCandidate {
        display_text,
        profile_path,
    })
}

/// Candidates from a search results page, major-league entries only when the
/// page groups them.
pub fn parse_search_results(html: &str) -> Vec<SearchResultCandidate> {
    let doc = Html::parse_document(html);

    let major_leagues = doc.select(&H3).find(|h| {
        collapsed_text(*h)
            .to_lowercase()
            .contains(MAJOR_LEAGUES_HEADING)
    });

    let items: Vec<ElementRef> = match major_leagues {
        Some(heading) => heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "h3")
            .filter(is_search_item)
            .collect(),
        None => doc.select(&SEARCH_ITEM).collect(),
    };

    items.into_iter().filter_map(candidate_from_item).collect()
}

#[derive(Debug, Clone)]
pub struct Navigator {
    site_root: String,
    settle_delay: Duration,
}

impl Navigator {
    pub fn new(settle_delay: Duration) -> Self {
        Self::with_site_root(SITE_ROOT, settle_delay)
    }

    pub fn with_site_root(site_root: &str, settle_delay: Duration) -> Self {
        Self {
            site_root: site_root.trim_end_matches('/').to_string(),
            settle_delay,
        }
    }

    pub fn search_url(&self, query: &str) -> Result<String, ScrapeError> {
        let base = format!("{}{}", self.site_root, SEARCH_PATH);
        Url::parse_with_params(&base, &[("search", query)])
            .map(String::from)
            .map_err(|e| ScrapeError::Browser(format!("bad search URL {}: {}", base, e)))
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.site_root, path)
        } else {
            format!("{}/{}", self.site_root, path)
        }
    }

    fn visit<S: BrowserSession + ?Sized>(&self, session: &mut S, url: &str) -> Result<(), ScrapeError> {
        session.navigate(url)?;
        // Let client-side redirects and deferred tables settle.
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
        Ok(())
    }

    /// Resolve `name` to one profile page and leave the session on it.
    ///
    /// `Ok(None)` means the search produced no candidates. Browser faults are
    /// returned as errors without retrying.
    pub fn resolve<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        name: &str,
        policy: &mut dyn DisambiguationPolicy,
    ) -> Result<Option<PlayerProfileReference>, ScrapeError> {
        let query = normalize_query(name);
        debug!(name, query = query.as_str(), "searching");
        self.visit(session, &self.search_url(&query)?)?;

        let landed = session.current_url();
        let reference = if landed.contains(PROFILE_MARKER) {
            info!(url = landed.as_str(), "direct match");
            PlayerProfileReference::new(landed)
        } else {
            let candidates = parse_search_results(&session.page_source()?);
            let chosen = match candidates.len() {
                0 => {
                    info!(query = query.as_str(), "no matching players");
                    return Ok(None);
                }
                1 => &candidates[0],
                n => {
                    debug!(candidates = n, "disambiguating");
                    let index = policy.choose(&candidates)?;
                    match candidates.get(index) {
                        Some(c) => c,
                        None => {
                            warn!(index, candidates = n, "disambiguation picked a missing candidate");
                            return Ok(None);
                        }
                    }
                }
            };
            info!(player = chosen.display_text.as_str(), "resolved from listing");
            PlayerProfileReference::new(self.absolute_url(&chosen.profile_path))
        };

        if session.current_url() != reference.as_str() {
            self.visit(session, reference.as_str())?;
        }
        Ok(Some(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeSite;
    use std::io::Cursor;

    const PROFILE: &str = "https://www.baseball-reference.com/players/m/mattido01.shtml";

    struct Recording {
        calls: usize,
        pick: usize,
    }

    impl DisambiguationPolicy for Recording {
        fn choose(&mut self, _candidates: &[SearchResultCandidate]) -> Result<usize, ScrapeError> {
            self.calls += 1;
            Ok(self.pick)
        }
    }

    fn item(name: &str, href: &str) -> String {
        format!(
            r#"<div class="search-item"><div class="search-item-name"><strong><a href="{}">{}</a></strong> (1982-1995)</div><div class="search-item-url">{}</div></div>"#,
            href, name, href
        )
    }

    fn navigator() -> Navigator {
        Navigator::new(Duration::ZERO)
    }

    fn candidate(name: &str, path: &str) -> SearchResultCandidate {
        SearchResultCandidate {
            display_text: name.to_string(),
            profile_path: path.to_string(),
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("Chili Davis Jr."), "Chili Davis Jr");
        assert_eq!(normalize_query("Mike O'Neill-Smith"), "Mike ONeillSmith");
        assert_eq!(normalize_query("José Canseco"), "José Canseco");
    }

    #[test]
    fn test_search_url_is_form_encoded() {
        let url = navigator().search_url("Don Mattingly").unwrap();
        assert_eq!(
            url,
            "https://www.baseball-reference.com/search/search.fcgi?search=Don+Mattingly"
        );
    }

    #[test]
    fn test_absolute_url_forms() {
        let nav = navigator();
        assert_eq!(nav.absolute_url(PROFILE), PROFILE);
        assert_eq!(nav.absolute_url("/players/m/mattido01.shtml"), PROFILE);
        assert_eq!(nav.absolute_url("players/m/mattido01.shtml"), PROFILE);
    }

    #[test]
    fn test_major_league_group_preferred() {
        let html = format!(
            "<html><body><div id=\"players\"><h3>Major Leagues</h3>{}{}<h3>Minor Leagues</h3>{}</div></body></html>",
            item("Ken Griffey", "/players/g/griffke01.shtml"),
            item("Ken Griffey Jr.", "/players/g/griffke02.shtml"),
            item("Ken Griffey III", "/register/player.fcgi?id=griffe003"),
        );
        let found = parse_search_results(&html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].profile_path, "/players/g/griffke01.shtml");
        assert_eq!(found[0].display_text, "Ken Griffey (1982-1995)");
    }

    #[test]
    fn test_all_items_without_grouping() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            item("Bob Smith", "/players/s/smithbo01.shtml"),
            item("Bob Smith", "/players/s/smithbo02.shtml"),
        );
        assert_eq!(parse_search_results(&html).len(), 2);
    }

    #[test]
    fn test_items_without_links_skipped() {
        let html = r#"<div class="search-item"><div class="search-item-name">Nobody</div></div>"#;
        assert!(parse_search_results(html).is_empty());
    }

    #[test]
    fn test_direct_hit_skips_listing() {
        let nav = navigator();
        let search = nav.search_url("Don Mattingly").unwrap();
        let site = FakeSite::default().redirect(&search, PROFILE);
        let mut session = site.session();
        let mut policy = Recording { calls: 0, pick: 0 };

        let found = nav.resolve(&mut session, "Don Mattingly", &mut policy).unwrap();
        assert_eq!(found, Some(PlayerProfileReference::new(PROFILE)));
        assert_eq!(policy.calls, 0);
        // Already on the profile, so no second navigation.
        assert_eq!(site.visited(), vec![search]);
    }

    #[test]
    fn test_single_candidate_resolves_without_policy() {
        let nav = navigator();
        let search = nav.search_url("Don Mattingly").unwrap();
        let listing = format!(
            "<html><body><h3>Major Leagues</h3>{}<h3>Minor Leagues</h3>{}</body></html>",
            item("Don Mattingly", "/players/m/mattido01.shtml"),
            item("Don Mattingly", "/register/player.fcgi?id=mattin001don"),
        );
        let site = FakeSite::default().page(&search, &listing);
        let mut session = site.session();
        let mut policy = Recording { calls: 0, pick: 1 };

        let found = nav.resolve(&mut session, "Don Mattingly", &mut policy).unwrap();
        assert_eq!(found.unwrap().as_str(), PROFILE);
        assert_eq!(policy.calls, 0);
        assert_eq!(session.current_url(), PROFILE);
    }

    #[test]
    fn test_no_candidates_is_absent() {
        let nav = navigator();
        let search = nav.search_url("Nobody Atall").unwrap();
        let site = FakeSite::default().page(&search, "<html><body><p>No results</p></body></html>");
        let mut session = site.session();
        let mut policy = Recording { calls: 0, pick: 0 };

        assert_eq!(nav.resolve(&mut session, "Nobody Atall", &mut policy).unwrap(), None);
        assert_eq!(policy.calls, 0);
        assert_eq!(site.visited().len(), 1);
    }

    #[test]
    fn test_ambiguous_listing_uses_policy() {
        let nav = navigator();
        let search = nav.search_url("Bob Smith").unwrap();
        let listing = format!(
            "<html><body>{}{}</body></html>",
            item("Bob Smith", "/players/s/smithbo01.shtml"),
            item("Bob Smith", "/players/s/smithbo02.shtml"),
        );
        let site = FakeSite::default().page(&search, &listing);
        let mut session = site.session();
        let mut policy = Recording { calls: 0, pick: 1 };

        let found = nav.resolve(&mut session, "Bob Smith", &mut policy).unwrap().unwrap();
        assert_eq!(policy.calls, 1);
        assert_eq!(
            found.as_str(),
            "https://www.baseball-reference.com/players/s/smithbo02.shtml"
        );
    }

    #[test]
    fn test_navigation_fault_propagates() {
        let nav = navigator();
        let search = nav.search_url("Don Mattingly").unwrap();
        let site = FakeSite::default().fail_on(&search);
        let mut session = site.session();
        let err = nav.resolve(&mut session, "Don Mattingly", &mut FirstCandidate);
        assert!(matches!(err, Err(ScrapeError::Browser(_))));
    }

    #[test]
    fn test_first_candidate_policy() {
        let candidates = [candidate("A", "/a"), candidate("B", "/b")];
        assert_eq!(FirstCandidate.choose(&candidates).unwrap(), 0);
    }

    #[test]
    fn test_interactive_prompt_reprompts() {
        let candidates = [candidate("Bob Smith (1955-1959)", "/a"), candidate("Bob Smith (1913-1915)", "/b")];
        let input = Cursor::new("abc\n7\n2\n");
        let mut output = Vec::new();
        let choice = InteractivePrompt::new(input, &mut output).choose(&candidates).unwrap();
        assert_eq!(choice, 1);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("1: Bob Smith (1955-1959)"));
        assert!(shown.contains("2: Bob Smith (1913-1915)"));
        assert!(shown.contains("Invalid input."));
        assert!(shown.contains("Invalid number."));
    }

    #[test]
    fn test_interactive_prompt_eof_is_error() {
        let candidates = [candidate("A", "/a"), candidate("B", "/b")];
        let mut output = Vec::new();
        let result = InteractivePrompt::new(Cursor::new(""), &mut output).choose(&candidates);
        assert!(matches!(result, Err(ScrapeError::Prompt(_))));
    }
}
