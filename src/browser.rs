//! Scriptable browser sessions.
//!
//! The navigator only needs three things from a browser: go somewhere, say
//! where it ended up, and hand back the rendered markup. Sessions are released
//! by dropping them.

use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::debug;

use crate::error::ScrapeError;

pub trait BrowserSession {
    /// Load `url` and wait for the navigation to finish.
    fn navigate(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// Address after any client-side redirect
    fn current_url(&self) -> String;

    /// Rendered (post-script) document markup
    fn page_source(&self) -> Result<String, ScrapeError>;
}

/// Opens one session per scrape.
pub trait SessionLauncher {
    type Session: BrowserSession;

    fn launch(&self) -> Result<Self::Session, ScrapeError>;
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub headless: bool,
    pub navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(headless: bool, navigation_timeout: Duration) -> Self {
        Self {
            headless,
            navigation_timeout,
        }
    }
}

fn browser_error(context: &str, err: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Browser(format!("{}: {:#}", context, err))
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    fn launch(&self) -> Result<ChromeSession, ScrapeError> {
        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .idle_browser_timeout(self.navigation_timeout * 4)
            .build()
            .map_err(|e| browser_error("invalid Chrome launch options", e))?;

        let browser = Browser::new(options).map_err(|e| browser_error("failed to start Chrome", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| browser_error("failed to open tab", e))?;
        tab.set_default_timeout(self.navigation_timeout);

        debug!(headless = self.headless, "browser session opened");
        Ok(ChromeSession {
            tab,
            _browser: browser,
        })
    }
}

/// A Chrome process with one tab. Dropping it kills the process.
pub struct ChromeSession {
    // Declared before the browser so the tab handle goes first.
    tab: Arc<Tab>,
    _browser: Browser,
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        debug!(url, "navigating");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| browser_error(&format!("navigation to {} failed", url), e))?;
        Ok(())
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn page_source(&self) -> Result<String, ScrapeError> {
        self.tab
            .get_content()
            .map_err(|e| browser_error("failed to read page content", e))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        debug!("browser session closed");
    }
}
