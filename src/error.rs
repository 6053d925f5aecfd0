//! Typed failures at the browser and generation-service seams.
//!
//! "Not found" outcomes are never errors here; they travel as `Option`/empty
//! collections. These enums only describe faults the caller may retry or must
//! stop on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("could not read operator choice: {0}")]
    Prompt(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Gemini returned an empty response")]
    EmptyResponse,

    #[error("Gemini response was not the expected JSON: {reason} (text: {text})")]
    Malformed { reason: String, text: String },

    #[error("request to Gemini failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Gemini quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("could not read clue image: {0}")]
    Image(#[from] std::io::Error),
}

/// Classification used by the caller-level retry loop.
pub trait Retryable {
    /// Worth another attempt after a backoff.
    fn is_transient(&self) -> bool;

    /// Must stop the whole batch, not just the current item.
    fn is_fatal(&self) -> bool {
        false
    }
}

impl Retryable for ScrapeError {
    fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::Browser(_))
    }
}

impl Retryable for GeminiError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            GeminiError::EmptyResponse | GeminiError::Malformed { .. } | GeminiError::Http(_)
        )
    }

    fn is_fatal(&self) -> bool {
        matches!(self, GeminiError::QuotaExhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ScrapeError::Browser("tab crashed".into()).is_transient());
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(!ScrapeError::Prompt(eof).is_transient());

        assert!(GeminiError::EmptyResponse.is_transient());
        assert!(!GeminiError::EmptyResponse.is_fatal());
        let quota = GeminiError::QuotaExhausted("daily limit".into());
        assert!(quota.is_fatal());
        assert!(!quota.is_transient());
        let api = GeminiError::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!api.is_transient());
        assert!(!api.is_fatal());
    }
}
