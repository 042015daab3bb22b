#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! COVID data source adapters.
//!
//! Each module fetches one provider's tables over HTTP and parses them
//! into the typed records of [`covid_atlas_source_models`]. Fetching and
//! parsing are split so the parsers can be exercised on literal text.
//! Transport failures and malformed tables are [`SourceError`]s; nothing
//! here retries.

pub mod cdc;
pub mod cdc_serology;
pub mod covariants;
pub mod economist;
pub mod google_mobility;
pub mod hhs;
pub mod jhu;
pub mod owid;
pub mod parsing;
pub mod progress;
pub mod scan;
pub mod state_policy;

/// Errors that can occur while fetching or parsing a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed or returned an error status.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A table parsed but breaks the layout its adapter expects.
    #[error("Bad {source_name} data: {message}")]
    Format {
        /// Source whose data was rejected.
        source_name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// A required setting was not provided.
    #[error("{name} is not set")]
    MissingSetting {
        /// Name of the environment variable.
        name: &'static str,
    },
}

impl SourceError {
    /// Shorthand for [`SourceError::Format`].
    #[must_use]
    pub fn format(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::Format {
            source_name,
            message: message.into(),
        }
    }
}

/// Fetches `url` and returns the body as text.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the request fails or the server
/// answers with an error status.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    log::info!("Fetching {url}");
    let text = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    log::debug!("Fetched {} bytes from {url}", text.len());
    Ok(text)
}

/// Builds the HTTP client shared by every adapter.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the TLS backend cannot be set up.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("covid-atlas/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
