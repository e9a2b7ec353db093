//! Error types for the harvesting engine.
//!
//! A single `HarvesterError` enum covers the whole crate. The client
//! distinguishes empty-result OAI codes (a successful run with zero
//! records) from real failures via [`HarvesterError::is_empty_result`].

use thiserror::Error;

use crate::protocol::OaiErrorCode;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Base URL is not http(s) or cannot be parsed.
    #[error("Invalid base URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidBaseUrl(String),

    /// Datestamp could not be interpreted.
    #[error("Invalid datestamp: '{0}'. Expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ")]
    InvalidDatestamp(String),

    /// Run-at time could not be interpreted.
    #[error("Invalid run-at time: '{0}'. Expected 24-hour HH:MM (e.g. 23:15)")]
    InvalidRunAtTime(String),

    /// HTTP request failed (connection, timeout, or non-success status).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// URL construction failed.
    #[error("URL construction failed: {0}")]
    Url(#[from] url::ParseError),

    /// XML parsing failed.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// The provider returned an OAI-PMH error response.
    #[error("OAI error {code} from provider: {message}")]
    Oai {
        code: OaiErrorCode,
        message: String,
    },

    /// The provider returned a structurally invalid response.
    #[error("Invalid {verb} response from provider: {reason}")]
    InvalidResponse {
        verb: &'static str,
        reason: String,
    },

    /// A string handed to the identifier decoder already contained a
    /// reserved character, indicating it was decoded (or never encoded).
    #[error("Cannot decode '{input}': reserved character '{found}' already present")]
    DoubleDecoded { input: String, found: char },

    /// A scheduler operation named a uid that is not registered.
    #[error("No scheduled harvest with uid {0}")]
    JobNotFound(u64),

    /// The harvest was killed between pages.
    #[error("Harvest received kill signal after {pages} page(s), {records} record(s)")]
    Killed { pages: usize, records: usize },

    /// A one-shot harvest finished in a non-success state.
    #[error("Harvest {status}: {message}")]
    HarvestFailed {
        status: &'static str,
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error.
    #[error("Zip archive failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// YAML (de)serialization error.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HarvesterError {
    /// True for OAI error codes that mean "no matching data", which
    /// terminate a run successfully with zero records rather than failing.
    #[must_use]
    pub fn is_empty_result(&self) -> bool {
        matches!(
            self,
            Self::Oai {
                code: OaiErrorCode::NoRecordsMatch | OaiErrorCode::NoSetHierarchy,
                ..
            }
        )
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
