// src/error.rs

//! Unified error handling for the sync pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listing page did not match the expected structure. Aborts the pass.
    #[error("Scrape error: {0}")]
    Scrape(String),

    /// A single document could not be fetched.
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The renderer rejected a document.
    #[error("Render error: {0}")]
    Render(String),

    /// A per-document operation failed on every attempt.
    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: Box<AppError> },

    /// Document store query or write failed. Aborts the pass.
    #[error("Store error: {0}")]
    Store(String),

    /// A message could not be delivered to a subscriber.
    #[error("Delivery to {subscriber} failed: {message}")]
    Delivery { subscriber: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a scrape error.
    pub fn scrape(message: impl Into<String>) -> Self {
        Self::Scrape(message.into())
    }

    /// Create a fetch error for a document URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a render error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a delivery error for a subscriber.
    pub fn delivery(subscriber: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Delivery {
            subscriber: subscriber.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error should abort the whole sync pass.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(self, Self::Scrape(_) | Self::Store(_))
    }
}
