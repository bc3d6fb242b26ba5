//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment variable that overrides `gateway.bot_token`.
pub const BOT_TOKEN_ENV: &str = "SCHEDWATCH_BOT_TOKEN";

/// Upper bound for `sync.ttl_secs` (100 years).
pub const MAX_TTL_SECS: u64 = 100 * 365 * 86_400;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Pass scheduling and record expiry
    #[serde(default)]
    pub sync: SyncConfig,

    /// Listing page location and markup
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP and retry behavior for document fetches
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Artifact output
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Record store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound messaging
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound duplicate suppression
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Notification texts
    #[serde(default)]
    pub messages: MessageTemplates,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.gateway.bot_token = Some(token.trim().to_string());
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            return Err(AppError::validation("sync.interval_secs must be > 0"));
        }
        if self.sync.ttl_secs == 0 {
            return Err(AppError::validation("sync.ttl_secs must be > 0"));
        }
        if self.sync.ttl_secs > MAX_TTL_SECS {
            return Err(AppError::validation(format!(
                "sync.ttl_secs must be <= {MAX_TTL_SECS}"
            )));
        }
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.max_concurrent == 0 {
            return Err(AppError::validation("fetcher.max_concurrent must be > 0"));
        }
        if self.fetcher.max_attempts == 0 {
            return Err(AppError::validation("fetcher.max_attempts must be > 0"));
        }

        let listing = url::Url::parse(&self.source.listing_url)?;
        if listing.host_str().is_none() {
            return Err(AppError::validation("source.listing_url has no hostname"));
        }
        for selector in [
            &self.source.item_selector,
            &self.source.group_label_selector,
        ] {
            Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
        }
        if self.source.group_class.trim().is_empty() {
            return Err(AppError::validation("source.group_class is empty"));
        }

        if self.gateway.kind == GatewayKind::Telegram && self.gateway.bot_token.is_none() {
            return Err(AppError::validation(format!(
                "gateway.kind = \"telegram\" requires gateway.bot_token or {BOT_TOKEN_ENV}"
            )));
        }

        if self.throttle.window_secs == 0 {
            return Err(AppError::validation("throttle.window_secs must be > 0"));
        }
        self.messages.utc_offset()?;
        Ok(())
    }
}

/// Pass scheduling and record expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between sync passes
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Seconds after which an un-refreshed record expires
    #[serde(default = "defaults::ttl")]
    pub ttl_secs: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Record TTL. Saturates at `chrono::Duration::MAX` for out-of-range values.
    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            ttl_secs: defaults::ttl(),
        }
    }
}

/// Listing page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Page that lists every published document
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// CSS selector for one document entry
    #[serde(default = "defaults::item_selector")]
    pub item_selector: String,

    /// Class of the ancestor element that groups entries into a category
    #[serde(default = "defaults::group_class")]
    pub group_class: String,

    /// CSS selector (inside the group) holding the category label
    #[serde(default = "defaults::group_label_selector")]
    pub group_label_selector: String,

    /// Index into `path.split('/')` of the document URL that names the category
    #[serde(default = "defaults::category_path_segment")]
    pub category_path_segment: usize,

    /// Accept a listing with no documents instead of failing the pass
    #[serde(default)]
    pub allow_empty: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::listing_url(),
            item_selector: defaults::item_selector(),
            group_class: defaults::group_class(),
            group_label_selector: defaults::group_label_selector(),
            category_path_segment: defaults::category_path_segment(),
            allow_empty: false,
        }
    }
}

/// Growth of the delay between fetch attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Linear,
    Exponential,
}

/// HTTP client and fetch pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum documents fetched in parallel
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per document before it is dropped from the pass
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Give the worker slot back while sleeping between attempts
    #[serde(default = "defaults::release_slot_on_backoff")]
    pub release_slot_on_backoff: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            backoff: BackoffKind::default(),
            release_slot_on_backoff: defaults::release_slot_on_backoff(),
        }
    }
}

/// Artifact output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Directory receiving rendered artifacts
    #[serde(default = "defaults::artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Reject documents without a PDF signature
    #[serde(default = "defaults::require_pdf")]
    pub require_pdf: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            artifact_dir: defaults::artifact_dir(),
            require_pdf: defaults::require_pdf(),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding `records.json`; relative paths resolve against the
    /// storage directory given on the command line
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Log outgoing messages only
    #[default]
    Log,
    Telegram,
}

/// Outbound messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,

    /// Bot API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    #[serde(default)]
    pub bot_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::default(),
            api_base: defaults::api_base(),
            bot_token: None,
        }
    }
}

/// Inbound duplicate suppression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Seconds an identical request stays suppressed
    #[serde(default = "defaults::throttle_window")]
    pub window_secs: u64,

    /// Maximum tracked keys
    #[serde(default = "defaults::throttle_capacity")]
    pub max_entries: usize,

    /// Identities that are never throttled
    #[serde(default)]
    pub ignored_identities: Vec<i64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_secs: defaults::throttle_window(),
            max_entries: defaults::throttle_capacity(),
            ignored_identities: Vec::new(),
        }
    }
}

/// Notification text templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplates {
    /// Offset used to render timestamps, e.g. `+07:00`
    #[serde(default = "defaults::utc_offset")]
    pub utc_offset: String,

    #[serde(default = "defaults::document_details")]
    pub document_details: String,

    #[serde(default = "defaults::changed_header")]
    pub changed_header: String,

    #[serde(default = "defaults::removed_header")]
    pub removed_header: String,

    #[serde(default = "defaults::unsubscribe_label")]
    pub unsubscribe_label: String,

    /// Answer to a suppressed inbound request; supports `{seconds}`
    #[serde(default = "defaults::throttle_notice")]
    pub throttle_notice: String,
}

impl MessageTemplates {
    /// Parse the configured display offset.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| AppError::validation(format!("messages.utc_offset '{}': {e}", self.utc_offset)))
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            utc_offset: defaults::utc_offset(),
            document_details: defaults::document_details(),
            changed_header: defaults::changed_header(),
            removed_header: defaults::removed_header(),
            unsubscribe_label: defaults::unsubscribe_label(),
            throttle_notice: defaults::throttle_notice(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Sync defaults
    pub fn interval() -> u64 {
        6 * 60 * 60
    }
    pub fn ttl() -> u64 {
        86_400
    }

    // Source defaults
    pub fn listing_url() -> String {
        "https://www.sibsiu.ru/raspisanie/".into()
    }
    pub fn item_selector() -> String {
        "li.ul_file".into()
    }
    pub fn group_class() -> String {
        "institut_div".into()
    }
    pub fn group_label_selector() -> String {
        "p".into()
    }
    pub fn category_path_segment() -> usize {
        3
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; schedwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        1_000
    }
    pub fn backoff_max() -> u64 {
        30_000
    }
    pub fn release_slot_on_backoff() -> bool {
        true
    }

    // Renderer defaults
    pub fn artifact_dir() -> PathBuf {
        PathBuf::from("artifacts")
    }
    pub fn require_pdf() -> bool {
        true
    }

    // Gateway defaults
    pub fn api_base() -> String {
        "https://api.telegram.org".into()
    }

    // Throttle defaults
    pub fn throttle_window() -> u64 {
        5
    }
    pub fn throttle_capacity() -> usize {
        10_000
    }

    // Message defaults
    pub fn utc_offset() -> String {
        "+07:00".into()
    }
    pub fn document_details() -> String {
        "<b>Category</b>: {category}\n\
         <b>File</b>: <a href=\"{link}\">{name}</a>\n\
         <b>Updated on site</b>: {origin_updated}\n\
         <b>Last checked</b>: {refreshed}"
            .into()
    }
    pub fn changed_header() -> String {
        "The schedule has been updated!".into()
    }
    pub fn removed_header() -> String {
        "The document is no longer on the site. Your subscription has been cancelled.".into()
    }
    pub fn unsubscribe_label() -> String {
        "Unsubscribe".into()
    }
    pub fn throttle_notice() -> String {
        "Please wait {seconds} seconds before sending the same message again.".into()
    }
}
