// src/models/mod.rs

//! Domain models for the sync pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod document;
mod outcome;

// Re-export all public types
pub use config::{
    BOT_TOKEN_ENV, BackoffKind, Config, FetcherConfig, GatewayConfig, GatewayKind, MAX_TTL_SECS,
    MessageTemplates, RendererConfig, SourceConfig, StorageConfig, SyncConfig, ThrottleConfig,
};
pub use document::{
    Category, DocumentDescriptor, DocumentRecord, FetchedDocument, RecordId, SubscriberId,
};
pub use outcome::{
    ChangedDocument, DeliveryReport, FetchFailure, FetchOutcome, ReconciliationResult, SyncReport,
};
