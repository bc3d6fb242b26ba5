//! Service layer for the sync pipeline.
//!
//! This module contains the stage implementations:
//! - Source listing (`SourceLister`)
//! - Bounded fetching with retry (`FetchWorkerPool`, `RetryPolicy`)
//! - Artifact rendering (`ArtifactWriter`)
//! - Outbound delivery (`Notifier`, `MessagingGateway`)
//! - Inbound duplicate suppression (`InboundThrottle`)

pub mod fetcher;
pub mod gateway;
pub mod lister;
pub mod notifier;
pub mod renderer;
pub mod retry;
pub mod throttle;

pub use fetcher::{DocumentFetcher, FetchWorkerPool, HttpDocumentFetcher};
#[cfg(feature = "telegram")]
pub use gateway::TelegramGateway;
pub use gateway::{Affordance, LogGateway, MessagingGateway};
pub use lister::{DocumentLister, SourceLister};
pub use notifier::Notifier;
pub use renderer::{ArtifactWriter, Renderer};
pub use retry::RetryPolicy;
pub use throttle::InboundThrottle;
