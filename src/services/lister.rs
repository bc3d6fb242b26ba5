// src/services/lister.rs

//! Source lister.
//!
//! Fetches the listing page once and turns it into document descriptors.
//! Structural surprises on the page are reported as scrape errors; there is
//! no retry here, the next scheduled pass tries again.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{DocumentDescriptor, SourceConfig};

/// Produces the current set of published documents.
#[async_trait]
pub trait DocumentLister: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocumentDescriptor>>;
}

/// Lists documents from the institution's schedule page.
pub struct SourceLister {
    client: Client,
    config: SourceConfig,
}

impl SourceLister {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DocumentLister for SourceLister {
    async fn list_documents(&self) -> Result<Vec<DocumentDescriptor>> {
        let base_url = Url::parse(&self.config.listing_url)?;
        log::debug!("Fetching listing page {}", base_url);

        let html = self
            .client
            .get(base_url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::scrape(format!("listing page unavailable: {e}")))?
            .text()
            .await
            .map_err(|e| AppError::scrape(format!("listing page unreadable: {e}")))?;

        let descriptors = parse_listing(&html, &base_url, &self.config)?;
        log::info!("Listed {} document(s) at {}", descriptors.len(), base_url);
        Ok(descriptors)
    }
}

/// Parse a listing page into descriptors.
pub fn parse_listing(
    html: &str,
    base_url: &Url,
    config: &SourceConfig,
) -> Result<Vec<DocumentDescriptor>> {
    if base_url.host_str().is_none() {
        return Err(AppError::scrape(format!("listing URL {base_url} has no hostname")));
    }

    let item_sel = parse_selector(&config.item_selector)?;
    let label_sel = parse_selector(&config.group_label_selector)?;
    let link_sel = parse_selector("a[href]")?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();

    for item in document.select(&item_sel) {
        let descriptor = parse_item(item, base_url, config, &label_sel, &link_sel)?;
        if seen.insert(descriptor.source_url.clone()) {
            descriptors.push(descriptor);
        } else {
            log::debug!("Duplicate listing entry {}", descriptor.source_url);
        }
    }

    if descriptors.is_empty() && !config.allow_empty {
        return Err(AppError::scrape(format!(
            "no '{}' entries found on {base_url}",
            config.item_selector
        )));
    }
    Ok(descriptors)
}

fn parse_item(
    item: ElementRef<'_>,
    base_url: &Url,
    config: &SourceConfig,
    label_sel: &Selector,
    link_sel: &Selector,
) -> Result<DocumentDescriptor> {
    let group = item
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().classes().any(|c| c == config.group_class))
        .ok_or_else(|| {
            AppError::scrape(format!(
                "entry '{}' is outside any '.{}' group",
                text_of(item),
                config.group_class
            ))
        })?;

    let category_label = group
        .select(label_sel)
        .next()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::scrape(format!(
                "group has no '{}' label",
                config.group_label_selector
            ))
        })?;

    let href = item
        .select(link_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| AppError::scrape(format!("entry '{}' has no link", text_of(item))))?;

    let source_url = base_url.join(&href.trim().replace('\\', "/"))?;
    if source_url.host_str().is_none() {
        return Err(AppError::scrape(format!("document URL {source_url} has no hostname")));
    }

    let category_id = source_url
        .path()
        .split('/')
        .nth(config.category_path_segment)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::scrape(format!(
                "document URL {source_url} has no path segment {}",
                config.category_path_segment
            ))
        })?
        .to_string();

    let display_name = text_of(item);
    if display_name.is_empty() {
        return Err(AppError::scrape(format!("entry {source_url} has no name")));
    }

    Ok(DocumentDescriptor {
        category_id,
        category_label,
        display_name,
        source_url: source_url.to_string(),
    })
}

/// Collected text with whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
