use async_trait::async_trait;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// How many entries a digest keeps.
pub const LATEST_ITEMS: usize = 5;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("Status code {}", .0.as_u16())]
    Status(StatusCode),
    #[error("{0}")]
    Parse(#[from] parser::ParseFeedError),
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Feed, FeedError>;
}

/// Downloads a feed over HTTP and parses it as RSS, Atom or JSON Feed.
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self, FeedError> {
        let client = Client::builder()
            .user_agent(concat!("AgentSmart/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FeedError> {
        info!("Fetching feed: {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let bytes = response.bytes().await?;

        Ok(parser::parse(&bytes[..])?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDigest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_description: Option<String>,
    pub latest_items: Vec<ItemSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub summary: String,
}

impl FeedDigest {
    /// Title, description and the first [`LATEST_ITEMS`] entries, each with
    /// a placeholder summary.
    pub fn from_feed(feed: &Feed) -> Self {
        Self {
            feed_title: feed.title.as_ref().map(|t| t.content.clone()),
            feed_description: feed.description.as_ref().map(|t| t.content.clone()),
            latest_items: feed
                .entries
                .iter()
                .take(LATEST_ITEMS)
                .map(ItemSummary::from_entry)
                .collect(),
        }
    }
}

impl ItemSummary {
    pub fn from_entry(entry: &Entry) -> Self {
        let title = entry.title.as_ref().map(|t| t.content.clone());
        let link = entry.links.first().map(|l| l.href.clone());
        let summary = placeholder_summary(title.as_deref());

        Self {
            title,
            link,
            summary,
        }
    }
}

pub fn placeholder_summary(title: Option<&str>) -> String {
    let title = title.filter(|t| !t.is_empty()).unwrap_or("No title");
    format!("AI summary of: {}...", title)
}
