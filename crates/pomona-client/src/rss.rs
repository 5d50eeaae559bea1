//! RSS 2.0 and Atom feed adapter.
//!
//! A feed source lists its feed URLs in `feeds`; all are fetched on every run
//! and there is no pagination. Items without a `guid` or `id` get a stable
//! identifier hashed from the feed URL, link and title.

use pomona_core::adapter::{FetchPlan, FetchRequest, PayloadOrigin, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use serde_json::json;

use crate::text::{detect_remote_type, fallback_id, strip_html};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize, Debug)]
struct Rss {
    channel: Channel,
}

#[derive(Deserialize, Debug)]
struct Channel {
    title: Option<String>,
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Deserialize, Debug)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(default, rename = "category")]
    categories: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct AtomFeed {
    title: Option<Text>,
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Deserialize, Debug)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(default, rename = "link")]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
    author: Option<AtomAuthor>,
}

#[derive(Deserialize, Debug)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AtomAuthor {
    name: Option<String>,
}

/// Element text, ignoring attributes such as `isPermaLink` or `type`.
#[derive(Deserialize, Debug)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// A feed item after format-specific parsing.
struct FeedItem {
    id: Option<String>,
    title: String,
    link: Option<String>,
    published: Option<String>,
    description: Option<String>,
    author: Option<String>,
    categories: Vec<String>,
}

enum FeedFormat {
    Rss,
    Atom,
}

// =============================================================================
// Adapter
// =============================================================================

#[derive(Debug, Clone)]
pub struct RssAdapter {
    slug: String,
    feeds: Vec<String>,
    company: Option<String>,
}

impl RssAdapter {
    /// `params.company` names the employer when the feed belongs to one.
    pub fn new(entry: &SourceEntry) -> Self {
        Self {
            slug: entry.slug.clone(),
            feeds: entry
                .feeds
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            company: entry.param("company").map(str::to_string),
        }
    }

    fn to_job(&self, feed_url: &str, feed_title: Option<&str>, item: FeedItem) -> NormalizedJob {
        let id = item
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| item.link.clone())
            .unwrap_or_else(|| {
                fallback_id(&[
                    feed_url,
                    item.title.as_str(),
                    item.published.as_deref().unwrap_or_default(),
                ])
            });

        let raw = json!({
            "feed": feed_url,
            "id": item.id,
            "title": item.title,
            "link": item.link,
            "published": item.published,
            "description": item.description,
            "author": item.author,
            "categories": item.categories,
        });

        let mut job = NormalizedJob::new(&self.slug, id, strip_html(&item.title));
        job.company = self
            .company
            .clone()
            .or(item.author)
            .or_else(|| feed_title.map(str::to_string));
        job.description = item.description.as_deref().map(strip_html);
        job.remote_type = detect_remote_type(
            std::iter::once(job.title.as_str()).chain(item.categories.iter().map(String::as_str)),
        );
        job.posted_date = item.published;
        job.external_url = item.link;
        job.raw = raw;
        job
    }
}

/// Local name of the document's root element.
fn detect_format(xml: &str) -> Result<FeedFormat, AppError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"rss" => Ok(FeedFormat::Rss),
                    b"feed" => Ok(FeedFormat::Atom),
                    other => Err(AppError::ParseError(format!(
                        "unsupported feed root element <{}>",
                        String::from_utf8_lossy(other)
                    ))),
                };
            }
            Ok(Event::Eof) => {
                return Err(AppError::ParseError("empty feed document".to_string()));
            }
            Ok(_) => {}
            Err(e) => return Err(AppError::ParseError(format!("malformed feed XML: {}", e))),
        }
    }
}

fn parse_items(xml: &str) -> Result<(Option<String>, Vec<FeedItem>), AppError> {
    let malformed = |e: quick_xml::de::DeError| AppError::ParseError(format!("malformed feed XML: {}", e));

    match detect_format(xml)? {
        FeedFormat::Rss => {
            let rss: Rss = quick_xml::de::from_str(xml).map_err(malformed)?;
            let items = rss
                .channel
                .items
                .into_iter()
                .map(|item| FeedItem {
                    id: item.guid.map(|g| g.value),
                    title: item.title.unwrap_or_default(),
                    link: item.link.map(|l| l.trim().to_string()),
                    published: item.pub_date,
                    description: item.description,
                    author: None,
                    categories: item.categories,
                })
                .collect();
            Ok((rss.channel.title, items))
        }
        FeedFormat::Atom => {
            let feed: AtomFeed = quick_xml::de::from_str(xml).map_err(malformed)?;
            let items = feed
                .entries
                .into_iter()
                .map(|entry| {
                    let link = entry
                        .links
                        .iter()
                        .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
                        .or(entry.links.first())
                        .and_then(|l| l.href.clone());
                    FeedItem {
                        id: entry.id,
                        title: entry.title.map(|t| t.value).unwrap_or_default(),
                        link,
                        published: entry.published.or(entry.updated),
                        description: entry.content.or(entry.summary).map(|t| t.value),
                        author: entry.author.and_then(|a| a.name),
                        categories: Vec::new(),
                    }
                })
                .collect();
            Ok((feed.title.map(|t| t.value), items))
        }
    }
}

impl SourceAdapter for RssAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn plan(&self) -> FetchPlan {
        FetchPlan::Feeds
    }

    fn expected_page_size(&self) -> usize {
        0
    }

    fn build_url(&self, _cursor: &IngestionCursor) -> Option<String> {
        self.feeds.first().cloned()
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let feed_url = match payload.origin {
            PayloadOrigin::Feed(url) => url,
            _ => self.feeds.first().map(String::as_str).unwrap_or_default(),
        };
        let (feed_title, items) = parse_items(payload.text()?)?;
        Ok(items
            .into_iter()
            .filter(|item| !item.title.trim().is_empty())
            .map(|item| self.to_job(feed_url, feed_title.as_deref(), item))
            .collect())
    }

    fn missing_config(&self) -> String {
        format!("feed URLs for source '{}'", self.slug)
    }

    fn feed_requests(&self) -> Option<Vec<FetchRequest>> {
        if self.feeds.is_empty() {
            return None;
        }
        Some(self.feeds.iter().map(FetchRequest::get).collect())
    }
}
