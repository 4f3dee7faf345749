//! Structural extraction of video records from published HTML.
//!
//! Listing pages expose one `.video-card` per video; detail pages expose the
//! player markup inside `.responsive-embed`. Only the detail page carries the
//! embed, which is why the embed cache exists at all.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use crate::record::VideoRecord;
use crate::render::{DETAIL_DIR, listing_file_name};
use crate::slug::generate_id;
use crate::source::PageSource;

/// Element id the player gets when the site renders it.
pub const PLAYER_ELEMENT_ID: &str = "videoPlayer";
/// Upper bound on `pageN.html` discovery.
pub const MAX_LISTING_PAGES: usize = 1000;

static CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".video-card").expect("BUG: hardcoded CSS selector '.video-card' is invalid")
});
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid"));
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("BUG: hardcoded CSS selector 'img' is invalid"));
static H2_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2").expect("BUG: hardcoded CSS selector 'h2' is invalid"));
static P_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("BUG: hardcoded CSS selector 'p' is invalid"));
static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("BUG: hardcoded CSS selector 'h1' is invalid"));
static EMBED_CONTAINER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".responsive-embed")
        .expect("BUG: hardcoded CSS selector '.responsive-embed' is invalid")
});
static PLAYER_ID_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#videoPlayer").expect("BUG: hardcoded CSS selector '#videoPlayer' is invalid")
});
static PLAYER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("iframe, video, embed, object")
        .expect("BUG: hardcoded CSS selector for player elements is invalid")
});

/// One card as found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedCard {
    pub title: String,
    pub description: String,
    pub tags: String,
    pub thumbnail: String,
    /// Last path segment of the card link, e.g. `morning-run.html`.
    pub detail_file: String,
    pub id: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Cards without a link or a title are skipped.
pub fn scrape_listing(html: &str) -> Vec<ScrapedCard> {
    let document = Html::parse_document(html);
    document
        .select(&CARD_SELECTOR)
        .filter_map(|card| {
            let link = card.select(&LINK_SELECTOR).next()?;
            let title = card
                .select(&H2_SELECTOR)
                .next()
                .map(text_of)
                .filter(|title| !title.is_empty())
                .or_else(|| non_empty_attr(card, "data-title"))?;
            let description = card
                .select(&P_SELECTOR)
                .next()
                .map(text_of)
                .or_else(|| non_empty_attr(card, "data-description"))
                .unwrap_or_default();
            let thumbnail = card
                .select(&IMG_SELECTOR)
                .next()
                .and_then(|img| non_empty_attr(img, "src"))
                .unwrap_or_default();
            let href = link.value().attr("href").unwrap_or_default();
            let detail_file = href
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            let created = non_empty_attr(card, "data-created").and_then(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|parsed| parsed.with_timezone(&Utc))
            });

            Some(ScrapedCard {
                title,
                description,
                tags: non_empty_attr(card, "data-tags").unwrap_or_default(),
                thumbnail,
                detail_file,
                id: non_empty_attr(card, "data-id"),
                created,
            })
        })
        .collect()
}

/// Title of a detail page (its `<h1>`).
pub fn extract_detail_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&H1_SELECTOR)
        .next()
        .map(text_of)
        .filter(|title| !title.is_empty())
}

/// Pulls the player markup out of a detail page.
///
/// Inside `.responsive-embed`, prefers `#videoPlayer`, then the first
/// `iframe`/`video`/`embed`/`object`, then whatever else the container holds
/// minus its buttons and comments. Returns `None` when nothing is left.
pub fn extract_embed(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let container = document.select(&EMBED_CONTAINER_SELECTOR).next()?;

    if let Some(player) = container.select(&PLAYER_ID_SELECTOR).next() {
        return Some(player.html());
    }
    if let Some(player) = container.select(&PLAYER_SELECTOR).next() {
        return Some(player.html());
    }

    let mut markup = String::new();
    for child in container.children() {
        match child.value() {
            Node::Element(element) if element.name() == "button" => {}
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    markup.push_str(&element.html());
                }
            }
            Node::Text(text) => markup.push_str(&html_escape::encode_text(&**text)),
            _ => {}
        }
    }
    let markup = markup.trim();
    (!markup.is_empty()).then(|| markup.to_string())
}

/// Rebuilds the working set from the published listing pages, newest first.
///
/// Reads `index.html`, then `page2.html`, `page3.html`, ... until a page is
/// missing. A page that fails to load counts as missing. Cards without
/// `data-created` get synthetic instants one millisecond apart so the page
/// order survives sorting. Embeds are left blank; see the embed cache.
pub fn discover_working_set(source: &dyn PageSource, now: DateTime<Utc>) -> Vec<VideoRecord> {
    let mut records: Vec<VideoRecord> = Vec::new();
    for page in 1..=MAX_LISTING_PAGES {
        let path = listing_file_name(page);
        let html = match source.fetch(&path) {
            Ok(Some(html)) => html,
            Ok(None) => break,
            Err(err) => {
                warn!(page = %path, source = %source.describe(), error = %err, "listing page unreadable; treating as absent");
                break;
            }
        };
        let cards = scrape_listing(&html);
        debug!(page = %path, cards = cards.len(), "scraped listing page");
        for card in cards {
            let position = records.len() as i64;
            let record = card_to_record(card, now - Duration::milliseconds(position));
            if records.iter().any(|existing| existing.id == record.id) {
                warn!(id = %record.id, "duplicate card id on listing pages; keeping first");
                continue;
            }
            records.push(record);
        }
    }
    records
}

fn card_to_record(card: ScrapedCard, synthetic_created: DateTime<Utc>) -> VideoRecord {
    let created = card.created.unwrap_or(synthetic_created);
    let stem = card
        .detail_file
        .strip_suffix(".html")
        .unwrap_or(&card.detail_file)
        .to_string();
    let id = card
        .id
        .or_else(|| (!stem.is_empty()).then_some(stem))
        .unwrap_or_else(|| generate_id(&card.title, created));
    let source_file = (!card.detail_file.is_empty()).then(|| card.detail_file.clone());

    VideoRecord {
        id,
        title: card.title,
        description: card.description,
        tags: card.tags,
        thumbnail: card.thumbnail,
        embed: String::new(),
        created,
        source_file,
        featured: false,
        draft: false,
    }
}

/// Relative path of the detail page a record was discovered under, if any.
pub fn source_detail_path(record: &VideoRecord) -> Option<String> {
    record
        .source_file
        .as_ref()
        .map(|file| format!("{DETAIL_DIR}/{file}"))
}
