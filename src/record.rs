//! Video records as the site knows them.
//!
//! A record is created from operator input (`VideoDraft`) or discovered by
//! scraping published pages, and is keyed by its identifier everywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrors};
use crate::slug::{generate_id, slugify};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Slug plus creation millis; stable key for the cache and the store.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Comma-separated free text exactly as entered.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub thumbnail: String,
    /// Raw player markup. Empty means "unknown", never "removed".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub embed: String,
    pub created: DateTime<Utc>,
    /// Detail page filename this record was discovered under, if scraped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub draft: bool,
}

impl VideoRecord {
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    pub fn tag_list(&self) -> Vec<String> {
        normalize_tags(&self.tags)
    }

    pub fn has_embed(&self) -> bool {
        !self.embed.trim().is_empty()
    }

    /// Publication date shown on detail pages.
    pub fn posted_on(&self) -> String {
        self.created.format("%Y-%m-%d").to_string()
    }
}

/// Splits on commas, trims, lowercases and drops empty entries.
///
/// Empty tags are dropped because an empty string is a substring of every
/// tag and would match everything in the recommender.
pub fn normalize_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Operator-submitted fields for a new video.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDraft {
    pub title: String,
    pub description: String,
    pub tags: String,
    pub thumbnail: String,
    pub embed: String,
}

impl VideoDraft {
    /// Every field is required; all missing fields are reported at once.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let errors: Vec<ValidationError> = [
            ("title", &self.title),
            ("description", &self.description),
            ("tags", &self.tags),
            ("thumbnail", &self.thumbnail),
            ("embed", &self.embed),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| ValidationError { field })
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    pub fn into_record(self, created: DateTime<Utc>) -> Result<VideoRecord, ValidationErrors> {
        self.validate()?;
        let title = self.title.trim().to_string();
        Ok(VideoRecord {
            id: generate_id(&title, created),
            title,
            description: self.description.trim().to_string(),
            tags: self.tags.trim().to_string(),
            thumbnail: self.thumbnail.trim().to_string(),
            embed: self.embed.trim().to_string(),
            created,
            source_file: None,
            featured: false,
            draft: false,
        })
    }
}

/// Orders a working set newest-first, breaking ties by identifier.
pub fn sort_newest_first(records: &mut [VideoRecord]) {
    records.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
}
