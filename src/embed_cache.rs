//! Session-lifetime memo of known player embeds, keyed by record id.
//!
//! Listing pages never carry embed markup, so a working set rebuilt from them
//! comes back with blank embeds. The cache (and, on a miss, the record's own
//! detail page) fills them back in before anything is regenerated. The cache
//! outlives individual regeneration cycles; the backend keeps one per process.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::record::VideoRecord;
use crate::regen::plan_file_names;
use crate::render::detail_path;
use crate::scrape::{extract_embed, source_detail_path};
use crate::source::PageSource;

#[derive(Debug, Default)]
pub struct EmbedCache {
    entries: RwLock<HashMap<String, VideoRecord>>,
}

impl EmbedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached embed markup, if a non-blank one is known for `id`.
    pub fn get(&self, id: &str) -> Option<String> {
        self.entries
            .read()
            .get(id)
            .filter(|record| record.has_embed())
            .map(|record| record.embed.clone())
    }

    pub fn get_record(&self, id: &str) -> Option<VideoRecord> {
        self.entries.read().get(id).cloned()
    }

    pub fn set(&self, id: &str, record: VideoRecord) {
        self.entries.write().insert(id.to_owned(), record);
    }

    pub fn delete(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Outcome of one reconciliation pass, by record id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub from_cache: Vec<String>,
    pub from_pages: Vec<String>,
    /// Still blank afterwards. Kept in the working set, flagged for the operator.
    pub missing: Vec<String>,
}

impl ReconcileReport {
    pub fn filled(&self) -> usize {
        self.from_cache.len() + self.from_pages.len()
    }
}

/// Fills blank embeds in `records` in place, from the cache first and then by
/// re-extracting from each record's published detail page.
///
/// Records that already carry an embed refresh their cache entry. A blank
/// embed never overwrites a cached one. Fetch failures count as misses.
pub fn reconcile(
    cache: &EmbedCache,
    records: &mut [VideoRecord],
    source: &dyn PageSource,
) -> ReconcileReport {
    let file_names = plan_file_names(records);
    reconcile_planned(cache, records, source, &file_names)
}

/// Like [`reconcile`], with detail file names already planned for `records`.
///
/// Only pages the record owns are read: the file it was imported from and
/// the name it was assigned in `file_names`. A slug another record has
/// claimed is never consulted.
pub fn reconcile_planned(
    cache: &EmbedCache,
    records: &mut [VideoRecord],
    source: &dyn PageSource,
    file_names: &HashMap<String, String>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for record in records.iter_mut() {
        if record.has_embed() {
            cache.set(&record.id, record.clone());
            continue;
        }

        if let Some(embed) = cache.get(&record.id) {
            record.embed = embed;
            report.from_cache.push(record.id.clone());
            continue;
        }

        let planned = file_names.get(&record.id).map(String::as_str);
        match embed_from_detail_pages(record, planned, source) {
            Some(embed) => {
                record.embed = embed;
                cache.set(&record.id, record.clone());
                report.from_pages.push(record.id.clone());
            }
            None => {
                debug!(id = %record.id, "no embed found for record");
                report.missing.push(record.id.clone());
            }
        }
    }

    if !report.missing.is_empty() {
        warn!(count = report.missing.len(), ids = ?report.missing, "records without an embed");
    }
    info!(
        from_cache = report.from_cache.len(),
        from_pages = report.from_pages.len(),
        missing = report.missing.len(),
        "embed reconciliation finished"
    );
    report
}

/// Detail pages owned by a record, most specific first.
fn candidate_detail_paths(record: &VideoRecord, planned: Option<&str>) -> Vec<String> {
    let mut paths = Vec::with_capacity(2);
    if let Some(path) = source_detail_path(record) {
        paths.push(path);
    }
    if let Some(file_name) = planned {
        paths.push(detail_path(file_name));
    }
    paths.dedup();
    paths
}

fn embed_from_detail_pages(
    record: &VideoRecord,
    planned: Option<&str>,
    source: &dyn PageSource,
) -> Option<String> {
    for path in candidate_detail_paths(record, planned) {
        match source.fetch(&path) {
            Ok(Some(html)) => {
                if let Some(embed) = extract_embed(&html) {
                    debug!(id = %record.id, page = %path, "recovered embed from detail page");
                    return Some(embed);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(id = %record.id, page = %path, error = %err, "detail page unreadable");
            }
        }
    }
    None
}
