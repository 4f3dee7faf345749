//! One regeneration cycle: plan file names, reconcile embeds, render every
//! listing and detail page into an in-memory batch.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::config::SiteSettings;
use crate::embed_cache::{EmbedCache, ReconcileReport, reconcile_planned};
use crate::matcher::related_for;
use crate::record::{VideoRecord, sort_newest_first};
use crate::render::{
    Card, RelatedCard, detail_path, listing_file_name, render_detail_page, render_listing_page,
};
use crate::source::PageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Listing,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Site-relative path, e.g. `index.html` or `videos/cat-nap.html`.
    pub path: String,
    pub kind: FileKind,
    pub contents: String,
}

/// Every document produced by one cycle. Nothing is durable until the
/// whole batch has been published.
#[derive(Debug, Clone, Default)]
pub struct SiteBatch {
    pub files: Vec<GeneratedFile>,
}

impl SiteBatch {
    pub fn listing_pages(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.files.iter().filter(|file| file.kind == FileKind::Listing)
    }

    pub fn detail_pages(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.files.iter().filter(|file| file.kind == FileKind::Detail)
    }

    pub fn get(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// The working set for a single cycle, already reconciled against the
/// embed cache. Built fresh per cycle; the cache is the only state that
/// outlives it.
#[derive(Debug, Clone)]
pub struct RegenerationContext {
    records: Vec<VideoRecord>,
    settings: SiteSettings,
    file_names: HashMap<String, String>,
}

impl RegenerationContext {
    /// Drops drafts and duplicate ids, orders newest first, then fills blank
    /// embeds from `cache` or the published detail pages in `source`.
    /// Reconciliation always finishes before anything can be rendered.
    pub fn prepare(
        records: Vec<VideoRecord>,
        settings: SiteSettings,
        cache: &EmbedCache,
        source: &dyn PageSource,
    ) -> (Self, ReconcileReport) {
        let mut records: Vec<VideoRecord> = records.into_iter().filter(|r| !r.draft).collect();
        sort_newest_first(&mut records);

        let mut seen = HashSet::new();
        records.retain(|record| {
            let fresh = seen.insert(record.id.clone());
            if !fresh {
                warn!(id = %record.id, "duplicate identifier in working set; keeping newest");
            }
            fresh
        });

        // Reconciliation reads only the detail page each record owns.
        let file_names = plan_file_names(&records);
        let report = reconcile_planned(cache, &mut records, source, &file_names);
        (
            Self {
                records,
                settings,
                file_names,
            },
            report,
        )
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    /// Detail file name (without the `videos/` folder) assigned to `id`.
    pub fn file_name(&self, id: &str) -> Option<&str> {
        self.file_names.get(id).map(String::as_str)
    }

    pub fn page_count(&self) -> usize {
        self.records.len().div_ceil(self.settings.page_size.max(1)).max(1)
    }

    fn card<'a>(&'a self, record: &'a VideoRecord) -> Option<Card<'a>> {
        self.file_name(&record.id)
            .map(|file_name| Card { record, file_name })
    }

    fn render_detail(&self, record: &VideoRecord) -> String {
        let recommendations = related_for(record, &self.records, self.settings.related_limit);
        let related: Vec<RelatedCard<'_>> = recommendations
            .iter()
            .filter_map(|rec| {
                self.card(rec.record).map(|card| RelatedCard {
                    card,
                    matched_tags: &rec.matched_tags,
                })
            })
            .collect();
        render_detail_page(&self.settings, record, &related)
    }

    /// Renders a single detail page by its file name, for on-demand serving.
    pub fn detail_page(&self, file_name: &str) -> Option<String> {
        let record = self
            .records
            .iter()
            .find(|record| self.file_name(&record.id) == Some(file_name))?;
        Some(self.render_detail(record))
    }

    /// Renders the full batch: listing pages in page order, then one detail
    /// page per record in working-set order.
    pub fn generate(&self) -> SiteBatch {
        let page_size = self.settings.page_size.max(1);
        let total_pages = self.page_count();
        let mut files = Vec::with_capacity(total_pages + self.records.len());

        for page in 1..=total_pages {
            let start = (page - 1) * page_size;
            let end = (start + page_size).min(self.records.len());
            let cards: Vec<Card<'_>> = self.records[start.min(end)..end]
                .iter()
                .filter_map(|record| self.card(record))
                .collect();
            files.push(GeneratedFile {
                path: listing_file_name(page),
                kind: FileKind::Listing,
                contents: render_listing_page(&self.settings, &cards, page, total_pages),
            });
        }

        for record in &self.records {
            let Some(file_name) = self.file_name(&record.id) else {
                continue;
            };
            files.push(GeneratedFile {
                path: detail_path(file_name),
                kind: FileKind::Detail,
                contents: self.render_detail(record),
            });
        }

        info!(
            listing_pages = total_pages,
            detail_pages = self.records.len(),
            "generated site batch"
        );
        SiteBatch { files }
    }
}

fn usable_source_file(file: &str) -> bool {
    file.len() > ".html".len()
        && file.ends_with(".html")
        && !file.starts_with('.')
        && !file.contains(['/', '\\'])
}

/// Assigns every record a distinct detail file name.
///
/// Records claim names oldest first so an established page keeps its URL
/// when a newer record's title slugifies to the same thing. A record's
/// first choice is the file it was imported from, else `<slug>.html`;
/// later claimants fall back to `<id>.html`, then `<id>-2.html`, and so on.
pub fn plan_file_names(records: &[VideoRecord]) -> HashMap<String, String> {
    let mut oldest_first: Vec<&VideoRecord> = records.iter().collect();
    oldest_first.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

    let mut taken: HashSet<String> = HashSet::with_capacity(records.len());
    let mut names = HashMap::with_capacity(records.len());
    for record in oldest_first {
        let preferred = match record.source_file.as_deref() {
            Some(file) if usable_source_file(file) => file.to_string(),
            _ => {
                let slug = record.slug();
                if slug.is_empty() {
                    format!("{}.html", record.id)
                } else {
                    format!("{slug}.html")
                }
            }
        };

        let mut candidate = preferred;
        if taken.contains(&candidate) {
            candidate = format!("{}.html", record.id);
            let mut suffix = 2;
            while taken.contains(&candidate) {
                candidate = format!("{}-{suffix}.html", record.id);
                suffix += 1;
            }
            warn!(id = %record.id, file = %candidate, "detail file name collision resolved");
        }
        taken.insert(candidate.clone());
        names.insert(record.id.clone(), candidate);
    }
    names
}
