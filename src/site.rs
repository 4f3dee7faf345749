//! Operator workflows over one site: the store of records, the published
//! root, and the long-lived embed cache.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{SiteRuntime, SiteSettings, upsert_env_value};
use crate::embed_cache::{EmbedCache, ReconcileReport, reconcile};
use crate::package::{Export, PublishOptions, PublishReport, export, publish};
use crate::record::{VideoDraft, VideoRecord};
use crate::regen::RegenerationContext;
use crate::scrape::discover_working_set;
use crate::source::{DirSource, HttpSource, PageSource};
use crate::store::RecordStore;

#[derive(Debug, Clone, Default)]
pub struct RegenerateOptions {
    /// Also bundle the batch into this archive.
    pub archive: Option<PathBuf>,
    pub xz: bool,
    pub prune_stale: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateOutcome {
    pub listing_pages: usize,
    pub detail_pages: usize,
    pub filled_embeds: usize,
    pub missing_embeds: Vec<String>,
    pub publish: PublishReport,
    #[serde(skip)]
    pub export: Option<Export>,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub removed: Vec<String>,
    pub unknown: Vec<String>,
    pub regenerated: RegenerateOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub already_stored: Vec<String>,
    pub reconcile: ReconcileReport,
}

/// One row of `clipsite list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedVideo {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub created: DateTime<Utc>,
    pub missing_embed: bool,
}

pub struct Site {
    store: RecordStore,
    site_root: PathBuf,
    settings: SiteSettings,
    cache: Arc<EmbedCache>,
    source: Box<dyn PageSource>,
}

impl Site {
    /// Embeds are re-extracted from the published root on disk.
    pub fn new(
        store: RecordStore,
        site_root: impl Into<PathBuf>,
        settings: SiteSettings,
        cache: Arc<EmbedCache>,
    ) -> Self {
        let site_root = site_root.into();
        Self {
            source: Box::new(DirSource::new(site_root.clone())),
            store,
            site_root,
            settings,
            cache,
        }
    }

    pub fn open(runtime: &SiteRuntime, cache: Arc<EmbedCache>) -> Result<Self> {
        let store = RecordStore::open(&runtime.content_root)?;
        Ok(Self::new(
            store,
            runtime.site_root.clone(),
            runtime.settings.clone(),
            cache,
        ))
    }

    /// Replaces where detail pages are read from during reconciliation.
    pub fn with_source(mut self, source: Box<dyn PageSource>) -> Self {
        self.source = source;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn cache(&self) -> &EmbedCache {
        &self.cache
    }

    pub fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    /// Published records, newest first. Drafts are not part of the site.
    pub fn working_set(&self) -> Result<Vec<VideoRecord>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|record| !record.draft)
            .collect())
    }

    pub fn prepare(&self) -> Result<(RegenerationContext, ReconcileReport)> {
        Ok(RegenerationContext::prepare(
            self.working_set()?,
            self.settings.clone(),
            &self.cache,
            self.source.as_ref(),
        ))
    }

    /// Full cycle: reconcile, persist recovered embeds, render, publish.
    pub fn regenerate(&self, options: &RegenerateOptions) -> Result<RegenerateOutcome> {
        let (context, report) = self.prepare()?;
        for id in report.from_cache.iter().chain(&report.from_pages) {
            if let Some(record) = context.records().iter().find(|record| &record.id == id) {
                self.store.upsert(record)?;
            }
        }

        let batch = context.generate();
        let export = match &options.archive {
            Some(path) => Some(export(&batch, path, options.xz)?),
            None => None,
        };
        let published = publish(
            &batch,
            &self.site_root,
            PublishOptions {
                prune_stale: options.prune_stale,
            },
        )?;

        Ok(RegenerateOutcome {
            listing_pages: batch.listing_pages().count(),
            detail_pages: batch.detail_pages().count(),
            filled_embeds: report.filled(),
            missing_embeds: report.missing,
            publish: published,
            export,
        })
    }

    /// Validates and stores a new record, then regenerates.
    ///
    /// If the cycle fails the record is withdrawn from the store and the
    /// cache again, so a retry does not leave two copies behind.
    pub fn add(
        &self,
        draft: VideoDraft,
        now: DateTime<Utc>,
        options: &RegenerateOptions,
    ) -> Result<(VideoRecord, RegenerateOutcome)> {
        let record = draft.into_record(now)?;
        if self.store.get(&record.id)?.is_some() {
            bail!("a video with id {} already exists", record.id);
        }
        self.store.upsert(&record)?;
        self.cache.set(&record.id, record.clone());

        match self.regenerate(options) {
            Ok(outcome) => {
                info!(id = %record.id, title = %record.title, "added video");
                Ok((record, outcome))
            }
            Err(err) => {
                warn!(id = %record.id, error = %err, "regeneration failed; withdrawing new video");
                self.cache.delete(&record.id);
                if let Err(rollback) = self.store.delete(&record.id) {
                    warn!(id = %record.id, error = %rollback, "failed to withdraw new video");
                }
                Err(err.context(format!("adding video {}", record.id)))
            }
        }
    }

    /// Removes records and their cache entries, then regenerates with stale
    /// detail pages pruned. Unknown ids are reported, not fatal, unless none
    /// of the ids matched.
    pub fn delete(&self, ids: &[String], options: &RegenerateOptions) -> Result<DeleteOutcome> {
        let mut removed = Vec::new();
        let mut unknown = Vec::new();
        for id in ids {
            self.cache.delete(id);
            if self.store.delete(id)? {
                info!(id = %id, "deleted video");
                removed.push(id.clone());
            } else {
                warn!(id = %id, "no stored video with this id");
                unknown.push(id.clone());
            }
        }
        if removed.is_empty()
            && let Some(first) = unknown.first()
        {
            return Err(crate::error::PipelineError::UnknownVideo(first.clone()).into());
        }

        let options = RegenerateOptions {
            prune_stale: true,
            ..options.clone()
        };
        let regenerated = self.regenerate(&options)?;
        Ok(DeleteOutcome {
            removed,
            unknown,
            regenerated,
        })
    }

    /// Deletes every record whose embed is still blank after reconciliation.
    pub fn prune_missing_embeds(&self, options: &RegenerateOptions) -> Result<DeleteOutcome> {
        let (_, report) = self.prepare()?;
        if report.missing.is_empty() {
            info!("every video has an embed; nothing to prune");
            return Ok(DeleteOutcome {
                removed: Vec::new(),
                unknown: Vec::new(),
                regenerated: self.regenerate(options)?,
            });
        }
        self.delete(&report.missing, options)
    }

    /// The reconciled working set with the file each record publishes to.
    pub fn list(&self) -> Result<Vec<ListedVideo>> {
        let (context, _) = self.prepare()?;
        Ok(context
            .records()
            .iter()
            .map(|record| ListedVideo {
                id: record.id.clone(),
                title: record.title.clone(),
                file_name: context.file_name(&record.id).unwrap_or_default().to_string(),
                created: record.created,
                missing_embed: !record.has_embed(),
            })
            .collect())
    }

    /// Rebuilds records from published listing pages in `source` and stores
    /// the ones the store does not know yet. Embeds come from the cache or
    /// the matching detail pages in the same source.
    pub fn import_legacy(&self, source: &dyn PageSource, now: DateTime<Utc>) -> Result<ImportReport> {
        let mut records = discover_working_set(source, now);
        info!(source = %source.describe(), found = records.len(), "discovered legacy videos");
        let reconciled = reconcile(&self.cache, &mut records, source);

        let mut report = ImportReport {
            reconcile: reconciled,
            ..ImportReport::default()
        };
        for record in records {
            if self.store.get(&record.id)?.is_some() {
                report.already_stored.push(record.id);
                continue;
            }
            self.store.upsert(&record)?;
            report.imported.push(record.id);
        }
        Ok(report)
    }
}

/// Source for `import-legacy`: the configured base URL when there is one,
/// the local published root otherwise.
pub fn legacy_source(settings: &SiteSettings, site_root: &Path) -> Box<dyn PageSource> {
    match settings.base_url.as_deref() {
        Some(base_url) => Box::new(HttpSource::new(base_url)),
        None => Box::new(DirSource::new(site_root)),
    }
}

/// Records `SITE_ROOT` (and `CONTENT_ROOT` when given) in the `.env` file.
pub fn init_env(env_path: &Path, site_root: &Path, content_root: Option<&Path>) -> Result<()> {
    upsert_env_value(env_path, "SITE_ROOT", &site_root.to_string_lossy())?;
    if let Some(content_root) = content_root {
        upsert_env_value(env_path, "CONTENT_ROOT", &content_root.to_string_lossy())?;
    }
    Ok(())
}
