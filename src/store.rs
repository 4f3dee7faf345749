//! Structured record store: one Markdown file with front matter per video.
//!
//! Files look like the CMS-authored entries the site started with:
//!
//! ```text
//! ---
//! id: morning-run-1720000000000
//! title: Morning Run
//! tags: running, outdoors
//! video_embed: <iframe src="..."></iframe>
//! ---
//! optional body
//! ```
//!
//! Keys and values are split on the first `:`; values are single-line, with
//! `\n` and `\\` escapes for the rare multi-line embed.
//!
//! Those escapes belong to this store alone. CMS tooling reads values
//! verbatim, so a value holding a newline or a backslash shows up escaped
//! there. Every other value is written exactly as the CMS would write it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::record::{VideoRecord, sort_newest_first};

pub const RECORD_EXTENSION: &str = "md";
const UNTITLED: &str = "Untitled Video";

#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Opens (and if necessary creates) the content directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating content directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every record on disk, drafts included, newest first. Files that do not
    /// parse are skipped with a warning.
    pub fn list(&self) -> Result<Vec<VideoRecord>> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("scanning {}", self.root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION)
            {
                continue;
            }
            match read_record(path)? {
                Some(record) => records.push(record),
                None => warn!(path = %path.display(), "skipping record without front matter"),
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<VideoRecord>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path)
    }

    /// Writes the record atomically, replacing any previous file for its id.
    pub fn upsert(&self, record: &VideoRecord) -> Result<()> {
        let path = self.path_for(&record.id)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, render_front_matter(record))
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| format!("replacing {}", path.display()))?;
        debug!(id = %record.id, "stored record");
        Ok(())
    }

    /// Returns whether a record file existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        ensure_safe_id(id)?;
        Ok(self.root.join(format!("{id}.{RECORD_EXTENSION}")))
    }
}

fn ensure_safe_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control)
    {
        bail!("invalid record id {id:?}");
    }
    Ok(())
}

fn read_record(path: &Path) -> Result<Option<VideoRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let fallback_created = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Ok(parse_front_matter(&content, stem, fallback_created))
}

/// Parses a record file. `stem` supplies the id when the front matter has
/// none; `fallback_created` is used when neither `created` nor `date` parse.
pub fn parse_front_matter(
    content: &str,
    stem: &str,
    fallback_created: DateTime<Utc>,
) -> Option<VideoRecord> {
    let block = front_matter_block(content)?;
    let mut record = VideoRecord {
        id: stem.to_string(),
        title: UNTITLED.to_string(),
        description: String::new(),
        tags: String::new(),
        thumbnail: String::new(),
        embed: String::new(),
        created: fallback_created,
        source_file: None,
        featured: false,
        draft: false,
    };
    let mut date: Option<DateTime<Utc>> = None;
    let mut created: Option<DateTime<Utc>> = None;

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = unescape_value(value.trim());
        match key {
            "id" if !value.is_empty() => record.id = value,
            "title" if !value.is_empty() => record.title = value,
            "description" => record.description = value,
            "tags" => record.tags = value,
            "thumbnail" => record.thumbnail = value,
            "video_embed" => record.embed = value,
            "source_file" if !value.is_empty() => record.source_file = Some(value),
            "featured" => record.featured = value == "true",
            "draft" => record.draft = value == "true",
            "created" => {
                created = DateTime::parse_from_rfc3339(&value)
                    .ok()
                    .map(|parsed| parsed.with_timezone(&Utc));
            }
            "date" => {
                date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .ok()
                    .and_then(|day| day.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc());
            }
            _ => {}
        }
    }

    record.created = created.or(date).unwrap_or(fallback_created);
    Some(record)
}

fn front_matter_block(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    if rest.starts_with("---") {
        return Some("");
    }
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

pub fn render_front_matter(record: &VideoRecord) -> String {
    let mut out = String::from("---\n");
    let mut push = |key: &str, value: &str| {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&escape_value(value));
        out.push('\n');
    };
    push("id", &record.id);
    push("title", &record.title);
    push("description", &record.description);
    push("tags", &record.tags);
    push("thumbnail", &record.thumbnail);
    push("video_embed", &record.embed);
    push("date", &record.posted_on());
    push(
        "created",
        &record
            .created
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    );
    if let Some(source_file) = &record.source_file {
        push("source_file", source_file);
    }
    push("featured", if record.featured { "true" } else { "false" });
    push("draft", if record.draft { "true" } else { "false" });
    out.push_str("---\n");
    out
}

fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample(id: &str, millis: i64) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            title: format!("Video {id}"),
            description: "desc: with colon".into(),
            tags: "tech, review".into(),
            thumbnail: "https://img.test/a.jpg".into(),
            embed: "<iframe src=\"https://p.test/1\"></iframe>\n<p>caption</p>".into(),
            created: Utc.timestamp_millis_opt(millis).unwrap(),
            source_file: None,
            featured: false,
            draft: false,
        }
    }

    #[test]
    fn upsert_then_get_preserves_every_field() -> Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path().join("content"))?;
        let mut record = sample("alpha-1", 1_700_000_000_250);
        record.source_file = Some("legacy.html".into());
        record.featured = true;
        store.upsert(&record)?;

        let fetched = store.get("alpha-1")?.expect("record stored");
        assert_eq!(fetched, record);
        Ok(())
    }

    #[test]
    fn list_sorts_newest_first_and_skips_unparseable_files() -> Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path())?;
        store.upsert(&sample("old", 1_000))?;
        store.upsert(&sample("new", 9_000))?;
        fs::write(dir.path().join("notes.md"), "no front matter here")?;
        fs::write(dir.path().join("ignored.txt"), "---\ntitle: x\n---\n")?;

        let ids: Vec<String> = store.list()?.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
        Ok(())
    }

    #[test]
    fn delete_reports_whether_file_existed() -> Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path())?;
        store.upsert(&sample("gone", 1))?;
        assert!(store.delete("gone")?);
        assert!(!store.delete("gone")?);
        assert!(store.get("gone")?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        assert!(store.get("../etc/passwd").is_err());
        assert!(store.delete("a/b").is_err());
        assert!(store.get("").is_err());
    }

    #[test]
    fn parses_cms_authored_files_with_defaults() {
        let fallback = Utc.timestamp_millis_opt(42).unwrap();
        let content = "---\ntitle: Sunset Timelapse\ntags: nature,sky\nvideo_embed: <iframe src=\"x\"></iframe>\ndate: 2024-02-10\ndraft: true\n---\nbody text\n";
        let record = parse_front_matter(content, "sunset", fallback).unwrap();
        assert_eq!(record.id, "sunset");
        assert_eq!(record.title, "Sunset Timelapse");
        assert_eq!(record.embed, "<iframe src=\"x\"></iframe>");
        assert_eq!(record.posted_on(), "2024-02-10");
        assert!(record.draft);

        let untitled = parse_front_matter("---\ndescription: only\n---\n", "x", fallback).unwrap();
        assert_eq!(untitled.title, UNTITLED);
        assert_eq!(untitled.created, fallback);

        assert!(parse_front_matter("title: no fence", "x", fallback).is_none());
    }

    #[test]
    fn plain_values_are_written_verbatim() {
        let mut record = sample("plain", 1);
        record.embed = r#"<iframe src="https://p.test/1" allow="autoplay"></iframe>"#.into();
        let rendered = render_front_matter(&record);
        assert!(rendered.contains(&format!("video_embed: {}\n", record.embed)));
        assert!(rendered.contains("description: desc: with colon\n"));

        let multi_line = render_front_matter(&sample("multi", 1));
        assert!(multi_line.contains("</iframe>\\n<p>caption</p>"));
    }

    #[test]
    fn escaping_round_trips_backslashes_and_newlines() {
        let raw = "line one\nline \\two\\n";
        assert_eq!(unescape_value(&escape_value(raw)), raw);
    }
}
