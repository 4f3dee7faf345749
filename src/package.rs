//! Writing a generated batch out: publishing into the site root, or bundling
//! it into a tar (optionally xz) archive for upload elsewhere.

use std::{
    collections::HashSet,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::regen::{FileKind, SiteBatch};
use crate::render::DETAIL_DIR;

const STAGING_PREFIX: &str = ".clipsite-staging-";
const ARCHIVE_PAGES_DIR: &str = "pages";

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Remove detail pages that no longer belong to any record.
    pub prune_stale: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PublishReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
}

fn digest_of_file(path: &Path) -> Result<Option<blake3::Hash>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Publishes `batch` into `site_root`.
///
/// The whole batch is first written to a staging directory inside the site
/// root; if that fails nothing published is touched. Files are then moved
/// into place one by one, skipping those whose content is unchanged.
pub fn publish(batch: &SiteBatch, site_root: &Path, options: PublishOptions) -> Result<PublishReport> {
    fs::create_dir_all(site_root)
        .with_context(|| format!("creating site root {}", site_root.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(site_root)
        .with_context(|| format!("creating staging directory in {}", site_root.display()))?;

    for file in &batch.files {
        let staged = staging.path().join(&file.path);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&staged, &file.contents)
            .with_context(|| format!("staging {}", file.path))?;
    }
    debug!(files = batch.files.len(), staging = %staging.path().display(), "staged batch");

    let mut report = PublishReport::default();
    for file in &batch.files {
        let target = site_root.join(&file.path);
        if digest_of_file(&target)? == Some(blake3::hash(file.contents.as_bytes())) {
            report.unchanged.push(file.path.clone());
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let staged = staging.path().join(&file.path);
        fs::rename(&staged, &target)
            .with_context(|| format!("publishing {}", target.display()))?;
        report.written.push(file.path.clone());
    }

    report.removed = prune_stale_listing_pages(batch, site_root)?;
    if options.prune_stale {
        report.removed.extend(prune_stale_detail_pages(batch, site_root)?);
    }

    info!(
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        removed = report.removed.len(),
        root = %site_root.display(),
        "published batch"
    );
    Ok(report)
}

/// `pageN.html` files past the end of the new pagination. Left in place they
/// would still be found by listing discovery.
fn prune_stale_listing_pages(batch: &SiteBatch, site_root: &Path) -> Result<Vec<String>> {
    let keep: HashSet<&str> = batch.listing_pages().map(|file| file.path.as_str()).collect();
    let mut removed = Vec::new();
    for entry in WalkDir::new(site_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("scanning {}", site_root.display()))?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let numbered = name
            .strip_prefix("page")
            .and_then(|rest| rest.strip_suffix(".html"))
            .is_some_and(|number| number.parse::<usize>().is_ok_and(|n| n >= 2));
        if !entry.file_type().is_file() || !numbered || keep.contains(name) {
            continue;
        }
        fs::remove_file(entry.path())
            .with_context(|| format!("removing {}", entry.path().display()))?;
        debug!(page = %name, "removed stale listing page");
        removed.push(name.to_string());
    }
    Ok(removed)
}

fn prune_stale_detail_pages(batch: &SiteBatch, site_root: &Path) -> Result<Vec<String>> {
    let detail_root = site_root.join(DETAIL_DIR);
    if !detail_root.is_dir() {
        return Ok(Vec::new());
    }
    let keep: HashSet<&str> = batch.detail_pages().map(|file| file.path.as_str()).collect();

    let mut removed = Vec::new();
    for entry in WalkDir::new(&detail_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("scanning {}", detail_root.display()))?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !entry.file_type().is_file() || !name.ends_with(".html") {
            continue;
        }
        let relative = format!("{DETAIL_DIR}/{name}");
        if keep.contains(relative.as_str()) {
            continue;
        }
        fs::remove_file(entry.path())
            .with_context(|| format!("removing {}", entry.path().display()))?;
        debug!(page = %relative, "removed stale detail page");
        removed.push(relative);
    }
    Ok(removed)
}

/// Path of a batch file inside an archive: listing pages under `pages/`,
/// detail pages under `videos/`.
fn archive_path(kind: FileKind, path: &str) -> String {
    match kind {
        FileKind::Listing => format!("{ARCHIVE_PAGES_DIR}/{path}"),
        FileKind::Detail => path.to_string(),
    }
}

/// Serializes `batch` as a tar archive, xz-compressed when `xz` is set.
pub fn build_archive(batch: &SiteBatch, xz: bool) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in &batch.files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                archive_path(file.kind, &file.path),
                file.contents.as_bytes(),
            )
            .with_context(|| format!("adding {} to archive", file.path))?;
    }
    let tarball = builder.into_inner().context("finishing tar archive")?;
    if !xz {
        return Ok(tarball);
    }
    let mut compressed = Vec::new();
    lzma_rs::xz_compress(&mut Cursor::new(tarball), &mut compressed)
        .context("xz-compressing archive")?;
    Ok(compressed)
}

/// Where an exported batch ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    Archive(PathBuf),
    /// Archive creation failed; the files were written individually here.
    Files { dir: PathBuf, count: usize },
}

/// Directory used when an archive cannot be produced: `site.tar.xz` falls
/// back to a sibling `site-files/`.
pub fn fallback_dir(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("site");
    archive.with_file_name(format!("{name}-files"))
}

fn write_archive(batch: &SiteBatch, archive: &Path, xz: bool) -> Result<()> {
    let bytes = build_archive(batch, xz)?;
    if let Some(parent) = archive.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = archive.with_extension("tmp");
    fs::write(&tmp_path, bytes).with_context(|| format!("writing {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, archive) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replacing {}", archive.display()));
    }
    Ok(())
}

/// Writes every file of `batch` under `dir` using the archive folder layout.
pub fn write_files(batch: &SiteBatch, dir: &Path) -> Result<usize> {
    for file in &batch.files {
        let path = dir.join(archive_path(file.kind, &file.path));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, &file.contents).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(batch.files.len())
}

/// Bundles `batch` into `archive`; if that fails, degrades to individual
/// files in [`fallback_dir`].
pub fn export(batch: &SiteBatch, archive: &Path, xz: bool) -> Result<Export> {
    match write_archive(batch, archive, xz) {
        Ok(()) => {
            info!(archive = %archive.display(), files = batch.files.len(), "wrote archive");
            Ok(Export::Archive(archive.to_path_buf()))
        }
        Err(err) => {
            let dir = fallback_dir(archive);
            warn!(archive = %archive.display(), error = %err, fallback = %dir.display(), "archive failed; writing files individually");
            let count = write_files(batch, &dir)?;
            Ok(Export::Files { dir, count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regen::GeneratedFile;
    use std::io::Read;
    use tempfile::tempdir;

    fn batch(details: &[(&str, &str)]) -> SiteBatch {
        let mut files = vec![GeneratedFile {
            path: "index.html".into(),
            kind: FileKind::Listing,
            contents: "<html>index</html>".into(),
        }];
        files.extend(details.iter().map(|(name, body)| GeneratedFile {
            path: format!("videos/{name}"),
            kind: FileKind::Detail,
            contents: body.to_string(),
        }));
        SiteBatch { files }
    }

    fn archive_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(Cursor::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn publish_writes_then_skips_unchanged() -> Result<()> {
        let dir = tempdir()?;
        let first = publish(&batch(&[("a.html", "A")]), dir.path(), PublishOptions::default())?;
        assert_eq!(first.written, vec!["index.html", "videos/a.html"]);
        assert_eq!(fs::read_to_string(dir.path().join("videos/a.html"))?, "A");

        let second = publish(&batch(&[("a.html", "A2")]), dir.path(), PublishOptions::default())?;
        assert_eq!(second.unchanged, vec!["index.html"]);
        assert_eq!(second.written, vec!["videos/a.html"]);
        assert_eq!(fs::read_to_string(dir.path().join("videos/a.html"))?, "A2");

        let leftovers = fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn prune_stale_removes_only_orphaned_detail_pages() -> Result<()> {
        let dir = tempdir()?;
        publish(&batch(&[("a.html", "A"), ("b.html", "B")]), dir.path(), PublishOptions::default())?;
        fs::write(dir.path().join("videos/notes.txt"), "keep")?;

        let kept = publish(&batch(&[("a.html", "A")]), dir.path(), PublishOptions::default())?;
        assert!(kept.removed.is_empty());
        assert!(dir.path().join("videos/b.html").exists());

        let pruned = publish(
            &batch(&[("a.html", "A")]),
            dir.path(),
            PublishOptions { prune_stale: true },
        )?;
        assert_eq!(pruned.removed, vec!["videos/b.html"]);
        assert!(!dir.path().join("videos/b.html").exists());
        assert!(dir.path().join("videos/notes.txt").exists());
        Ok(())
    }

    #[test]
    fn listing_pages_past_the_end_are_always_removed() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("page2.html"), "old")?;
        fs::write(dir.path().join("page-notes.html"), "keep")?;
        let report = publish(&batch(&[]), dir.path(), PublishOptions::default())?;
        assert_eq!(report.removed, vec!["page2.html"]);
        assert!(dir.path().join("page-notes.html").exists());
        Ok(())
    }

    #[test]
    fn archive_has_pages_and_videos_folders() -> Result<()> {
        let bytes = build_archive(&batch(&[("a.html", "A")]), false)?;
        assert_eq!(archive_names(&bytes), vec!["pages/index.html", "videos/a.html"]);
        Ok(())
    }

    #[test]
    fn xz_archive_decompresses_to_the_same_tar() -> Result<()> {
        let b = batch(&[("a.html", "A")]);
        let compressed = build_archive(&b, true)?;
        let mut tarball = Vec::new();
        lzma_rs::xz_decompress(&mut Cursor::new(compressed), &mut tarball).unwrap();
        assert_eq!(tarball, build_archive(&b, false)?);

        let mut archive = tar::Archive::new(Cursor::new(tarball));
        let mut entry = archive.entries()?.nth(1).unwrap()?;
        let mut body = String::new();
        entry.read_to_string(&mut body)?;
        assert_eq!(body, "A");
        Ok(())
    }

    #[test]
    fn export_falls_back_to_individual_files() -> Result<()> {
        let dir = tempdir()?;
        // A directory where the archive should go makes the rename fail.
        let archive = dir.path().join("site.tar.xz");
        fs::create_dir_all(archive.join("occupied"))?;

        let outcome = export(&batch(&[("a.html", "A")]), &archive, true)?;
        let expected_dir = dir.path().join("site-files");
        assert_eq!(outcome, Export::Files { dir: expected_dir.clone(), count: 2 });
        assert!(expected_dir.join("pages/index.html").exists());
        assert!(expected_dir.join("videos/a.html").exists());
        Ok(())
    }

    #[test]
    fn export_writes_archive_when_possible() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("out/site.tar");
        let outcome = export(&batch(&[]), &archive, false)?;
        assert_eq!(outcome, Export::Archive(archive.clone()));
        assert_eq!(archive_names(&fs::read(&archive)?), vec!["pages/index.html"]);
        Ok(())
    }
}
