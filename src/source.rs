//! Readers for already-published pages, either from the local site root or
//! from the live site over HTTP.

use std::{
    fs,
    io::Read,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_PAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Something that can hand back the HTML of a published page.
///
/// `Ok(None)` means the page does not exist. Errors are transport or I/O
/// failures; scraping callers downgrade them to "absent".
pub trait PageSource: Send + Sync {
    fn fetch(&self, relative_path: &str) -> Result<Option<String>>;

    fn describe(&self) -> String;
}

fn ensure_relative(relative_path: &str) -> Result<&Path> {
    let candidate = Path::new(relative_path.trim_start_matches('/'));
    if candidate.as_os_str().is_empty()
        || candidate
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        bail!("refusing to read {relative_path:?} outside the site root");
    }
    Ok(candidate)
}

#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PageSource for DirSource {
    fn fetch(&self, relative_path: &str) -> Result<Option<String>> {
        let path = self.root.join(ensure_relative(relative_path)?);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[derive(Clone)]
pub struct HttpSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn url_for(&self, relative_path: &str) -> String {
        format!("{}/{}", self.base_url, relative_path.trim_start_matches('/'))
    }
}

impl PageSource for HttpSource {
    fn fetch(&self, relative_path: &str) -> Result<Option<String>> {
        ensure_relative(relative_path)?;
        let url = self.url_for(relative_path);
        match self.agent.get(&url).call() {
            Ok(response) => {
                let mut body = String::new();
                response
                    .into_reader()
                    .take(MAX_PAGE_BYTES)
                    .read_to_string(&mut body)
                    .with_context(|| format!("reading body of {url}"))?;
                Ok(Some(body))
            }
            Err(ureq::Error::Status(404 | 410, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => bail!("GET {url} returned HTTP {code}"),
            Err(err) => Err(err).with_context(|| format!("GET {url}")),
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dir_source_reads_existing_and_reports_missing() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("videos"))?;
        fs::write(dir.path().join("videos/a.html"), "<h1>A</h1>")?;
        let source = DirSource::new(dir.path());

        assert_eq!(source.fetch("videos/a.html")?.as_deref(), Some("<h1>A</h1>"));
        assert_eq!(source.fetch("/videos/a.html")?.as_deref(), Some("<h1>A</h1>"));
        assert!(source.fetch("page2.html")?.is_none());
        Ok(())
    }

    #[test]
    fn dir_source_rejects_traversal() {
        let source = DirSource::new("/tmp");
        assert!(source.fetch("../etc/passwd").is_err());
        assert!(source.fetch("").is_err());
    }

    #[test]
    fn http_source_joins_urls() {
        let source = HttpSource::new("https://clips.test/");
        assert_eq!(
            source.url_for("/videos/a.html"),
            "https://clips.test/videos/a.html"
        );
        assert_eq!(source.describe(), "https://clips.test");
    }
}
