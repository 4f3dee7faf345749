#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CLIPSITE_PORT: u16 = 8080;
pub const DEFAULT_CLIPSITE_HOST: &str = "127.0.0.1";
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_RELATED_LIMIT: usize = 6;
pub const DEFAULT_SITE_NAME: &str = "ClipSite";
pub const CONTENT_SUBDIR: &str = "content";

/// Presentation and pagination knobs shared by the regenerator and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub site_name: String,
    pub page_size: usize,
    pub related_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            related_limit: DEFAULT_RELATED_LIMIT,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteRuntime {
    pub site_root: PathBuf,
    pub content_root: PathBuf,
    pub port: u16,
    pub host: String,
    pub settings: SiteSettings,
}

pub fn load_site_runtime() -> Result<SiteRuntime> {
    resolve_site_runtime(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub site_root: Option<PathBuf>,
    pub content_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub page_size: Option<usize>,
    pub base_url: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_site_runtime(overrides: RuntimeOverrides) -> Result<SiteRuntime> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_site_runtime_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_site_runtime(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<SiteRuntime> {
    build_site_runtime_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_site_runtime_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<SiteRuntime> {
    let site_root = overrides
        .site_root
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("SITE_ROOT", file_vars, &env_lookup))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("SITE_ROOT not set"))?;
    let content_root = overrides
        .content_root
        .or_else(|| lookup_value("CONTENT_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| site_root.join(CONTENT_SUBDIR));
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("CLIPSITE_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_CLIPSITE_PORT);
    let host = non_blank(overrides.host)
        .or_else(|| lookup_value("CLIPSITE_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIPSITE_HOST.to_string());
    let page_size = overrides
        .page_size
        .or_else(|| parse_count("CLIPSITE_PAGE_SIZE", file_vars, &env_lookup))
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);
    let related_limit = parse_count("CLIPSITE_RELATED_LIMIT", file_vars, &env_lookup)
        .unwrap_or(DEFAULT_RELATED_LIMIT)
        .max(1);
    let site_name = lookup_value("CLIPSITE_SITE_NAME", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());
    let base_url = non_blank(overrides.base_url)
        .or_else(|| lookup_value("CLIPSITE_BASE_URL", file_vars, &env_lookup));

    Ok(SiteRuntime {
        site_root,
        content_root,
        port,
        host,
        settings: SiteSettings {
            site_name,
            page_size,
            related_limit,
            base_url,
        },
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn parse_count(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<usize> {
    lookup_value(key, file_vars, env_lookup).and_then(|value| value.parse::<usize>().ok())
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Updates or appends a single env var inside the target file while preserving
/// unrelated lines and comments.
pub fn upsert_env_value(path: &Path, key: &str, value: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }

    let raw = fs::read_to_string(path).unwrap_or_default();
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    let mut updated = false;
    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let rest = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            match rest.split_once('=') {
                Some((candidate, _)) if candidate.trim() == key => {
                    updated = true;
                    let indent = &line[..line.len() - trimmed.len()];
                    let prefix = if rest.len() != trimmed.len() { "export " } else { "" };
                    format!("{indent}{prefix}{key}=\"{escaped}\"")
                }
                _ => line.to_string(),
            }
        })
        .collect();

    if !updated {
        lines.push(format!("{key}=\"{escaped}\""));
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, lines.join("\n") + "\n")
        .with_context(|| format!("Writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn runtime_from(contents: &str) -> SiteRuntime {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_site_runtime(&vars, |_| None).unwrap()
    }

    #[test]
    fn site_runtime_defaults_everything_but_site_root() {
        let runtime = runtime_from("SITE_ROOT=\"/srv/site\"\n");
        assert_eq!(runtime.site_root, PathBuf::from("/srv/site"));
        assert_eq!(runtime.content_root, PathBuf::from("/srv/site/content"));
        assert_eq!(runtime.port, DEFAULT_CLIPSITE_PORT);
        assert_eq!(runtime.host, DEFAULT_CLIPSITE_HOST);
        assert_eq!(runtime.settings, SiteSettings::default());
    }

    #[test]
    fn site_runtime_requires_site_root() {
        let vars = read_env_file(make_config("CLIPSITE_PORT=9000\n").path()).unwrap();
        let err = build_site_runtime(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains("SITE_ROOT"));
    }

    #[test]
    fn site_runtime_reads_tuning_values() {
        let runtime = runtime_from(
            "SITE_ROOT=/s\nCONTENT_ROOT=/c\nCLIPSITE_PAGE_SIZE=12\nCLIPSITE_RELATED_LIMIT=2\nCLIPSITE_SITE_NAME=\"Daily\"\nCLIPSITE_BASE_URL=https://clips.test\n",
        );
        assert_eq!(runtime.content_root, PathBuf::from("/c"));
        assert_eq!(runtime.settings.page_size, 12);
        assert_eq!(runtime.settings.related_limit, 2);
        assert_eq!(runtime.settings.site_name, "Daily");
        assert_eq!(
            runtime.settings.base_url.as_deref(),
            Some("https://clips.test")
        );
    }

    #[test]
    fn invalid_or_zero_counts_fall_back() {
        let runtime = runtime_from(
            "SITE_ROOT=/s\nCLIPSITE_PAGE_SIZE=lots\nCLIPSITE_RELATED_LIMIT=0\nCLIPSITE_PORT=nope\n",
        );
        assert_eq!(runtime.settings.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(runtime.settings.related_limit, 1);
        assert_eq!(runtime.port, DEFAULT_CLIPSITE_PORT);
    }

    #[test]
    fn env_wins_over_file_and_overrides_win_over_env() {
        let vars = read_env_file(
            make_config("SITE_ROOT=/file\nCLIPSITE_PORT=7000\nCLIPSITE_HOST=file-host\n").path(),
        )
        .unwrap();
        let runtime = build_site_runtime_with_overrides(
            &vars,
            |key| match key {
                "SITE_ROOT" => Some("/env".to_string()),
                "CLIPSITE_PORT" => Some("8000".to_string()),
                _ => None,
            },
            RuntimeOverrides {
                port: Some(9000),
                host: Some("   ".into()),
                page_size: Some(3),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(runtime.site_root, PathBuf::from("/env"));
        assert_eq!(runtime.port, 9000);
        assert_eq!(runtime.host, "file-host");
        assert_eq!(runtime.settings.page_size, 3);
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export SITE_ROOT="/site"
            CONTENT_ROOT='/content'
            CLIPSITE_HOST =  "0.0.0.0"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("SITE_ROOT").unwrap(), "/site");
        assert_eq!(vars.get("CONTENT_ROOT").unwrap(), "/content");
        assert_eq!(vars.get("CLIPSITE_HOST").unwrap(), "0.0.0.0");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn upsert_env_value_replaces_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "# site\nexport SITE_ROOT=\"/old\"\nOTHER=1\n").unwrap();

        upsert_env_value(&path, "SITE_ROOT", "/new").unwrap();
        upsert_env_value(&path, "CONTENT_ROOT", "/records").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("# site\n"));
        assert!(raw.contains("export SITE_ROOT=\"/new\""));
        assert!(raw.contains("OTHER=1"));
        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("SITE_ROOT").unwrap(), "/new");
        assert_eq!(vars.get("CONTENT_ROOT").unwrap(), "/records");
    }
}
