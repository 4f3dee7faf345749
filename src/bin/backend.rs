#![forbid(unsafe_code)]

//! Axum backend for a published ClipSite.
//!
//! Serves the working set as JSON, renders detail pages on demand straight
//! from the record store, runs full regenerations when the build hook is
//! called, and serves everything else from the published site root.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, TimeZone, Utc};
use clipsite_tools::config::{RuntimeOverrides, SiteSettings, resolve_site_runtime};
use clipsite_tools::embed_cache::EmbedCache;
use clipsite_tools::error::PipelineError;
use clipsite_tools::init_tracing;
use clipsite_tools::record::VideoRecord;
use clipsite_tools::site::{RegenerateOptions, Site};
use mime_guess::MimeGuess;
use serde::Serialize;
use tokio::{fs::File, signal, sync::Mutex};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

const DETAIL_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Clone)]
struct BackendArgs {
    site_root: PathBuf,
    content_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
    settings: SiteSettings,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut site_root_override: Option<PathBuf> = None;
        let mut content_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--site-root=") {
                site_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--content-root=") {
                content_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--site-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--site-root requires a value"))?;
                    site_root_override = Some(PathBuf::from(value));
                }
                "--content-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--content-root requires a value"))?;
                    content_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let runtime = resolve_site_runtime(RuntimeOverrides {
            site_root: site_root_override,
            content_root: content_root_override,
            port: port_override,
            ..RuntimeOverrides::default()
        })?;
        let listen_host = match host_override {
            Some(host) => host,
            None => parse_host_arg(&runtime.host)?,
        };

        Ok(Self {
            site_root: runtime.site_root,
            content_root: runtime.content_root,
            port: runtime.port,
            listen_host,
            settings: runtime.settings,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/CLIPSITE_HOST")
}

/// Shared handler state.
///
/// `site` owns the store and the embed cache, so embeds recovered by one
/// build stay known to the next. `regen_lock` serialises reconciliation:
/// build hooks that find it held are refused, page renders wait for it.
#[derive(Clone)]
struct AppState {
    site: Arc<Site>,
    site_root: Arc<PathBuf>,
    regen_lock: Arc<Mutex<()>>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            details: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            details: None,
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => serde_json::json!({ "error": self.message, "details": details }),
            None => serde_json::json!({ "error": self.message }),
        };
        let mut response = (self.status, Json(body)).into_response();
        allow_any_origin(&mut response);
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn allow_any_origin(response: &mut Response) {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

fn json_response<T: Serialize>(value: T) -> Response {
    let mut response = Json(value).into_response();
    allow_any_origin(&mut response);
    response
}

/// Runs blocking store/filesystem work off the async runtime.
async fn blocking<T, F>(work: F) -> ApiResult<Result<T>>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))
}

#[derive(Serialize)]
struct VideosPayload {
    videos: Vec<VideoRecord>,
    config: SiteSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildHookResponse {
    message: String,
    timestamp: String,
    written: usize,
    unchanged: usize,
    removed: usize,
    missing_embeds: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let BackendArgs {
        site_root,
        content_root,
        port,
        listen_host,
        settings,
    } = BackendArgs::parse()?;

    let store = clipsite_tools::store::RecordStore::open(&content_root)?;
    let site = Site::new(store, site_root.clone(), settings, Arc::new(EmbedCache::new()));
    let state = AppState {
        site: Arc::new(site),
        site_root: Arc::new(site_root),
        regen_lock: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/api/videos", get(list_videos))
        .route("/api/videos/{id}", get(get_video))
        .route("/api/build-hook", post(build_hook))
        .route("/videos/{file}", get(video_page))
        .fallback(static_fallback)
        .with_state(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, content = %content_root.display(), "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

/// Served when the store cannot be read, so the frontend always has
/// something to show.
fn fallback_videos() -> Vec<VideoRecord> {
    let created = |millis: i64| -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    };
    vec![
        VideoRecord {
            id: "sample-video-1-1704067200000".into(),
            title: "Sample Video 1".into(),
            description: "A placeholder entry shown while the catalogue is unavailable.".into(),
            tags: "sample, placeholder".into(),
            thumbnail: "https://via.placeholder.com/320x180".into(),
            embed: String::new(),
            created: created(1_704_067_200_000),
            source_file: Some("first-video.html".into()),
            featured: false,
            draft: false,
        },
        VideoRecord {
            id: "sample-video-2-1704153600000".into(),
            title: "Sample Video 2".into(),
            description: "Another placeholder entry.".into(),
            tags: "sample".into(),
            thumbnail: "https://via.placeholder.com/320x180".into(),
            embed: String::new(),
            created: created(1_704_153_600_000),
            source_file: Some("second-video.html".into()),
            featured: false,
            draft: false,
        },
    ]
}

async fn list_videos(State(state): State<AppState>) -> ApiResult<Response> {
    let site = state.site.clone();
    let videos = match blocking(move || site.working_set()).await? {
        Ok(videos) => videos,
        Err(err) => {
            warn!(error = %err, "reading videos failed; serving fallback list");
            fallback_videos()
        }
    };
    Ok(json_response(VideosPayload {
        videos,
        config: state.site.settings().clone(),
    }))
}

fn ensure_safe_path_segment(value: &str) -> ApiResult<()> {
    if value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control)
    {
        return Err(ApiError::not_found("video not found"));
    }
    Ok(())
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&id)?;
    let site = state.site.clone();
    let lookup = id.clone();
    let record = blocking(move || site.store().get(&lookup))
        .await?
        .map_err(|err| ApiError::internal(err.to_string()))?
        .filter(|record| !record.draft)
        .ok_or_else(|| ApiError::not_found(PipelineError::UnknownVideo(id).to_string()))?;
    Ok(json_response(record))
}

/// Renders `videos/<file>.html` from the current store instead of the
/// published copy.
async fn video_page(
    State(state): State<AppState>,
    AxumPath(file): AxumPath<String>,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&file)?;
    if !file.ends_with(".html") {
        return Err(ApiError::not_found("video not found"));
    }
    // Rendering reconciles against the shared cache, so it is a cycle too.
    let _cycle = state.regen_lock.lock().await;
    let site = state.site.clone();
    let page = blocking(move || {
        let (context, _) = site.prepare()?;
        Ok(context.detail_page(&file))
    })
    .await?
    .map_err(|err| ApiError::internal(err.to_string()))?
    .ok_or_else(|| ApiError::not_found("video not found"))?;

    let mut response = page.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(DETAIL_CACHE_CONTROL),
    );
    Ok(response)
}

async fn build_hook(State(state): State<AppState>) -> ApiResult<Response> {
    let Ok(_guard) = state.regen_lock.try_lock() else {
        return Err(ApiError::conflict(PipelineError::Busy.to_string()));
    };
    let site = state.site.clone();
    let outcome = blocking(move || site.regenerate(&RegenerateOptions::default()))
        .await?
        .map_err(|err| {
            error!(error = %format!("{err:#}"), "build hook failed");
            ApiError::internal("Build failed").with_details(format!("{err:#}"))
        })?;

    info!(
        written = outcome.publish.written.len(),
        unchanged = outcome.publish.unchanged.len(),
        "build hook regenerated site"
    );
    Ok(json_response(BuildHookResponse {
        message: "Build triggered successfully".into(),
        timestamp: Utc::now().to_rfc3339(),
        written: outcome.publish.written.len(),
        unchanged: outcome.publish.unchanged.len(),
        removed: outcome.publish.removed.len(),
        missing_embeds: outcome.missing_embeds,
    }))
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.site_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(target.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
