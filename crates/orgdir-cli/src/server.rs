//! Orgdir HTTP server (read-only).
//!
//! Keeps one directory loaded through [`DirectoryStorage`] and answers the
//! lookup endpoints under `/api/v1`. Every `/api/v1` request must carry the
//! configured key in `X-API-Key`; `/healthz` is open.
//!
//! Each request opens its own session, so a request never observes a
//! half-applied reload and a closed directory surfaces as `503`.
//!
//! Admin endpoints (same key):
//! - `GET /api/v1/status`: directory path, load time and row counts
//! - `POST /api/v1/reload`: re-read the directory file for new requests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use orgdir_core::{DirectoryError, OrganizationQueryEngine, Page, QueryConfig};
use orgdir_storage::{DirectoryStorage, StorageConfig};

pub(crate) const API_PREFIX: &str = "/api/v1";
pub(crate) const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
struct ServerConfig {
    listen: SocketAddr,
    storage: StorageConfig,
    api_key: String,
    ready_file: Option<PathBuf>,
    query: QueryConfig,
}

pub(crate) struct ServerState {
    pub(crate) storage: DirectoryStorage,
    pub(crate) api_key: String,
    pub(crate) query: QueryConfig,
}

pub(crate) fn cmd_serve(args: crate::ServeArgs) -> Result<()> {
    if args.api_key.trim().is_empty() {
        return Err(anyhow!("serve: `--api-key` (or ORGDIR_API_KEY) must not be empty"));
    }

    let config = ServerConfig {
        listen: args.listen,
        storage: StorageConfig { db_path: args.db },
        api_key: args.api_key,
        ready_file: args.ready_file,
        query: args.depth.into(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(config).await })
}

async fn serve_async(config: ServerConfig) -> Result<()> {
    let storage = tokio::task::spawn_blocking({
        let storage = config.storage.clone();
        move || DirectoryStorage::open(storage)
    })
    .await
    .map_err(|e| anyhow!("serve: failed to join loader task: {e}"))??;

    let state = Arc::new(ServerState {
        storage,
        api_key: config.api_key.clone(),
        query: config.query,
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    info!(addr = %bound, "listening on http://{bound}{API_PREFIX}");
    if let Some(path) = config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "version": "orgdir_server_ready_v1",
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, serde_json::to_string_pretty(&payload)?) {
            warn!(path = %path.display(), error = %e, "failed to write ready file");
        }
    }

    loop {
        let (stream, _peer) = tokio::select! {
            accepted = listener.accept() => {
                accepted.map_err(|e| anyhow!("serve: accept failed: {e}"))?
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                state.storage.close();
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // `route` reads the directory file on reload, so it runs off the async workers.
    let reply = tokio::task::spawn_blocking(move || {
        route(&state, &method, &path, query.as_deref(), api_key.as_deref())
    })
    .await
    .unwrap_or_else(|e| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("request task failed: {e}"),
        )
    });
    Ok(reply.into_response())
}

// ============================================================================
// Routing
// ============================================================================

/// A response that has not been handed to hyper yet.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) status: StatusCode,
    content_type: &'static str,
    pub(crate) body: Vec<u8>,
}

impl Reply {
    fn into_response(self) -> Response<Full<Bytes>> {
        Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, self.content_type)
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
    }
}

fn text_response(status: StatusCode, body: &str) -> Reply {
    Reply {
        status,
        content_type: "text/plain; charset=utf-8",
        body: body.as_bytes().to_vec(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Reply {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"detail\":\"serialize\"}".to_vec());
    Reply {
        status,
        content_type: "application/json",
        body,
    }
}

fn json_error(status: StatusCode, msg: &str) -> Reply {
    json_response(status, &serde_json::json!({ "detail": msg }))
}

fn error_response(err: &DirectoryError) -> Reply {
    let status = match err {
        DirectoryError::NotFound { .. } => StatusCode::NOT_FOUND,
        DirectoryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        DirectoryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        error!(error = %err, "request failed");
    } else {
        debug!(error = %err, "request rejected");
    }
    json_error(status, &err.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Status,
    Reload,
    Lookup(Lookup),
}

/// Read-only directory lookups. Ids are percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Buildings,
    Building(String),
    BuildingOrganizations(String),
    Organizations,
    OrganizationsNearby,
    OrganizationsByActivity(String),
    OrganizationsByActivityName,
    OrganizationSearch,
    Organization(String),
    ActivityTree(String),
}

impl Endpoint {
    /// Match the path below `/api/v1`.
    ///
    /// Segments are percent-decoded before matching. A segment that does not
    /// decode to UTF-8 matches nothing.
    fn parse(path: &str) -> Option<Self> {
        let decoded = path
            .trim_matches('/')
            .split('/')
            .map(|segment| percent_decode_str(segment).decode_utf8().ok())
            .collect::<Option<Vec<_>>>()?;
        let segments: Vec<&str> = decoded.iter().map(AsRef::as_ref).collect();

        let endpoint = match segments.as_slice() {
            ["status"] => Self::Status,
            ["reload"] => Self::Reload,
            ["buildings"] => Self::Lookup(Lookup::Buildings),
            ["buildings", id] => Self::Lookup(Lookup::Building(path_id(id)?)),
            ["buildings", id, "organizations"] => {
                Self::Lookup(Lookup::BuildingOrganizations(path_id(id)?))
            }
            ["organizations"] => Self::Lookup(Lookup::Organizations),
            ["organizations", "nearby"] => Self::Lookup(Lookup::OrganizationsNearby),
            ["organizations", "by_activity"] => Self::Lookup(Lookup::OrganizationsByActivityName),
            ["organizations", "search"] => Self::Lookup(Lookup::OrganizationSearch),
            ["organizations", "by-activity", id] => {
                Self::Lookup(Lookup::OrganizationsByActivity(path_id(id)?))
            }
            ["organizations", id] => Self::Lookup(Lookup::Organization(path_id(id)?)),
            ["activities", id, "tree"] => Self::Lookup(Lookup::ActivityTree(path_id(id)?)),
            _ => return None,
        };
        Some(endpoint)
    }

    fn method(&self) -> Method {
        match self {
            Self::Reload => Method::POST,
            Self::Status | Self::Lookup(_) => Method::GET,
        }
    }
}

fn path_id(segment: &str) -> Option<String> {
    (!segment.is_empty()).then(|| segment.to_string())
}

/// Route one request. Pure apart from logging and reload, so it is tested
/// without a socket.
pub(crate) fn route(
    state: &ServerState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    api_key: Option<&str>,
) -> Reply {
    if path == "/healthz" {
        return if *method == Method::GET {
            text_response(StatusCode::OK, "ok\n")
        } else {
            json_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        };
    }

    let Some(endpoint) = path
        .strip_prefix(API_PREFIX)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .and_then(Endpoint::parse)
    else {
        return json_error(StatusCode::NOT_FOUND, "Not Found");
    };
    if *method != endpoint.method() {
        return json_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }
    if let Err(reply) = require_api_key(api_key, state) {
        warn!(path, "rejected request without a valid API key");
        return reply;
    }

    debug!(path, ?endpoint, "request");
    match endpoint {
        Endpoint::Status => json_response(StatusCode::OK, &status_payload(&state.storage)),
        Endpoint::Reload => reload(&state.storage),
        Endpoint::Lookup(lookup) => {
            let params = parse_query_params(query);
            match execute(state, &lookup, &params) {
                Ok(reply) => reply,
                Err(err) => error_response(&err),
            }
        }
    }
}

fn require_api_key(api_key: Option<&str>, state: &ServerState) -> Result<(), Reply> {
    match api_key {
        None => Err(json_error(StatusCode::FORBIDDEN, "Not authenticated")),
        Some(key) if key != state.api_key => Err(json_error(StatusCode::FORBIDDEN, "Invalid API Key")),
        Some(_) => Ok(()),
    }
}

fn execute(
    state: &ServerState,
    lookup: &Lookup,
    params: &HashMap<String, String>,
) -> orgdir_core::Result<Reply> {
    let session = state.storage.session()?;
    let engine = OrganizationQueryEngine::with_config(&*session, state.query);

    match lookup {
        Lookup::Buildings => ok(&engine.list_buildings(page_param(params)?)?),
        Lookup::Building(id) => ok(&engine.building_by_id(id)?),
        Lookup::BuildingOrganizations(id) => ok(&engine.organizations_by_building(id)?),
        Lookup::Organizations => ok(&engine.list_organizations(page_param(params)?)?),
        Lookup::OrganizationsNearby => {
            let lat = required_f64(params, "lat")?;
            let lon = required_f64(params, "lon")?;
            let radius = required_f64(params, "radius")?;
            ok(&engine.organizations_in_radius(lat, lon, radius)?)
        }
        Lookup::OrganizationsByActivity(id) => ok(&engine.organizations_by_activity(id)?),
        Lookup::OrganizationsByActivityName => match non_empty(params, "activity_name") {
            Some(name) => ok(&engine.organizations_by_activity_name(name)?),
            None => ok(&Vec::<()>::new()),
        },
        Lookup::OrganizationSearch => match non_empty(params, "name") {
            Some(name) => ok(&engine.search_organizations_by_name(name)?),
            None => ok(&Vec::<()>::new()),
        },
        Lookup::Organization(id) => ok(&engine.organization_by_id(id)?),
        Lookup::ActivityTree(id) => ok(&engine.activity_tree(id, depth_param(params)?)?),
    }
}

fn ok<T: Serialize>(value: &T) -> orgdir_core::Result<Reply> {
    Ok(json_response(StatusCode::OK, value))
}

// ============================================================================
// Admin
// ============================================================================

fn status_payload(storage: &DirectoryStorage) -> serde_json::Value {
    serde_json::json!({
        "db_path": storage.config().db_path.display().to_string(),
        "open": storage.is_open(),
        "loaded_at": storage.loaded_at().map(|t| t.to_rfc3339()),
        "stats": storage.stats(),
    })
}

/// On failure the previously loaded directory keeps serving.
fn reload(storage: &DirectoryStorage) -> Reply {
    match storage.reload() {
        Ok(_) => json_response(StatusCode::OK, &status_payload(storage)),
        Err(e) => {
            error!(error = %e, "reload failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("reload failed: {e:#}"),
            )
        }
    }
}

// ============================================================================
// Query parameters
// ============================================================================

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(q) = query else {
        return out;
    };
    for (k, v) in form_urlencoded::parse(q.as_bytes()) {
        out.insert(k.into_owned(), v.into_owned());
    }
    out
}

fn non_empty<'p>(params: &'p HashMap<String, String>, name: &str) -> Option<&'p str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn required_f64(params: &HashMap<String, String>, name: &str) -> orgdir_core::Result<f64> {
    let raw = params.get(name).ok_or_else(|| {
        DirectoryError::InvalidArgument(format!("missing query parameter `{name}`"))
    })?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DirectoryError::InvalidArgument(format!("`{name}` must be a number, got `{raw}`")))
}

fn optional_usize(
    params: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> orgdir_core::Result<usize> {
    match params.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            DirectoryError::InvalidArgument(format!(
                "`{name}` must be a non-negative integer, got `{raw}`"
            ))
        }),
    }
}

fn page_param(params: &HashMap<String, String>) -> orgdir_core::Result<Page> {
    Ok(Page::new(
        optional_usize(params, "skip", 0)?,
        optional_usize(params, "limit", Page::DEFAULT_LIMIT)?,
    ))
}

/// `depth` below zero is clamped to zero.
fn depth_param(params: &HashMap<String, String>) -> orgdir_core::Result<Option<u32>> {
    let Some(raw) = params.get("depth") else {
        return Ok(None);
    };
    let depth = raw.trim().parse::<i64>().map_err(|_| {
        DirectoryError::InvalidArgument(format!("`depth` must be an integer, got `{raw}`"))
    })?;
    Ok(Some(u32::try_from(depth.max(0)).unwrap_or(u32::MAX)))
}
