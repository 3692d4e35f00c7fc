// Query/control API: line-delimited JSON over the graph directory's
// Unix socket. Stateless; a thin dispatcher over the query engine, the
// clusterer's latest output, and the daemon's control channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::cluster::SuperGraph;
use crate::error::{ApiError, StoreError};
use crate::metrics::{DaemonMetrics, ExtractorAvailability, MetricsSnapshot};
use crate::query;
use crate::store::GraphStore;
use crate::types::{EdgeKind, StoreStats};

use atlas_extract::ExtractorRegistry;

fn default_depth() -> u32 {
    2
}

fn default_limit() -> usize {
    10
}

/// One request line. The verb tag selects the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Request {
    FindRelated {
        file: String,
        #[serde(default = "default_depth")]
        max_depth: u32,
        #[serde(default)]
        types: Option<Vec<EdgeKind>>,
        #[serde(default)]
        include_reverse: bool,
    },
    SearchSymbols {
        keywords: Vec<String>,
    },
    HotPaths {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    DetectCycles,
    Overview,
    Status,
    Refresh,
    Stop,
}

/// One response line: a result or a tagged error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(serde_json::Value),
    Err { kind: String, message: String },
}

impl Response {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::internal(&e.to_string()),
        }
    }

    fn bad_input(message: &str) -> Self {
        Self::Err {
            kind: "query_bad_input".to_string(),
            message: message.to_string(),
        }
    }

    fn internal(message: &str) -> Self {
        Self::Err {
            kind: "store_unavailable".to_string(),
            message: message.to_string(),
        }
    }
}

impl From<StoreError> for Response {
    fn from(e: StoreError) -> Self {
        Self::internal(&e.to_string())
    }
}

/// Control verbs forwarded from the API to the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Refresh,
    Stop,
}

/// Daemon status block returned by the `status` verb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub stats: StoreStats,
    pub metrics: MetricsSnapshot,
    pub clusters: Option<usize>,
}

/// Everything the dispatcher needs, shared across connections.
#[derive(Debug)]
pub struct ApiContext {
    pub store: Arc<GraphStore>,
    pub supergraph: Arc<RwLock<Option<SuperGraph>>>,
    pub metrics: Arc<DaemonMetrics>,
    pub registry: Arc<ExtractorRegistry>,
    pub control: mpsc::Sender<ControlVerb>,
}

impl ApiContext {
    async fn status(&self) -> Result<StatusReport, StoreError> {
        let stats = self.store.stats()?;
        let extractors = self
            .registry
            .availability()
            .into_iter()
            .map(|(language, extractor)| ExtractorAvailability {
                language,
                extractor: extractor.to_string(),
            })
            .collect();
        let metrics = self
            .metrics
            .snapshot(stats.files_by_language.clone(), extractors, 0);
        let clusters = self
            .supergraph
            .read()
            .await
            .as_ref()
            .map(|g| g.metadata.total_clusters);
        Ok(StatusReport {
            stats,
            metrics,
            clusters,
        })
    }
}

/// Parse one request line.
pub fn parse_request(line: &str) -> Result<Request, ApiError> {
    serde_json::from_str(line).map_err(|e| ApiError::BadInput(e.to_string()))
}

/// Execute one request. Never panics through to the caller; every
/// outcome is a `Response`.
pub async fn dispatch(ctx: &ApiContext, request: Request) -> Response {
    match request {
        Request::FindRelated {
            file,
            max_depth,
            types,
            include_reverse,
        } => {
            match query::find_related(
                &ctx.store,
                &file,
                max_depth,
                types.as_deref(),
                include_reverse,
            ) {
                Ok(related) => Response::ok(&related),
                Err(e) => e.into(),
            }
        }
        Request::SearchSymbols { keywords } => {
            match query::search_symbols(&ctx.store, &keywords) {
                Ok(hits) => Response::ok(&hits),
                Err(e) => e.into(),
            }
        }
        Request::HotPaths { limit } => match query::hot_paths(&ctx.store, limit) {
            Ok(paths) => Response::ok(&paths),
            Err(e) => e.into(),
        },
        Request::DetectCycles => match query::detect_cycles(&ctx.store) {
            Ok(cycles) => Response::ok(&cycles),
            Err(e) => e.into(),
        },
        Request::Overview => match query::architecture_overview(&ctx.store) {
            Ok(overview) => Response::ok(&overview),
            Err(e) => e.into(),
        },
        Request::Status => match ctx.status().await {
            Ok(report) => Response::ok(&report),
            Err(e) => e.into(),
        },
        Request::Refresh => {
            if ctx.control.send(ControlVerb::Refresh).await.is_err() {
                return Response::internal("daemon control channel closed");
            }
            Response::ok(&"refresh queued")
        }
        Request::Stop => {
            if ctx.control.send(ControlVerb::Stop).await.is_err() {
                return Response::internal("daemon control channel closed");
            }
            Response::ok(&"stopping")
        }
    }
}

/// Accept loop for the control socket.
pub async fn serve(listener: UnixListener, ctx: Arc<ApiContext>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_connection(stream, &ctx).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "Control socket accept failed");
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ApiContext) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = match parse_request(&line) {
            Ok(request) => {
                debug!(?request, "API request");
                dispatch(ctx, request).await
            }
            Err(e) => Response::bad_input(&e.to_string()),
        };
        let Ok(mut payload) = serde_json::to_vec(&response) else {
            break;
        };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_extract::{DepTarget, Dependency, ExtractionRecord, Language};

    fn context() -> (ApiContext, mpsc::Receiver<ControlVerb>) {
        let store = GraphStore::new();
        store
            .apply_delta(&ExtractionRecord {
                path: "b.js".into(),
                language: Language::JavaScript,
                dependencies: vec![],
                symbols: vec![],
            })
            .unwrap();
        store
            .apply_delta(&ExtractionRecord {
                path: "a.js".into(),
                language: Language::JavaScript,
                dependencies: vec![Dependency {
                    kind: EdgeKind::Import,
                    target: DepTarget::Relative("./b.js".into()),
                    line: 1,
                }],
                symbols: vec![],
            })
            .unwrap();

        let (control, control_rx) = mpsc::channel(4);
        (
            ApiContext {
                store: Arc::new(store),
                supergraph: Arc::new(RwLock::new(None)),
                metrics: Arc::new(DaemonMetrics::new()),
                registry: Arc::new(ExtractorRegistry::new()),
                control,
            },
            control_rx,
        )
    }

    #[tokio::test]
    async fn find_related_verb() {
        let (ctx, _rx) = context();
        let request =
            parse_request(r#"{"verb":"find_related","file":"a.js","max_depth":1}"#).unwrap();
        let response = dispatch(&ctx, request).await;

        let Response::Ok(value) = response else {
            panic!("expected ok response");
        };
        assert_eq!(value[0]["path"], "b.js");
        assert_eq!(value[0]["relation"], "import");
    }

    #[tokio::test]
    async fn unknown_file_is_empty_ok() {
        let (ctx, _rx) = context();
        let request = parse_request(r#"{"verb":"find_related","file":"nope.js"}"#).unwrap();
        let Response::Ok(value) = dispatch(&ctx, request).await else {
            panic!("expected ok response");
        };
        assert_eq!(value.as_array().unwrap().len(), 0);
    }

    #[test]
    fn malformed_request_is_bad_input() {
        assert!(parse_request("{nope").is_err());
        assert!(parse_request(r#"{"verb":"launch_missiles"}"#).is_err());
    }

    #[tokio::test]
    async fn stop_verb_reaches_control_channel() {
        let (ctx, mut rx) = context();
        let request = parse_request(r#"{"verb":"stop"}"#).unwrap();
        dispatch(&ctx, request).await;
        assert_eq!(rx.recv().await, Some(ControlVerb::Stop));
    }

    #[tokio::test]
    async fn status_reports_store_shape() {
        let (ctx, _rx) = context();
        let Response::Ok(value) = dispatch(&ctx, Request::Status).await else {
            panic!("expected ok response");
        };
        assert_eq!(value["stats"]["files"], 2);
        assert_eq!(value["clusters"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("control.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let (ctx, _rx) = context();
        let ctx = Arc::new(ctx);
        tokio::spawn(serve(listener, ctx));

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"verb\":\"overview\"}\nnot json\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let parsed: Response = serde_json::from_str(&first).unwrap();
        assert!(matches!(parsed, Response::Ok(_)));

        let second = lines.next_line().await.unwrap().unwrap();
        let parsed: Response = serde_json::from_str(&second).unwrap();
        match parsed {
            Response::Err { kind, .. } => assert_eq!(kind, "query_bad_input"),
            Response::Ok(_) => panic!("expected error for malformed line"),
        }
    }
}
