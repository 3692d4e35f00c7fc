// Line-delimited JSON client for the daemon's control socket.

use std::path::Path;

use anyhow::Context;
use atlas_core::api::{Request, Response};
use atlas_core::graphdir::GraphDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Whether a daemon appears to be serving this graph directory.
pub fn daemon_available(graph_dir: &GraphDir) -> bool {
    graph_dir.socket_path().exists()
        && atlas_core::daemon::lock::LockFile::holder_alive(graph_dir).unwrap_or(false)
}

/// Send one request and read one response.
pub async fn call(graph_dir: &GraphDir, request: &Request) -> anyhow::Result<Response> {
    let socket_path = graph_dir.socket_path();
    let stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("Cannot connect to daemon at {}", socket_path.display()))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    write_half.write_all(&payload).await?;
    write_half.shutdown().await?;

    let mut lines = BufReader::new(read_half).lines();
    let line = lines
        .next_line()
        .await?
        .context("Daemon closed the connection without a response")?;
    Ok(serde_json::from_str(&line)?)
}

/// Unwrap a response into its JSON value or a readable error.
pub fn into_value(response: Response) -> anyhow::Result<serde_json::Value> {
    match response {
        Response::Ok(value) => Ok(value),
        Response::Err { kind, message } => {
            anyhow::bail!("daemon error ({kind}): {message}")
        }
    }
}

/// Resolve the repo root argument to its graph directory.
pub fn open_graph_dir(path: &Path) -> anyhow::Result<GraphDir> {
    let root = std::fs::canonicalize(path)
        .with_context(|| format!("Cannot resolve path: {}", path.display()))?;
    Ok(GraphDir::open(&root)?)
}
