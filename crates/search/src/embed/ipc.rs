//! Embedding server over line-delimited JSON IPC
//!
//! The server is a child process reading one JSON request per line on
//! stdin and writing one JSON response per line on stdout:
//!
//! ```text
//! → {"id":"…","action":"embed","texts":["…"],"model":"all-MiniLM-L6-v2"}
//! ← {"id":"…","success":true,"embeddings":[[0.1, …]],"error":null}
//! ```
//!
//! Actions are `embed`, `ping` and `shutdown`. Requests are serialized
//! through one async mutex. Each write-then-read exchange runs on its own
//! task, so a caller that gives up (an orchestrator timeout dropping the
//! future) cannot leave a reply unread on the pipe. Reply lines carrying
//! another request's id are discarded.

use super::Embedder;
use crate::error::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Grace period for the server to exit after `shutdown`
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One request line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcRequest {
    /// Request id echoed by the server
    pub id: String,
    /// `embed`, `ping` or `shutdown`
    pub action: String,
    /// Texts to embed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl IpcRequest {
    fn new(action: &str) -> Self {
        IpcRequest {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            texts: Vec::new(),
            model: None,
        }
    }
}

/// One response line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    /// Echoed request id (absent when the request line was not valid JSON)
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the action succeeded
    pub success: bool,
    /// Embeddings for `embed`
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
    /// Failure message
    #[serde(default)]
    pub error: Option<String>,
}

struct Channel {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Embedder backed by an external embedding server process
pub struct IpcEmbedder {
    model: String,
    dimension: usize,
    channel: Arc<Mutex<Option<Channel>>>,
}

impl IpcEmbedder {
    /// Spawn the server. `command[0]` is the program, the rest its arguments.
    pub fn spawn(
        command: &[String],
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbedError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EmbedError::Spawn("empty command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EmbedError::Spawn(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EmbedError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EmbedError::Spawn("stdout not captured".to_string()))?;

        debug!(target: "ragline::embed", program = %program, "Spawned embedding server");

        Ok(IpcEmbedder {
            model: model.into(),
            dimension,
            channel: Arc::new(Mutex::new(Some(Channel {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }))),
        })
    }

    async fn roundtrip(&self, request: IpcRequest) -> Result<IpcResponse, EmbedError> {
        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move { exchange(&channel, &request).await })
            .await
            .map_err(|e| EmbedError::Protocol(format!("exchange task failed: {}", e)))?
    }

    /// Check that the server is alive
    pub async fn ping(&self) -> Result<(), EmbedError> {
        let response = self.roundtrip(IpcRequest::new("ping")).await?;
        if !response.success {
            return Err(EmbedError::Server(response.error.unwrap_or_default()));
        }
        Ok(())
    }
}

/// Write one request and read lines until its reply arrives
async fn exchange(
    channel: &Mutex<Option<Channel>>,
    request: &IpcRequest,
) -> Result<IpcResponse, EmbedError> {
    let mut guard = channel.lock().await;
    let chan = guard.as_mut().ok_or(EmbedError::Closed)?;

    let mut line = serde_json::to_string(request)
        .map_err(|e| EmbedError::Protocol(format!("encode request: {}", e)))?;
    line.push('\n');
    if let Err(e) = write_line(&mut chan.stdin, &line).await {
        *guard = None;
        return Err(e);
    }

    loop {
        let reply = match chan.stdout.next_line().await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                *guard = None;
                return Err(EmbedError::Closed);
            }
            Err(e) => {
                *guard = None;
                return Err(EmbedError::Io(e));
            }
        };

        let response: IpcResponse = serde_json::from_str(&reply)
            .map_err(|e| EmbedError::Protocol(format!("decode response: {}", e)))?;
        match response.id.as_deref() {
            Some(id) if id != request.id => {
                warn!(
                    target: "ragline::embed",
                    stale = %id,
                    expected = %request.id,
                    "Discarding reply to an earlier request"
                );
            }
            _ => return Ok(response),
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), EmbedError> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

#[async_trait]
impl Embedder for IpcEmbedder {
    fn name(&self) -> &str {
        "ipc"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        // The server rejects empty batches
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = IpcRequest::new("embed");
        request.texts = texts.to_vec();
        request.model = Some(self.model.clone());

        let response = self.roundtrip(request).await?;
        if !response.success {
            return Err(EmbedError::Server(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let embeddings = response
            .embeddings
            .ok_or_else(|| EmbedError::Protocol("missing embeddings".to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(EmbedError::Protocol(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }

    async fn close(&self) -> Result<(), EmbedError> {
        let Some(mut channel) = self.channel.lock().await.take() else {
            return Ok(());
        };

        let request = IpcRequest::new("shutdown");
        if let Ok(mut line) = serde_json::to_string(&request) {
            line.push('\n');
            if let Err(e) = write_line(&mut channel.stdin, &line).await {
                debug!(target: "ragline::embed", error = %e, "Shutdown request not delivered");
            }
        }
        drop(channel.stdin);

        match tokio::time::timeout(SHUTDOWN_GRACE, channel.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(target: "ragline::embed", %status, "Embedding server exited");
            }
            Ok(Err(e)) => return Err(EmbedError::Io(e)),
            Err(_) => {
                warn!(target: "ragline::embed", "Embedding server ignored shutdown, killing");
                channel.child.kill().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let mut request = IpcRequest::new("embed");
        request.id = "r1".to_string();
        request.texts = vec!["hello".to_string()];
        request.model = Some("all-MiniLM-L6-v2".to_string());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "r1",
                "action": "embed",
                "texts": ["hello"],
                "model": "all-MiniLM-L6-v2"
            })
        );
    }

    #[test]
    fn test_ping_omits_texts() {
        let json = serde_json::to_string(&IpcRequest::new("ping")).unwrap();
        assert!(!json.contains("texts"));
        assert!(!json.contains("model"));
    }

    #[test]
    fn test_response_tolerates_extra_fields() {
        let line = r#"{"id":"r1","success":true,"pong":true,"error":null}"#;
        let response: IpcResponse = serde_json::from_str(line).unwrap();
        assert!(response.success);
        assert!(response.embeddings.is_none());
    }

    #[test]
    fn test_response_without_id() {
        let line = r#"{"success":false,"error":"Invalid JSON: x"}"#;
        let response: IpcResponse = serde_json::from_str(line).unwrap();
        assert!(response.id.is_none());
        assert_eq!(response.error.as_deref(), Some("Invalid JSON: x"));
    }

    #[tokio::test]
    async fn test_spawn_empty_command() {
        let err = IpcEmbedder::spawn(&[], "m", 4).err().unwrap();
        assert!(matches!(err, EmbedError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let cmd = vec!["/nonexistent/ragline-embedder".to_string()];
        let err = IpcEmbedder::spawn(&cmd, "m", 4).err().unwrap();
        assert!(matches!(err, EmbedError::Spawn(_)));
    }

    /// Fake server: echoes the request id with a fixed 2-d embedding
    #[cfg(unix)]
    fn fake_server() -> Vec<String> {
        let script = r#"sed -u 's/^{"id":"\([^"]*\)".*$/{"id":"\1","success":true,"embeddings":[[1.0,0.0]],"error":null}/'"#;
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_roundtrip_with_fake_server() {
        let embedder = IpcEmbedder::spawn(&fake_server(), "m", 2).unwrap();
        embedder.ping().await.unwrap();

        let out = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0]]);

        embedder.close().await.unwrap();
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Closed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_request_does_not_desync_later_calls() {
        // First request is answered after 300 ms, the rest immediately
        let reply = r#"s/^{"id":"\([^"]*\)".*$/{"id":"\1","success":true,"embeddings":[[1.0,0.0]],"error":null}/"#;
        let script = format!(
            "IFS= read -r first; sleep 0.3; printf '%s\\n' \"$first\" | sed '{r}'; exec sed -u '{r}'",
            r = reply
        );
        let cmd = vec!["sh".to_string(), "-c".to_string(), script];
        let embedder = IpcEmbedder::spawn(&cmd, "m", 2).unwrap();
        let texts = vec!["slow".to_string()];

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), embedder.embed(&texts)).await;
        assert!(abandoned.is_err(), "first call should time out");

        for _ in 0..3 {
            let out = embedder.embed(&texts).await.unwrap();
            assert_eq!(out, vec![vec![1.0, 0.0]]);
        }
        embedder.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dimension_mismatch_detected() {
        let embedder = IpcEmbedder::spawn(&fake_server(), "m", 3).unwrap();
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        embedder.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_count_mismatch_is_protocol_error() {
        let embedder = IpcEmbedder::spawn(&fake_server(), "m", 2).unwrap();
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embedder.embed(&texts).await.unwrap_err();
        assert!(matches!(err, EmbedError::Protocol(_)));
        embedder.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_batch_skips_server() {
        let cmd = vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null".to_string()];
        let embedder = IpcEmbedder::spawn(&cmd, "m", 2).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
        embedder.close().await.unwrap();
    }
}
