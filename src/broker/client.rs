//! Broker Client (C14): JSON-RPC peer for the privileged broker process.
//!
//! The broker itself is an out-of-scope external collaborator (spec.md
//! §1); this client only speaks its wire protocol and reports
//! `AgenShieldError::Permission` on any transport failure so it slots into
//! the same [`crate::privileged_fs::FirstAvailable`] cascade as
//! `DirectFs`/`SudoFs` for the four file-mutation operations it shares
//! with them, per the broker RPC table (spec.md §4.14).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::warn;

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::error::{AgenShieldError, Result};
use crate::privileged_fs::PrivilegedFs;
use crate::secrets::{SecretPusher, SyncedSecrets};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct BrokerClient {
    socket_path: PathBuf,
    next_id: AtomicU64,
}

impl BrokerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Probed once per call group; the result is never cached across
    /// reconciliations (spec.md §4.14).
    pub async fn probe_available(&self) -> bool {
        tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    async fn call(&self, method: &'static str, params: serde_json::Value) -> Result<serde_json::Value> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| broker_unavailable(method))?
            .map_err(|_| broker_unavailable(method))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await.map_err(AgenShieldError::Io)?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .await
            .map_err(AgenShieldError::Io)?;

        if response_line.trim().is_empty() {
            return Err(broker_unavailable(method));
        }

        let response: JsonRpcResponse = serde_json::from_str(&response_line)?;
        if let Some(error) = response.error {
            return Err(AgenShieldError::transient(
                format!("broker:{method}"),
                format!("[{}] {}", error.code, error.message),
            ));
        }

        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    pub async fn install_skill(
        &self,
        slug: &str,
        files: &BTreeMap<String, Vec<u8>>,
        create_wrapper: bool,
    ) -> Result<()> {
        let encoded: BTreeMap<&String, String> = files
            .iter()
            .map(|(path, bytes)| {
                use base64::Engine as _;
                (path, base64::engine::general_purpose::STANDARD.encode(bytes))
            })
            .collect();

        self.call(
            "installSkill",
            json!({ "slug": slug, "files": encoded, "opts": { "createWrapper": create_wrapper } }),
        )
        .await?;
        Ok(())
    }

    pub async fn uninstall_skill(&self, slug: &str) -> Result<()> {
        self.call("uninstallSkill", json!({ "slug": slug })).await?;
        Ok(())
    }
}

fn broker_unavailable(method: &str) -> AgenShieldError {
    AgenShieldError::permission(PathBuf::from(method), "broker unavailable")
}

#[async_trait]
impl PrivilegedFs for BrokerClient {
    async fn write_file(&self, path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.call(
            "writeFile",
            json!({ "path": path.to_string_lossy(), "bytes": encoded, "mode": mode }),
        )
        .await?;
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> Result<()> {
        self.call("mkdir", json!({ "path": path.to_string_lossy() })).await?;
        Ok(())
    }

    async fn rm(&self, path: &Path) -> Result<()> {
        self.call("rm", json!({ "path": path.to_string_lossy() })).await?;
        Ok(())
    }

    async fn copy_file(&self, src: &Path, dst: &Path, mode: u32) -> Result<()> {
        self.call(
            "copyFile",
            json!({ "src": src.to_string_lossy(), "dst": dst.to_string_lossy(), "mode": mode }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretPusher for BrokerClient {
    /// No direct path exists for secrets; if the broker can't be reached
    /// we log and no-op rather than propagate (spec.md §4.14).
    async fn push_secrets(&self, payload: &SyncedSecrets) -> Result<()> {
        let params = serde_json::to_value(payload)?;
        match self.call("pushSecrets", json!({ "payload": params })).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "broker unavailable, secrets not pushed this cycle");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// Spawn a fake broker that replies to exactly one request with a
    /// fixed JSON-RPC result, echoing the request id.
    async fn spawn_fake_broker(socket_path: PathBuf, result: serde_json::Value) {
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                let request: serde_json::Value = serde_json::from_str(&line).unwrap();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "result": result,
                });
                let mut out = serde_json::to_string(&response).unwrap();
                out.push('\n');
                let _ = write_half.write_all(out.as_bytes()).await;
            }
        });
        // Give the listener a moment to start accepting.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn write_file_round_trips_through_fake_broker() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("broker.sock");
        spawn_fake_broker(socket_path.clone(), serde_json::Value::Null).await;

        let client = BrokerClient::new(&socket_path);
        client
            .write_file(Path::new("/tmp/agent/file.txt"), b"hello", 0o644)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn probe_available_false_when_no_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("missing.sock");
        let client = BrokerClient::new(&socket_path);
        assert!(!client.probe_available().await);
    }

    #[tokio::test]
    async fn call_errors_map_to_transient() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("broker.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                let request: serde_json::Value = serde_json::from_str(&line).unwrap();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": { "code": -32000, "message": "denied" },
                });
                let mut out = serde_json::to_string(&response).unwrap();
                out.push('\n');
                let _ = write_half.write_all(out.as_bytes()).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let client = BrokerClient::new(&socket_path);
        let err = client.mkdir(Path::new("/tmp/agent")).await.unwrap_err();
        assert!(matches!(err, AgenShieldError::Transient { .. }));
    }
}
