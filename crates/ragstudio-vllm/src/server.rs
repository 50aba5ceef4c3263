//! `vllm serve` child processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use ragstudio_core::runtime::Precision;

use crate::error::VllmError;

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(900);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How servers are launched and watched.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub binary: PathBuf,
    pub host: String,
    /// Startup includes downloading weights, so this is generous.
    pub ready_timeout: Duration,
    pub stop_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("vllm"),
            host: "127.0.0.1".to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a server is started for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServeTask {
    Generate {
        precision: Precision,
        max_model_len: u32,
        tensor_parallel: u32,
        gpu_memory_utilization: f64,
    },
    Embed,
}

#[derive(Debug, Clone, Copy)]
pub struct ServeRequest<'a> {
    pub model: &'a str,
    pub port: u16,
    pub download_dir: &'a Path,
    pub task: ServeTask,
}

/// Command line for `vllm serve`, without the binary.
pub fn serve_args(host: &str, request: &ServeRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "serve".to_string(),
        request.model.to_string(),
        "--host".to_string(),
        host.to_string(),
        "--port".to_string(),
        request.port.to_string(),
        "--download-dir".to_string(),
        request.download_dir.display().to_string(),
    ];
    match request.task {
        ServeTask::Generate {
            precision,
            max_model_len,
            tensor_parallel,
            gpu_memory_utilization,
        } => args.extend([
            "--dtype".to_string(),
            precision.to_string(),
            "--max-model-len".to_string(),
            max_model_len.to_string(),
            "--tensor-parallel-size".to_string(),
            tensor_parallel.to_string(),
            "--gpu-memory-utilization".to_string(),
            format!("{gpu_memory_utilization:.2}"),
        ]),
        ServeTask::Embed => args.extend(["--task".to_string(), "embed".to_string()]),
    }
    args
}

pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Ask the OS for a port nobody is listening on.
pub fn free_port() -> Result<u16, VllmError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Base URLs of servers whose handles were dropped but which may still be
/// shutting down.
#[derive(Debug, Clone, Default)]
pub struct ReleasedServers(Arc<Mutex<Vec<String>>>);

impl ReleasedServers {
    fn push(&self, base_url: String) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(base_url);
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A running server. Dropping it kills the process and records its URL in
/// [`ReleasedServers`] so the builder can wait for the memory to come back.
pub struct ServerProcess {
    child: Child,
    model: String,
    base_url: String,
    released: ReleasedServers,
}

impl ServerProcess {
    pub fn spawn(
        options: &ServeOptions,
        request: &ServeRequest<'_>,
        released: ReleasedServers,
    ) -> Result<Self, VllmError> {
        let args = serve_args(&options.host, request);
        info!(binary = %options.binary.display(), args = ?args, "launching vllm server");
        let child = Command::new(&options.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VllmError::Launch {
                binary: options.binary.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            child,
            model: request.model.to_string(),
            base_url: base_url(&options.host, request.port),
            released,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Poll `/health` until the server answers, the process exits, or the
    /// ready timeout passes.
    pub async fn wait_ready(
        &mut self,
        http: &reqwest::Client,
        options: &ServeOptions,
    ) -> Result<(), VllmError> {
        let started = Instant::now();
        let health = format!("{}/health", self.base_url);
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(VllmError::Exited {
                    model: self.model.clone(),
                    status: status.to_string(),
                });
            }
            match http.get(&health).timeout(options.poll_interval).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        model = %self.model,
                        base_url = %self.base_url,
                        waited_secs = started.elapsed().as_secs(),
                        "vllm server ready"
                    );
                    return Ok(());
                }
                Ok(response) => debug!(status = %response.status(), "vllm server not ready"),
                Err(e) => debug!(error = %e, "vllm server not reachable yet"),
            }
            if started.elapsed() >= options.ready_timeout {
                return Err(VllmError::NotReady {
                    model: self.model.clone(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(options.poll_interval).await;
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(model = %self.model, error = %e, "failed to signal vllm server");
        }
        self.released.push(self.base_url.clone());
    }
}

/// Wait until nothing accepts connections at `base_url` any more.
pub async fn wait_stopped(
    http: &reqwest::Client,
    base_url: &str,
    options: &ServeOptions,
) -> Result<(), VllmError> {
    let started = Instant::now();
    let health = format!("{base_url}/health");
    loop {
        match http.get(&health).timeout(options.poll_interval).send().await {
            Err(e) if e.is_connect() => {
                debug!(base_url, "vllm server stopped");
                return Ok(());
            }
            _ if started.elapsed() >= options.stop_timeout => {
                return Err(VllmError::StillRunning {
                    base_url: base_url.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            _ => tokio::time::sleep(options.poll_interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_args_carry_the_negotiated_config() {
        let args = serve_args("127.0.0.1", &ServeRequest {
            model: "mistralai/Mistral-7B-Instruct-v0.1",
            port: 8000,
            download_dir: Path::new("/models/generation-models"),
            task: ServeTask::Generate {
                precision: Precision::Float16,
                max_model_len: 12288,
                tensor_parallel: 2,
                gpu_memory_utilization: 0.9,
            },
        });
        assert_eq!(args.join(" "), "serve mistralai/Mistral-7B-Instruct-v0.1 \
            --host 127.0.0.1 --port 8000 --download-dir /models/generation-models \
            --dtype float16 --max-model-len 12288 --tensor-parallel-size 2 \
            --gpu-memory-utilization 0.90");
    }

    #[test]
    fn embedding_args() {
        let args = serve_args("0.0.0.0", &ServeRequest {
            model: "BAAI/bge-large-en-v1.5",
            port: 8001,
            download_dir: Path::new("/models/.hf-cache"),
            task: ServeTask::Embed,
        });
        assert_eq!(&args[..2], ["serve", "BAAI/bge-large-en-v1.5"]);
        assert!(args.ends_with(&["--task".to_string(), "embed".to_string()]));
        assert!(!args.contains(&"--max-model-len".to_string()));
    }

    #[test]
    fn released_servers_drain_once() {
        let released = ReleasedServers::default();
        released.push("http://127.0.0.1:8000".to_string());
        assert_eq!(released.drain(), vec!["http://127.0.0.1:8000"]);
        assert!(released.drain().is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = ServeOptions {
            binary: dir.path().join("no-such-vllm"),
            ..ServeOptions::default()
        };
        let request = ServeRequest {
            model: "m",
            port: 1,
            download_dir: dir.path(),
            task: ServeTask::Embed,
        };
        let err = ServerProcess::spawn(&options, &request, ReleasedServers::default())
            .err()
            .unwrap();
        assert!(matches!(err, VllmError::Launch { .. }));
    }

    #[tokio::test]
    async fn closed_port_counts_as_stopped() {
        let port = free_port().unwrap();
        let options = ServeOptions {
            stop_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            ..ServeOptions::default()
        };
        wait_stopped(&reqwest::Client::new(), &base_url("127.0.0.1", port), &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listening_port_is_still_running() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let options = ServeOptions {
            stop_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(50),
            ..ServeOptions::default()
        };
        let err = wait_stopped(&reqwest::Client::new(), &base_url("127.0.0.1", port), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, VllmError::StillRunning { .. }));
    }
}
