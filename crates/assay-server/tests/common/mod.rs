//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use assay_jobs::{
    ArtifactStore, ExecutorConfig, Interpreters, JobStore, PipelineRunner, StepExecutor,
};
use assay_server::{AppState, Server, ServerConfig};

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Temporary directory holding steps, results and the database.
    pub temp_dir: TempDir,
    /// Dropping this stops the server.
    _shutdown: oneshot::Sender<()>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server whose step interpreters are `sh`.
    pub async fn start() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        std::fs::create_dir_all(temp_dir.path().join("steps"))?;

        let addr = find_available_port().await?;

        let store = Arc::new(JobStore::open(&temp_dir.path().join("assay.db"))?);
        let executor = StepExecutor::new(
            ExecutorConfig::new(temp_dir.path().join("steps")).with_interpreters(Interpreters {
                python: "sh".to_string(),
                node: "sh".to_string(),
            }),
        );
        let runner = PipelineRunner::new(
            store,
            ArtifactStore::new(temp_dir.path().join("results"), "data.json"),
            executor,
            "report.docx",
        );

        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);
        let server = Server::from_state(AppState::new(runner, config));

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = server
                .run(async move {
                    let _ = rx.await;
                })
                .await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            temp_dir,
            _shutdown: tx,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    pub fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.delete(format!("{}{}", self.base_url(), path))
    }

    /// Write a step script.
    pub fn script(&self, name: &str, body: &str) -> Result<()> {
        std::fs::write(self.temp_dir.path().join("steps").join(name), body)?;
        Ok(())
    }

    pub fn workspace(&self, job_id: &str) -> PathBuf {
        self.temp_dir.path().join("results").join(job_id)
    }

    /// Create an analysis over HTTP and return its id.
    pub async fn create_analysis(&self, name: &str, settings: Value) -> Result<String> {
        let resp = self
            .post("/api/v1/analyses")
            .json(&serde_json::json!({"name": name, "settings": settings}))
            .send()
            .await?;
        anyhow::ensure!(resp.status().as_u16() == 201, "create failed: {}", resp.status());
        let body: Value = resp.json().await?;
        Ok(body["id"].as_str().unwrap_or_default().to_string())
    }

    /// Poll a job until it leaves `pending`.
    pub async fn wait_for_job(&self, job_id: &str) -> Result<Value> {
        timeout(Duration::from_secs(10), async {
            loop {
                let job: Value = self
                    .get(&format!("/api/v1/jobs/{job_id}"))
                    .send()
                    .await?
                    .json()
                    .await?;
                if job["status"] != "pending" {
                    return Ok::<_, anyhow::Error>(job);
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("Timeout waiting for job {job_id}"))?
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
