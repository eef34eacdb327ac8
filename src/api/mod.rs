//! Client for the testing backend.
//!
//! The runner only talks to [`TestingApi`]; [`HttpTestingApi`] is the REST
//! implementation used by the CLI.

pub mod types;

pub use types::*;

use crate::config::Config;
use crate::error::{Result, WizardError};
use crate::results::ChainRun;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait TestingApi: Send + Sync {
    async fn list_endpoints(&self, service_id: &str) -> Result<Vec<Endpoint>>;

    async fn generate_tests(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    async fn trigger_run(&self, request: &RunRequest) -> Result<RunHandle>;

    async fn fetch_run(&self, run_id: &str) -> Result<ChainRun>;
}

/// REST implementation of [`TestingApi`]
pub struct HttpTestingApi {
    client: Client,
    base_url: String,
}

impl HttpTestingApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path);
        log::debug!("{} {} ({})", method, url, operation);

        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = check_status(operation, req.send().await?).await?;
        Ok(res.json::<T>().await?)
    }
}

/// Turn a non-success response into a backend error carrying the body text
async fn check_status(operation: &str, res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let mut message = res.text().await.unwrap_or_default();
    if message.len() > 300 {
        let cut = (0..=300).rev().find(|i| message.is_char_boundary(*i)).unwrap_or(0);
        message.truncate(cut);
        message.push('…');
    }
    log::warn!("{} failed with {}", operation, status);

    Err(WizardError::Backend {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TestingApi for HttpTestingApi {
    async fn list_endpoints(&self, service_id: &str) -> Result<Vec<Endpoint>> {
        self.send::<(), _>(
            "list endpoints",
            Method::GET,
            &format!("services/{}/endpoints", service_id),
            None,
        )
        .await
    }

    async fn generate_tests(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.send("generate tests", Method::POST, "test-generation", Some(request))
            .await
    }

    async fn trigger_run(&self, request: &RunRequest) -> Result<RunHandle> {
        self.send("trigger run", Method::POST, "chain-runs", Some(request))
            .await
    }

    async fn fetch_run(&self, run_id: &str) -> Result<ChainRun> {
        let run: ChainRun = self
            .send::<(), _>("fetch run", Method::GET, &format!("chain-runs/{}", run_id), None)
            .await?;
        Ok(run.normalized())
    }
}
