//! Sumo Logic Search Job API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::SumoConfig;
use crate::error::BackendError;
use crate::model::{JobId, JobParams, JobStatus, MessagesPage, RecordsPage};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The five job primitives the search orchestrator relies on.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn create_job(&self, params: &JobParams) -> BackendResult<JobId>;

    async fn job_status(&self, id: &JobId) -> BackendResult<JobStatus>;

    async fn messages(&self, id: &JobId) -> BackendResult<MessagesPage>;

    async fn records(&self, id: &JobId) -> BackendResult<RecordsPage>;

    async fn delete_job(&self, id: &JobId) -> BackendResult<()>;
}

#[derive(Debug, Deserialize)]
struct CreatedJob {
    id: String,
}

#[derive(Clone)]
pub struct SumoClient {
    client: Client,
    base_url: String,
    access_id: String,
    access_key: String,
    page_limit: usize,
}

impl SumoClient {
    pub fn new(config: &SumoConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/api/v1/search/jobs", config.endpoint.trim_end_matches('/')),
            access_id: config.access_id.clone(),
            access_key: config.access_key.clone(),
            page_limit: config.page_limit.max(1),
        })
    }

    fn job_url(&self, id: &JobId) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(&id.0))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.access_id, Some(&self.access_key))
            .header("Accept", "application/json")
    }

    fn page_query(&self) -> [(&'static str, String); 2] {
        [("offset", "0".to_string()), ("limit", self.page_limit.to_string())]
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> BackendResult<T> {
        let response = Self::check(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn check(response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SearchBackend for SumoClient {
    async fn create_job(&self, params: &JobParams) -> BackendResult<JobId> {
        debug!("creating search job: query={:?} from={} to={}", params.query, params.from, params.to);
        let builder = self.authorized(self.client.post(&self.base_url)).json(params);
        let created: CreatedJob = Self::send_json(builder).await?;
        Ok(JobId(created.id))
    }

    async fn job_status(&self, id: &JobId) -> BackendResult<JobStatus> {
        let builder = self.authorized(self.client.get(self.job_url(id)));
        Self::send_json(builder).await
    }

    async fn messages(&self, id: &JobId) -> BackendResult<MessagesPage> {
        let url = format!("{}/messages", self.job_url(id));
        let builder = self.authorized(self.client.get(url)).query(&self.page_query());
        Self::send_json(builder).await
    }

    async fn records(&self, id: &JobId) -> BackendResult<RecordsPage> {
        let url = format!("{}/records", self.job_url(id));
        let builder = self.authorized(self.client.get(url)).query(&self.page_query());
        Self::send_json(builder).await
    }

    async fn delete_job(&self, id: &JobId) -> BackendResult<()> {
        let builder = self.authorized(self.client.delete(self.job_url(id)));
        Self::check(builder.send().await?).await?;
        Ok(())
    }
}
