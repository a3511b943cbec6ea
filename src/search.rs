use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::client::SearchBackend;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::masking::Masker;
use crate::model::{
    JobId, JobParams, JobState, JobStatus, MessagesPage, RecordsPage, SearchOutcome,
    SearchRequest, SearchResult,
};
use crate::sanitizer::sanitize_items;

/// 后端时间参数格式；时区通过 `timeZone` 单独传递。
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Search engine: submits a job, waits for it, fetches and sanitizes the results.
pub struct SearchEngine {
    backend: Arc<dyn SearchBackend>,
    masker: Arc<dyn Masker>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        masker: Arc<dyn Masker>,
        config: SearchConfig,
    ) -> Self {
        Self {
            backend,
            masker,
            config,
        }
    }

    /// 从不返回错误：失败以 `SearchOutcome::Failure` 表示。
    pub async fn search(&self, request: SearchRequest) -> SearchOutcome {
        match self.try_search(request).await {
            Ok(result) => SearchOutcome::Success(result),
            Err(e) => {
                error!("search failed ({}): {}", e.kind(), e);
                SearchOutcome::Failure {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    pub async fn try_search(&self, request: SearchRequest) -> Result<SearchResult, SearchError> {
        let started = Instant::now();
        let (from, to) = self.time_range(&request, Utc::now())?;
        let params = JobParams {
            query: request.query,
            from,
            to,
            time_zone: self.config.time_zone.clone(),
        };

        let id = self
            .backend
            .create_job(&params)
            .await
            .map_err(SearchError::Submit)?;
        info!("search job {} created ({} .. {} {})", id, params.from, params.to, params.time_zone);

        let collected = self.collect(&id).await;
        self.cleanup(&id).await;
        let (messages, records) = collected?;

        let masker = self.masker.as_ref();
        let result = SearchResult {
            messages: sanitize_items(messages.messages, masker),
            records: records.map(|page| sanitize_items(page.records, masker)),
        };
        info!(
            "search job {} finished in {}ms: {} messages, {} records",
            id,
            started.elapsed().as_millis(),
            result.messages.len(),
            result.records.as_ref().map(Vec::len).unwrap_or(0)
        );
        Ok(result)
    }

    /// `from` / `to` 各自独立取默认值；空白字符串视为缺省。
    /// 默认值按 `time_zone` 的本地时间格式化（含夏令时）。
    pub fn time_range(
        &self,
        request: &SearchRequest,
        now: DateTime<Utc>,
    ) -> Result<(String, String), SearchError> {
        let from = provided(&request.from);
        let to = provided(&request.to);
        if let (Some(from), Some(to)) = (&from, &to) {
            return Ok((from.clone(), to.clone()));
        }

        let tz: Tz = self
            .config
            .time_zone
            .parse()
            .map_err(|e| SearchError::TimeRange {
                reason: format!("unknown time zone {:?}: {e}", self.config.time_zone),
            })?;
        let hours = self.config.default_lookback_hours;
        let local_now = now.with_timezone(&tz);
        let start = ChronoDuration::try_hours(hours)
            .and_then(|lookback| local_now.checked_sub_signed(lookback))
            .ok_or_else(|| SearchError::TimeRange {
                reason: format!("lookback of {hours}h is out of range"),
            })?;

        Ok((
            from.unwrap_or_else(|| start.format(TIME_FORMAT).to_string()),
            to.unwrap_or_else(|| local_now.format(TIME_FORMAT).to_string()),
        ))
    }

    async fn collect(
        &self,
        id: &JobId,
    ) -> Result<(MessagesPage, Option<RecordsPage>), SearchError> {
        let status = self.wait_for_completion(id).await?;
        self.fetch(id, &status).await
    }

    async fn wait_for_completion(&self, id: &JobId) -> Result<JobStatus, SearchError> {
        let max_wait = self.config.max_wait();
        match timeout(max_wait, self.poll_until_done(id)).await {
            Ok(res) => res,
            Err(_) => Err(SearchError::Timeout {
                job_id: id.to_string(),
                waited_ms: max_wait.as_millis() as u64,
            }),
        }
    }

    async fn poll_until_done(&self, id: &JobId) -> Result<JobStatus, SearchError> {
        let interval = self.config.poll_interval();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let status = self
                .backend
                .job_status(id)
                .await
                .map_err(|source| SearchError::Status {
                    job_id: id.to_string(),
                    source,
                })?;

            if status.state.is_done() {
                debug!("job {} done after {} polls", id, attempts);
                return Ok(status);
            }
            if status.state == JobState::Cancelled {
                return Err(SearchError::Cancelled {
                    job_id: id.to_string(),
                });
            }
            debug!(
                "job {} state={} messages={} records={}",
                id, status.state, status.message_count, status.record_count
            );
            sleep(interval).await;
        }
    }

    async fn fetch(
        &self,
        id: &JobId,
        status: &JobStatus,
    ) -> Result<(MessagesPage, Option<RecordsPage>), SearchError> {
        let fetch_err = |source| SearchError::Fetch {
            job_id: id.to_string(),
            source,
        };

        if status.record_count > 0 {
            let (messages, records) =
                tokio::try_join!(self.backend.messages(id), self.backend.records(id))
                    .map_err(fetch_err)?;
            Ok((messages, Some(records)))
        } else {
            let messages = self.backend.messages(id).await.map_err(fetch_err)?;
            Ok((messages, None))
        }
    }

    /// Best-effort: a failed delete is logged and otherwise ignored.
    async fn cleanup(&self, id: &JobId) {
        if let Err(e) = self.backend.delete_job(id).await {
            warn!("failed to delete search job {}: {}", id, e);
        }
    }
}

fn provided(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
