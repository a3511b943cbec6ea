use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sumo_search_mcp::client::{BackendResult, SearchBackend};
use sumo_search_mcp::config::SearchConfig;
use sumo_search_mcp::error::{BackendError, SearchError};
use sumo_search_mcp::masking::PatternMasker;
use sumo_search_mcp::model::{
    FailureKind, JobId, JobParams, JobState, JobStatus, MessagesPage, RecordsPage, SearchOutcome,
    SearchRequest,
};
use sumo_search_mcp::search::SearchEngine;
use tokio::sync::Barrier;

#[derive(Default)]
struct Script {
    fail_submit: bool,
    /// 依次返回；用尽后重复最后一个状态。
    states: Vec<JobState>,
    record_count: u64,
    fail_status: bool,
    fail_messages: bool,
    fail_delete: bool,
    messages: Vec<Value>,
    records: Vec<Value>,
    /// messages 与 records 必须同时在途才能继续。
    require_concurrent_fetch: bool,
}

struct ScriptedBackend {
    script: Script,
    states: Mutex<VecDeque<JobState>>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Option<JobParams>>,
    barrier: Barrier,
}

impl ScriptedBackend {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(script.states.iter().cloned().collect()),
            script,
            calls: Mutex::new(Vec::new()),
            submitted: Mutex::new(None),
            barrier: Barrier::new(2),
        })
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn failure() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn create_job(&self, params: &JobParams) -> BackendResult<JobId> {
        self.record("create");
        *self.submitted.lock().unwrap() = Some(params.clone());
        if self.script.fail_submit {
            return Err(Self::failure());
        }
        Ok(JobId::from("job-42"))
    }

    async fn job_status(&self, id: &JobId) -> BackendResult<JobStatus> {
        assert_eq!(id.0, "job-42");
        self.record("status");
        if self.script.fail_status {
            return Err(Self::failure());
        }
        let state = {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                states.pop_front()
            } else {
                states.front().cloned()
            }
        };
        Ok(JobStatus {
            state: state.unwrap_or(JobState::DoneGatheringResults),
            message_count: self.script.messages.len() as u64,
            record_count: self.script.record_count,
        })
    }

    async fn messages(&self, _id: &JobId) -> BackendResult<MessagesPage> {
        self.record("messages");
        if self.script.require_concurrent_fetch {
            self.barrier.wait().await;
        }
        if self.script.fail_messages {
            return Err(Self::failure());
        }
        Ok(MessagesPage {
            messages: self.script.messages.clone(),
        })
    }

    async fn records(&self, _id: &JobId) -> BackendResult<RecordsPage> {
        self.record("records");
        if self.script.require_concurrent_fetch {
            self.barrier.wait().await;
        }
        Ok(RecordsPage {
            records: self.script.records.clone(),
        })
    }

    async fn delete_job(&self, _id: &JobId) -> BackendResult<()> {
        self.record("delete");
        if self.script.fail_delete {
            return Err(Self::failure());
        }
        Ok(())
    }
}

fn fast_config() -> SearchConfig {
    SearchConfig {
        poll_interval_ms: 5,
        max_wait_ms: 2_000,
        ..SearchConfig::default()
    }
}

fn engine_with(backend: Arc<ScriptedBackend>, config: SearchConfig) -> SearchEngine {
    SearchEngine::new(backend, Arc::new(PatternMasker::default()), config)
}

#[tokio::test]
async fn end_to_end_masks_raw_token() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::DoneGatheringResults],
        messages: vec![json!({ "_raw": "token=abc123 failed", "_sourcehost": "web-1" })],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let outcome = engine.search(SearchRequest::new("error")).await;
    let result = match outcome {
        SearchOutcome::Success(r) => r,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "messages": [{ "_raw": "token=***MASKED*** failed", "_sourcehost": "web-1" }] })
    );
    assert_eq!(backend.calls(), vec!["create", "status", "messages", "delete"]);

    let submitted = backend.submitted.lock().unwrap().clone().unwrap();
    assert_eq!(submitted.query, "error");
    assert_eq!(submitted.time_zone, "Asia/Hong_Kong");
    assert_eq!(submitted.from.len(), "2024-01-01T00:00:00".len());
    assert_eq!(submitted.to.len(), "2024-01-01T00:00:00".len());
    assert!(submitted.from < submitted.to);
}

#[tokio::test]
async fn polls_until_done() {
    let backend = ScriptedBackend::new(Script {
        states: vec![
            JobState::NotStarted,
            JobState::GatheringResults,
            JobState::GatheringResults,
            JobState::DoneGatheringResults,
        ],
        messages: vec![json!("plain line")],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let result = engine.try_search(SearchRequest::new("*")).await.unwrap();
    assert_eq!(result.messages, vec![json!("plain line")]);
    assert!(result.records.is_none());
    assert_eq!(backend.count("status"), 4);
    assert_eq!(backend.count("records"), 0);
}

#[tokio::test]
async fn records_fetched_concurrently_when_counted() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::DoneGatheringResults],
        record_count: 2,
        require_concurrent_fetch: true,
        messages: vec![json!({ "map": { "_raw": "mail to a@b.io", "level": "INFO" } })],
        records: vec![
            json!({ "map": { "_count": 2, "response": "password=x" } }),
            json!({ "map": { "_count": 1 } }),
        ],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        engine.try_search(SearchRequest::new("*")),
    )
    .await
    .expect("messages and records must be fetched concurrently")
    .unwrap();

    assert_eq!(
        result.messages,
        vec![json!({ "map": { "_raw": "mail to ***MASKED***", "level": "INFO" } })]
    );
    assert_eq!(
        result.records,
        Some(vec![
            json!({ "map": { "_count": "2", "response": "password=***MASKED***" } }),
            json!({ "map": { "_count": "1" } }),
        ])
    );
    assert_eq!(backend.count("delete"), 1);
}

#[tokio::test]
async fn submit_failure_is_typed_and_degrades_to_empty() {
    let backend = ScriptedBackend::new(Script {
        fail_submit: true,
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let err = engine.try_search(SearchRequest::new("error")).await.unwrap_err();
    assert!(matches!(err, SearchError::Submit(_)));

    let outcome = engine.search(SearchRequest::new("error")).await;
    assert!(!outcome.is_success());
    let legacy = outcome.into_result_or_empty();
    assert_eq!(serde_json::to_value(&legacy).unwrap(), json!({ "messages": [] }));
    // 任务未创建，不应尝试删除
    assert_eq!(backend.count("delete"), 0);
}

#[tokio::test]
async fn status_failure_still_cleans_up() {
    let backend = ScriptedBackend::new(Script {
        fail_status: true,
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let outcome = engine.search(SearchRequest::new("error")).await;
    match outcome {
        SearchOutcome::Failure { kind, message } => {
            assert_eq!(kind, FailureKind::Status);
            assert!(message.contains("job-42"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(backend.calls(), vec!["create", "status", "delete"]);
}

#[tokio::test]
async fn fetch_failure_is_reported() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::DoneGatheringResults],
        fail_messages: true,
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let err = engine.try_search(SearchRequest::new("error")).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Fetch);
    assert_eq!(backend.count("delete"), 1);
}

#[tokio::test]
async fn polling_is_bounded_by_max_wait() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::GatheringResults],
        ..Script::default()
    });
    let config = SearchConfig {
        poll_interval_ms: 10,
        max_wait_ms: 60,
        ..SearchConfig::default()
    };
    let engine = engine_with(backend.clone(), config);

    let err = engine.try_search(SearchRequest::new("error")).await.unwrap_err();
    match err {
        SearchError::Timeout { job_id, waited_ms } => {
            assert_eq!(job_id, "job-42");
            assert_eq!(waited_ms, 60);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(backend.count("status") >= 2);
    assert_eq!(backend.count("messages"), 0);
    assert_eq!(backend.count("delete"), 1);
}

#[tokio::test]
async fn cancelled_job_fails_fast() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::GatheringResults, JobState::Cancelled],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let err = engine.try_search(SearchRequest::new("error")).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert_eq!(backend.count("status"), 2);
}

#[tokio::test]
async fn delete_failure_does_not_change_outcome() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::DoneGatheringResults],
        fail_delete: true,
        messages: vec![json!({ "response": "ok" })],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let result = engine.try_search(SearchRequest::new("error")).await.unwrap();
    assert_eq!(result.messages, vec![json!({ "response": "ok" })]);
    assert_eq!(backend.count("delete"), 1);
}

#[tokio::test]
async fn explicit_bounds_are_forwarded() {
    let backend = ScriptedBackend::new(Script {
        states: vec![JobState::DoneGatheringResults],
        ..Script::default()
    });
    let engine = engine_with(backend.clone(), fast_config());

    let req = SearchRequest::new("error")
        .with_from("2024-05-01T00:00:00")
        .with_to("2024-05-02T00:00:00");
    engine.try_search(req).await.unwrap();

    let submitted = backend.submitted.lock().unwrap().clone().unwrap();
    assert_eq!(submitted.from, "2024-05-01T00:00:00");
    assert_eq!(submitted.to, "2024-05-02T00:00:00");
}
