use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次搜索调用的输入。`from` / `to` 缺省时各自独立地取默认值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, alias = "start_time", alias = "startTime")]
    pub from: Option<String>,
    #[serde(default, alias = "end_time", alias = "endTime")]
    pub to: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            from: None,
            to: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }
}

/// Body of `POST /api/v1/search/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub query: String,
    pub from: String,
    pub to: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    NotStarted,
    GatheringResults,
    ForcePaused,
    DoneGatheringResults,
    Cancelled,
    Other(String),
}

impl JobState {
    pub fn is_done(&self) -> bool {
        matches!(self, JobState::DoneGatheringResults)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::NotStarted => "NOT STARTED",
            JobState::GatheringResults => "GATHERING RESULTS",
            JobState::ForcePaused => "FORCE PAUSED",
            JobState::DoneGatheringResults => "DONE GATHERING RESULTS",
            JobState::Cancelled => "CANCELLED",
            JobState::Other(s) => s,
        }
    }
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NOT STARTED" => JobState::NotStarted,
            "GATHERING RESULTS" => JobState::GatheringResults,
            "FORCE PAUSED" => JobState::ForcePaused,
            "DONE GATHERING RESULTS" => JobState::DoneGatheringResults,
            "CANCELLED" => JobState::Cancelled,
            _ => JobState::Other(s),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub record_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MessagesPage {
    #[serde(default)]
    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RecordsPage {
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SearchResult {
    pub messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TimeRange,
    Submit,
    Status,
    Timeout,
    Cancelled,
    Fetch,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::TimeRange => "time_range",
            FailureKind::Submit => "submit",
            FailureKind::Status => "status",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Fetch => "fetch",
        };
        f.write_str(s)
    }
}

/// 搜索结果：成功或带失败阶段的失败，调用方可以区分“无结果”和“搜索出错”。
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Success(SearchResult),
    Failure { kind: FailureKind, message: String },
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success(_))
    }

    /// 兼容旧行为：失败时退化为 `{ messages: [] }`。
    pub fn into_result_or_empty(self) -> SearchResult {
        match self {
            SearchOutcome::Success(result) => result,
            SearchOutcome::Failure { .. } => SearchResult::default(),
        }
    }
}
