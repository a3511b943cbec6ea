use thiserror::Error;

use crate::model::FailureKind;

pub type Result<T> = std::result::Result<T, SumoSearchError>;

#[derive(Debug, Error)]
pub enum SumoSearchError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("正则表达式错误: {pattern} - {reason}")]
    RegexError { pattern: String, reason: String },

    #[error("无效请求: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 后端（Sumo Logic Search Job API）调用失败。
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("后端返回 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("响应解析失败: {0}")]
    Decode(String),
}

/// 一次搜索在某个阶段失败；阶段决定 `FailureKind`。
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("无法计算时间范围: {reason}")]
    TimeRange { reason: String },

    #[error("创建搜索任务失败: {0}")]
    Submit(#[source] BackendError),

    #[error("查询任务 {job_id} 状态失败: {source}")]
    Status {
        job_id: String,
        #[source]
        source: BackendError,
    },

    #[error("搜索任务 {job_id} 在 {waited_ms}ms 内未完成")]
    Timeout { job_id: String, waited_ms: u64 },

    #[error("搜索任务 {job_id} 已被取消")]
    Cancelled { job_id: String },

    #[error("获取任务 {job_id} 结果失败: {source}")]
    Fetch {
        job_id: String,
        #[source]
        source: BackendError,
    },
}

impl SearchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SearchError::TimeRange { .. } => FailureKind::TimeRange,
            SearchError::Submit(_) => FailureKind::Submit,
            SearchError::Status { .. } => FailureKind::Status,
            SearchError::Timeout { .. } => FailureKind::Timeout,
            SearchError::Cancelled { .. } => FailureKind::Cancelled,
            SearchError::Fetch { .. } => FailureKind::Fetch,
        }
    }
}
