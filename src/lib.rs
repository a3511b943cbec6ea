//! Sumo Logic 日志搜索 MCP 工具核心库
//! 提交搜索任务、轮询完成、获取结果并对 `_raw` / `response` 字段脱敏。

pub mod config;
pub mod error;
pub mod model;
pub mod masking;
pub mod sanitizer;
pub mod client;
pub mod search;
pub mod http;
pub mod mcp;
