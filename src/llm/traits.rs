//! 传输层抽象
//!
//! 编排器只依赖 ChatTransport：send（一次性响应）与 send_stream（SSE 帧序列）。
//! 两种方式解码后在功能上等价；连接池、TLS、超时等属于具体实现。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::AgentError;
use crate::llm::types::{ChatRequest, ChatResponse};

/// 流式响应：每项为一帧 SSE 数据（`data:` 之后的负载），Err 表示传输中断
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// chat/completions 传输 trait
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// 非流式请求，返回完整响应
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;

    /// 流式请求，返回帧流
    async fn send_stream(&self, request: &ChatRequest) -> Result<FrameStream, AgentError>;
}
