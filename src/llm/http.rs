//! OpenAI 兼容 HTTP 传输
//!
//! 直接 POST 到 chat/completions 端点；流式模式下用 eventsource-stream 切分 SSE 事件，
//! 只把 data 负载交给上层 decoder。请求失败不重试，由编排器以 Failure 结束本次运行。
//!
//! 超时：一次性请求整体受 request_timeout 约束；流式请求只约束到响应头与相邻两帧之间的空闲时间，
//! 长时间持续输出的推理流不会被截断。

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::traits::{ChatTransport, FrameStream};
use crate::llm::types::{ChatRequest, ChatResponse};

/// 建立连接的超时
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP 传输：持有 reqwest Client、端点与可选 API Key
pub struct HttpTransport {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    /// 一次性请求的总时限，同时是流式请求的首包与帧间空闲时限
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("HIVE_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// 从 [llm] 段创建
    pub fn from_config(llm: &LlmSection) -> Result<Self, AgentError> {
        Self::new(
            llm.api_url.clone(),
            llm.api_key.as_deref(),
            llm.request_timeout_secs,
        )
    }

    fn timed_out(&self, what: &str) -> AgentError {
        AgentError::Transport(format!(
            "{what} timed out after {}s",
            self.request_timeout.as_secs_f64()
        ))
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response, AgentError> {
        debug!(
            url = %self.api_url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            stream = request.stream,
            "sending chat request"
        );

        let mut builder = self.client.post(&self.api_url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("chat endpoint error: {} - {}", status, body);
            return Err(AgentError::Transport(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let body = timeout(self.request_timeout, async {
            self.post(request)
                .await?
                .text()
                .await
                .map_err(|e| AgentError::Transport(e.to_string()))
        })
        .await
        .map_err(|_| self.timed_out("chat request"))??;

        serde_json::from_str(&body)
            .map_err(|e| AgentError::Decode(format!("failed to parse response: {e} - {body}")))
    }

    async fn send_stream(&self, request: &ChatRequest) -> Result<FrameStream, AgentError> {
        let response = timeout(self.request_timeout, self.post(request))
            .await
            .map_err(|_| self.timed_out("chat request"))??;

        let idle = self.request_timeout;
        let events = Box::pin(response.bytes_stream().eventsource());
        // 出错后不再继续读取
        let frames = stream::unfold(Some(events), move |state| async move {
            let mut events = state?;
            match timeout(idle, events.next()).await {
                Ok(Some(Ok(event))) => Some((Ok(event.data), Some(events))),
                Ok(Some(Err(e))) => Some((
                    Err(AgentError::Transport(format!("SSE stream error: {e}"))),
                    None,
                )),
                Ok(None) => None,
                Err(_) => {
                    error!(idle_secs = idle.as_secs_f64(), "SSE stream idle timeout");
                    Some((
                        Err(AgentError::Transport(format!(
                            "SSE stream idle for {}s",
                            idle.as_secs_f64()
                        ))),
                        None,
                    ))
                }
            }
        });
        Ok(Box::pin(frames))
    }
}
