//! 轮次编排器：Requesting -> Decoding -> ToolDispatch -> Requesting ...
//!
//! 每次 `chat` 是一次独立运行：拷贝调用方的会话，只在私有副本上追加消息；
//! 请求严格串行，同一批工具调用按出现顺序逐个执行，每个调用恰好对应一条 tool 消息。
//!
//! 终止条件：
//! - 回复不含工具调用且有非空 content -> `Success`
//! - 回复既无工具调用也无 content -> `Failure(DegenerateResponse)`
//! - 传输失败 / 响应无法解析 -> `Failure`（不重试）
//! - 跑满 `max_iterations` 轮仍在调用工具 -> `Exhausted`

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::events::{send_event, TurnEvent};
use crate::core::AgentError;
use crate::llm::{
    ChatRequest, ChatTransport, Message, NoopSink, StreamDecoder, StreamSink, TemplateOptions,
};
use crate::tools::{ToolDefinition, ToolExecutor};

/// 观察结果预览的最大字符数
const PREVIEW_CHARS: usize = 200;

/// 单次运行的生成参数
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub reasoning_effort: String,
    /// 身份设定（chat_template_kwargs.model_identity），空串视为未设置
    pub model_identity: Option<String>,
    /// 服务端内置工具名（chat_template_kwargs.builtin_tools），为空时不发送
    pub builtin_tools: Vec<String>,
    pub stream: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            max_iterations: 15,
            reasoning_effort: "medium".to_string(),
            model_identity: None,
            builtin_tools: Vec::new(),
            stream: false,
        }
    }
}

impl ChatOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        self.model_identity = (!identity.trim().is_empty()).then_some(identity);
        self
    }

    pub fn with_builtin_tools(mut self, tools: Vec<String>) -> Self {
        self.builtin_tools = tools;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            reasoning_effort: self.reasoning_effort.clone(),
            model_identity: self
                .model_identity
                .clone()
                .filter(|identity| !identity.trim().is_empty()),
            builtin_tools: (!self.builtin_tools.is_empty()).then(|| self.builtin_tools.clone()),
        }
    }
}

/// 运行的终态
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 最终回复文本
    Success(String),
    /// 迭代预算耗尽（可恢复，区别于失败）
    Exhausted { iterations: usize },
    /// 无结果
    Failure(AgentError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            RunOutcome::Success(text) => Some(text),
            _ => None,
        }
    }

    /// 调用方视角：文本，或说明为何没有结果
    pub fn into_result(self) -> Result<String, AgentError> {
        match self {
            RunOutcome::Success(text) => Ok(text),
            RunOutcome::Exhausted { iterations } => Err(AgentError::BudgetExhausted(iterations)),
            RunOutcome::Failure(e) => Err(e),
        }
    }
}

/// 一次运行的完整记录：终态 + 私有会话副本 + 实际轮数
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub messages: Vec<Message>,
    pub iterations: usize,
}

/// 轮次编排器：持有传输、工具执行器与模型名，本身无会话状态，可重复使用
#[derive(Clone)]
pub struct TurnOrchestrator {
    transport: Arc<dyn ChatTransport>,
    executor: ToolExecutor,
    model: String,
    label: String,
    events: Option<UnboundedSender<TurnEvent>>,
}

impl TurnOrchestrator {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        executor: ToolExecutor,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            executor,
            model: model.into(),
            label: "main".to_string(),
            events: None,
        }
    }

    /// 日志与事件中的任务标识（主任务为 main，子代理为代理名）
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 运行到终态（不展示流式增量）
    pub async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> RunReport {
        self.chat_with_sink(messages, tools, options, &mut NoopSink)
            .await
    }

    /// 运行到终态，解码增量同时交给 sink 展示
    pub async fn chat_with_sink(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
        sink: &mut dyn StreamSink,
    ) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", task = %self.label, run_id = %run_id);
        self.run(messages, tools, options, sink).instrument(span).await
    }

    async fn run(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
        sink: &mut dyn StreamSink,
    ) -> RunReport {
        let mut conversation = messages.to_vec();
        let mut iterations = 0;

        while iterations < options.max_iterations {
            iterations += 1;
            info!(turn = iterations, max = options.max_iterations, "turn");
            send_event(
                &self.events,
                TurnEvent::TurnStart {
                    label: self.label.clone(),
                    turn: iterations,
                    max_turns: options.max_iterations,
                },
            );

            let request = ChatRequest {
                model: self.model.clone(),
                messages: conversation.clone(),
                tools: tools.to_vec(),
                temperature: options.temperature,
                max_tokens: options.max_tokens,
                stream: options.stream,
                template_options: options.template_options(),
            };

            let mut message = match self.request(&request, sink).await {
                Ok(message) => message,
                Err(e) => return self.fail(conversation, iterations, e),
            };
            assign_missing_ids(&mut message, iterations);
            let calls = message.tool_calls.clone();
            let text = message.text().map(str::to_string);
            conversation.push(message);

            if calls.is_empty() {
                return match text {
                    Some(text) => {
                        info!(turns = iterations, "run finished");
                        send_event(&self.events, TurnEvent::Final { text: text.clone() });
                        RunReport {
                            outcome: RunOutcome::Success(text),
                            messages: conversation,
                            iterations,
                        }
                    }
                    None => self.fail(conversation, iterations, AgentError::DegenerateResponse),
                };
            }

            debug!(count = calls.len(), "dispatching tool calls");
            for call in &calls {
                send_event(
                    &self.events,
                    TurnEvent::ToolCall {
                        id: call.id.clone(),
                        tool: call.name().to_string(),
                        arguments: call.arguments().to_string(),
                    },
                );
                let result = self.executor.dispatch(call).await;
                send_event(
                    &self.events,
                    TurnEvent::Observation {
                        id: call.id.clone(),
                        tool: call.name().to_string(),
                        preview: preview(result.content.as_deref().unwrap_or_default()),
                    },
                );
                conversation.push(result);
            }
        }

        warn!(iterations, "iteration budget exhausted");
        send_event(&self.events, TurnEvent::Exhausted { iterations });
        RunReport {
            outcome: RunOutcome::Exhausted { iterations },
            messages: conversation,
            iterations,
        }
    }

    /// 发送一次请求并得到助手消息；流式与非流式对 sink 的通知方式一致
    async fn request(
        &self,
        request: &ChatRequest,
        sink: &mut dyn StreamSink,
    ) -> Result<Message, AgentError> {
        if !request.stream {
            let response = self.transport.send(request).await?;
            let message = response
                .into_message()
                .ok_or_else(|| AgentError::Decode("response contained no choices".to_string()))?;
            if let Some(reasoning) = message.reasoning.as_deref().filter(|r| !r.is_empty()) {
                sink.on_reasoning(reasoning);
            }
            if let Some(content) = message.text() {
                sink.on_content(content);
            }
            sink.on_end();
            return Ok(message);
        }

        let mut frames = self.transport.send_stream(request).await?;
        let mut decoder = StreamDecoder::new();
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(raw) => {
                    if !decoder.push_frame(&raw, sink) {
                        break;
                    }
                }
                Err(e) => {
                    sink.on_end();
                    return Err(e);
                }
            }
        }
        sink.on_end();

        let outcome = decoder.finish();
        if !outcome.decode_errors.is_empty() {
            warn!(skipped = outcome.decode_errors.len(), "malformed frames skipped");
        }
        if !outcome.completed {
            debug!("stream closed without end marker");
        }
        Ok(outcome.message)
    }

    fn fail(&self, messages: Vec<Message>, iterations: usize, e: AgentError) -> RunReport {
        error!(error = %e, turns = iterations, "run failed");
        send_event(&self.events, TurnEvent::Error { text: e.to_string() });
        RunReport {
            outcome: RunOutcome::Failure(e),
            messages,
            iterations,
        }
    }
}

/// 缺失 id 的工具调用补上 `call_<轮次>_<序号>`，保证 tool_call_id 一一对应
fn assign_missing_ids(message: &mut Message, iteration: usize) {
    for (index, call) in message.tool_calls.iter_mut().enumerate() {
        if call.id.trim().is_empty() {
            call.id = format!("call_{iteration}_{index}");
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}
