//! Mock 传输（用于测试，无需 API）
//!
//! 按顺序回放预置的回复，并记录收到的每个请求；脚本用尽后可选择一直重复某条回复，
//! 便于构造「模型永远在调用工具」之类的场景。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream;

use crate::core::AgentError;
use crate::llm::decoder::{decode_frames, encode_frames, NoopSink};
use crate::llm::traits::{ChatTransport, FrameStream};
use crate::llm::types::{ChatRequest, ChatResponse, Message};

/// 一条预置回复
#[derive(Debug, Clone)]
pub enum Scripted {
    /// 完整的助手消息；流式请求时会被编码为等价帧
    Reply(Message),
    /// 原始帧（流式请求原样下发；非流式请求先解码再返回）
    Frames(Vec<String>),
    /// 一次没有任何 choice 的响应
    Empty,
    /// 传输失败
    Fail(String),
}

/// 回放脚本的传输实现
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<Scripted>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 脚本用尽后每次都返回同一条回复
    pub fn repeating(reply: Scripted) -> Self {
        Self::default().then_repeat(reply)
    }

    pub fn then_repeat(mut self, reply: Scripted) -> Self {
        self.repeat = Some(reply);
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next(&self, request: &ChatRequest) -> Result<Scripted, AgentError> {
        lock(&self.requests).push(request.clone());
        lock(&self.script)
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| AgentError::Transport("mock script exhausted".to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        match self.next(request)? {
            Scripted::Reply(message) => Ok(ChatResponse::from_message(message)),
            Scripted::Frames(frames) => Ok(ChatResponse::from_message(
                decode_frames(&frames, &mut NoopSink).message,
            )),
            Scripted::Empty => Ok(ChatResponse { choices: Vec::new() }),
            Scripted::Fail(reason) => Err(AgentError::Transport(reason)),
        }
    }

    async fn send_stream(&self, request: &ChatRequest) -> Result<FrameStream, AgentError> {
        let frames = match self.next(request)? {
            Scripted::Reply(message) => encode_frames(&message),
            Scripted::Frames(frames) => frames,
            Scripted::Empty => vec![crate::llm::decoder::DONE_MARKER.to_string()],
            Scripted::Fail(reason) => return Err(AgentError::Transport(reason)),
        };
        Ok(Box::pin(stream::iter(frames.into_iter().map(Ok))))
    }
}
