//! 流式响应解码
//!
//! 把 SSE 增量帧按到达顺序折叠成一条 assistant Message：content / reasoning 片段依次拼接，
//! tool call 片段按 index 归位（id、name 出现即替换，arguments 追加）。
//! 遇到 `[DONE]` 停止；单帧解析失败只记录并跳过，不影响其余帧。
//! index 超过 MAX_TOOL_CALLS 的片段同样作为坏帧跳过；从未收到任何片段的占位槽位不会进入结果。
//!
//! 折叠本身是纯的；实时展示通过可选的 StreamSink 旁路观察，两者互不依赖。

use tracing::warn;

use crate::core::AgentError;
use crate::llm::types::{Delta, Message, StreamChunk, ToolCall, ToolCallDelta};

/// 流结束标记
pub const DONE_MARKER: &str = "[DONE]";

/// 单条消息允许的 tool call 数量上限（index 必须小于它）
pub const MAX_TOOL_CALLS: usize = 128;

/// 解码过程的旁路观察者（终端打印、事件推送等），默认全部空实现
pub trait StreamSink: Send {
    fn on_reasoning(&mut self, _fragment: &str) {}

    fn on_content(&mut self, _fragment: &str) {}

    /// 一次流式响应结束（含未见 `[DONE]` 即断流的情况）
    fn on_end(&mut self) {}
}

/// 不做任何展示
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StreamSink for NoopSink {}

/// 单帧解析结果
#[derive(Debug, Clone)]
pub enum Frame {
    Chunk(StreamChunk),
    /// 空行 / 注释行 / 心跳
    KeepAlive,
    Done,
}

/// 解析一帧数据。既接受 `data:` 之后的负载，也接受完整的 `data: {...}` 行。
pub fn parse_frame(raw: &str) -> Result<Frame, AgentError> {
    let data = raw.trim();
    let data = data
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(data);

    if data.is_empty() || data.starts_with(':') {
        return Ok(Frame::KeepAlive);
    }
    if data == DONE_MARKER {
        return Ok(Frame::Done);
    }
    serde_json::from_str::<StreamChunk>(data)
        .map(Frame::Chunk)
        .map_err(|e| AgentError::Decode(format!("{e}: {data}")))
}

/// 解码结果：重建的消息与被跳过的坏帧
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    pub message: Message,
    pub decode_errors: Vec<AgentError>,
    /// 是否见到了 `[DONE]`
    pub completed: bool,
}

/// 增量解码器
#[derive(Debug, Default)]
pub struct StreamDecoder {
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    decode_errors: Vec<AgentError>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 喂入一帧原始数据；返回 false 表示已见到结束标记，调用方应停止读取
    pub fn push_frame(&mut self, raw: &str, sink: &mut dyn StreamSink) -> bool {
        if self.done {
            return false;
        }
        match parse_frame(raw) {
            Ok(Frame::Chunk(chunk)) => self.apply(&chunk, sink),
            Ok(Frame::KeepAlive) => {}
            Ok(Frame::Done) => self.done = true,
            Err(e) => {
                warn!(error = %e, "skipping malformed stream frame");
                self.decode_errors.push(e);
            }
        }
        !self.done
    }

    /// 折叠一个已解析的帧（只看第一个 choice）
    pub fn apply(&mut self, chunk: &StreamChunk, sink: &mut dyn StreamSink) {
        if let Some(choice) = chunk.choices.first() {
            self.apply_delta(&choice.delta, sink);
        }
    }

    fn apply_delta(&mut self, delta: &Delta, sink: &mut dyn StreamSink) {
        if let Some(piece) = delta.reasoning_content.as_deref().filter(|p| !p.is_empty()) {
            self.reasoning.push_str(piece);
            sink.on_reasoning(piece);
        }
        if let Some(piece) = delta.content.as_deref().filter(|p| !p.is_empty()) {
            self.content.push_str(piece);
            sink.on_content(piece);
        }
        for fragment in &delta.tool_calls {
            if let Err(e) = self.apply_tool_call(fragment) {
                warn!(error = %e, "skipping tool call fragment");
                self.decode_errors.push(e);
            }
        }
    }

    fn apply_tool_call(&mut self, fragment: &ToolCallDelta) -> Result<(), AgentError> {
        if fragment.index >= MAX_TOOL_CALLS {
            return Err(AgentError::Decode(format!(
                "tool call index {} exceeds limit {MAX_TOOL_CALLS}",
                fragment.index
            )));
        }
        // 按最大 index 惰性扩容
        while self.tool_calls.len() <= fragment.index {
            self.tool_calls.push(ToolCall::new("", "", ""));
        }
        let call = &mut self.tool_calls[fragment.index];
        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(function) = &fragment.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                call.function.name = name.to_string();
            }
            if let Some(arguments) = function.arguments.as_deref() {
                call.function.arguments.push_str(arguments);
            }
        }
        Ok(())
    }

    /// 结束折叠，产出消息。三者皆空时仍返回一条空 assistant 消息，由调用方判定。
    pub fn finish(self) -> DecodeOutcome {
        let mut message = Message::empty_assistant();
        if !self.content.is_empty() {
            message.content = Some(self.content);
        }
        if !self.reasoning.is_empty() {
            message.reasoning = Some(self.reasoning);
        }
        // 稀疏 index 留下的空槽位不是模型发出的调用
        message.tool_calls = self
            .tool_calls
            .into_iter()
            .filter(|call| {
                !call.id.is_empty() || !call.name().is_empty() || !call.arguments().is_empty()
            })
            .collect();
        DecodeOutcome {
            message,
            decode_errors: self.decode_errors,
            completed: self.done,
        }
    }
}

/// 对一组已收齐的帧做完整解码（测试与非网络场景）
pub fn decode_frames<I, S>(frames: I, sink: &mut dyn StreamSink) -> DecodeOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut decoder = StreamDecoder::new();
    for frame in frames {
        if !decoder.push_frame(frame.as_ref(), sink) {
            break;
        }
    }
    sink.on_end();
    decoder.finish()
}

/// 把一条完整消息编码为等价的帧序列（以 `[DONE]` 结尾），decode_frames 的逆过程
pub fn encode_frames(message: &Message) -> Vec<String> {
    let mut frames = Vec::new();
    let mut push = |delta: Delta| {
        if let Ok(json) = serde_json::to_string(&StreamChunk::from_delta(delta)) {
            frames.push(json);
        }
    };
    if let Some(reasoning) = &message.reasoning {
        push(Delta {
            reasoning_content: Some(reasoning.clone()),
            ..Delta::default()
        });
    }
    if let Some(content) = &message.content {
        push(Delta {
            content: Some(content.clone()),
            ..Delta::default()
        });
    }
    if message.has_tool_calls() {
        let tool_calls = message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                function: Some(crate::llm::types::FunctionDelta {
                    name: Some(call.function.name.clone()),
                    arguments: Some(call.function.arguments.clone()),
                }),
            })
            .collect();
        push(Delta {
            tool_calls,
            ..Delta::default()
        });
    }
    frames.push(DONE_MARKER.to_string());
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content_frame(text: &str) -> String {
        json!({"choices": [{"delta": {"content": text}}]}).to_string()
    }

    fn reasoning_frame(text: &str) -> String {
        json!({"choices": [{"delta": {"reasoning_content": text}}]}).to_string()
    }

    fn tool_frame(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> String {
        let mut function = serde_json::Map::new();
        if let Some(n) = name {
            function.insert("name".into(), json!(n));
        }
        if let Some(a) = args {
            function.insert("arguments".into(), json!(a));
        }
        let mut call = json!({"index": index, "function": function});
        if let Some(id) = id {
            call["id"] = json!(id);
        }
        json!({"choices": [{"delta": {"tool_calls": [call]}}]}).to_string()
    }

    #[derive(Default)]
    struct Recording {
        reasoning: Vec<String>,
        content: Vec<String>,
        ended: bool,
    }

    impl StreamSink for Recording {
        fn on_reasoning(&mut self, fragment: &str) {
            self.reasoning.push(fragment.to_string());
        }
        fn on_content(&mut self, fragment: &str) {
            self.content.push(fragment.to_string());
        }
        fn on_end(&mut self) {
            self.ended = true;
        }
    }

    #[test]
    fn test_content_and_reasoning_concatenate() {
        let frames = vec![
            reasoning_frame("think "),
            reasoning_frame("hard"),
            content_frame("Hello, "),
            content_frame("world"),
            DONE_MARKER.to_string(),
        ];
        let mut sink = Recording::default();
        let out = decode_frames(&frames, &mut sink);
        assert!(out.completed);
        assert_eq!(out.message.role, crate::llm::Role::Assistant);
        assert_eq!(out.message.content.as_deref(), Some("Hello, world"));
        assert_eq!(out.message.reasoning.as_deref(), Some("think hard"));
        assert_eq!(sink.content, vec!["Hello, ", "world"]);
        assert_eq!(sink.reasoning.len(), 2);
        assert!(sink.ended);
    }

    #[test]
    fn test_fragmentation_invariance() {
        let text = "多轮对话 with tools";
        let per_char: Vec<String> = text
            .chars()
            .map(|c| content_frame(&c.to_string()))
            .chain(std::iter::once(DONE_MARKER.to_string()))
            .collect();
        let whole = vec![content_frame(text), DONE_MARKER.to_string()];

        let a = decode_frames(&per_char, &mut NoopSink).message;
        let b = decode_frames(&whole, &mut NoopSink).message;
        assert_eq!(a, b);
        assert_eq!(a.content.as_deref(), Some(text));
    }

    #[test]
    fn test_tool_calls_reassembled_by_index() {
        let frames = vec![
            tool_frame(0, Some("call_a"), Some("calculate"), Some("")),
            tool_frame(1, Some("call_b"), Some("get_current_time"), Some("{}")),
            tool_frame(0, None, None, Some("{\"operation\":")),
            tool_frame(0, None, None, Some("\"add\",\"num1\":1,\"num2\":2}")),
            DONE_MARKER.to_string(),
        ];
        let out = decode_frames(&frames, &mut NoopSink);
        let calls = &out.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name(), "calculate");
        assert_eq!(
            calls[0].arguments(),
            "{\"operation\":\"add\",\"num1\":1,\"num2\":2}"
        );
        assert_eq!(calls[1].name(), "get_current_time");
        assert!(out.message.content.is_none());
    }

    #[test]
    fn test_sparse_index_drops_untouched_slots() {
        let frames = vec![
            tool_frame(2, Some("c2"), Some("f"), Some("{}")),
            tool_frame(4, None, None, Some("{\"x\":1}")),
        ];
        let out = decode_frames(&frames, &mut NoopSink);
        let calls = &out.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c2");
        assert_eq!(calls[1].arguments(), "{\"x\":1}");
        assert!(!out.completed);
    }

    #[test]
    fn test_huge_tool_call_index_is_rejected() {
        let frames = vec![
            tool_frame(0, Some("c0"), Some("calculate"), Some("{}")),
            tool_frame(5_000_000, Some("bogus"), Some("calculate"), Some("{}")),
            tool_frame(MAX_TOOL_CALLS, None, None, Some("{}")),
            DONE_MARKER.to_string(),
        ];
        let out = decode_frames(&frames, &mut NoopSink);
        assert_eq!(out.message.tool_calls.len(), 1);
        assert_eq!(out.message.tool_calls[0].id, "c0");
        assert_eq!(out.decode_errors.len(), 2);
        assert!(out.completed);
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let good = vec![
            content_frame("a"),
            content_frame("b"),
            DONE_MARKER.to_string(),
        ];
        let with_bad = vec![
            content_frame("a"),
            "{not json".to_string(),
            content_frame("b"),
            DONE_MARKER.to_string(),
        ];
        let clean = decode_frames(&good, &mut NoopSink);
        let dirty = decode_frames(&with_bad, &mut NoopSink);
        assert_eq!(clean.message, dirty.message);
        assert_eq!(dirty.decode_errors.len(), 1);
        assert!(clean.decode_errors.is_empty());
    }

    #[test]
    fn test_done_stops_consumption() {
        let frames = vec![
            content_frame("kept"),
            DONE_MARKER.to_string(),
            content_frame("ignored"),
        ];
        let out = decode_frames(&frames, &mut NoopSink);
        assert_eq!(out.message.content.as_deref(), Some("kept"));
    }

    #[test]
    fn test_sse_line_prefix_and_keepalive() {
        let frames = vec![
            format!("data: {}", content_frame("x")),
            String::new(),
            ": ping".to_string(),
            "data: [DONE]".to_string(),
        ];
        let out = decode_frames(&frames, &mut NoopSink);
        assert_eq!(out.message.content.as_deref(), Some("x"));
        assert!(out.decode_errors.is_empty());
        assert!(out.completed);
    }

    #[test]
    fn test_empty_stream_yields_empty_message() {
        let out = decode_frames(vec![DONE_MARKER], &mut NoopSink);
        assert!(out.message.content.is_none());
        assert!(out.message.reasoning.is_none());
        assert!(out.message.tool_calls.is_empty());
    }

    #[test]
    fn test_encode_then_decode_preserves_message() {
        let mut message = Message::assistant_tool_calls(vec![
            ToolCall::new("c1", "calculate", "{\"operation\":\"add\"}"),
            ToolCall::new("c2", "get_current_time", "{}"),
        ]);
        message.content = Some("checking".to_string());
        message.reasoning = Some("need two tools".to_string());
        let out = decode_frames(encode_frames(&message), &mut NoopSink);
        assert_eq!(out.message, message);
    }
}
