//! 编排过程事件与展示 sink
//!
//! 解码器只负责把帧折叠成消息；实时展示通过 StreamSink 旁路观察：
//! ChannelSink 把增量转成 TurnEvent 发往通道（供前端/SSE），ConsoleSink 直接写终端。

use std::io::{self, Stdout, Write};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::llm::StreamSink;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 进入第几轮请求
    TurnStart {
        label: String,
        turn: usize,
        max_turns: usize,
    },
    /// 推理过程片段（流式）
    ReasoningChunk { text: String },
    /// 回复片段（流式）
    ContentChunk { text: String },
    /// 调用工具
    ToolCall {
        id: String,
        tool: String,
        arguments: String,
    },
    /// 工具返回（预览）
    Observation {
        id: String,
        tool: String,
        preview: String,
    },
    /// 最终回复
    Final { text: String },
    /// 迭代预算耗尽
    Exhausted { iterations: usize },
    Error { text: String },
}

pub(crate) fn send_event(tx: &Option<UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(tx) = tx {
        // 接收端已关闭时忽略
        let _ = tx.send(ev);
    }
}

/// 把解码增量转发为 TurnEvent
pub struct ChannelSink {
    tx: UnboundedSender<TurnEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<TurnEvent>) -> Self {
        Self { tx }
    }
}

impl StreamSink for ChannelSink {
    fn on_reasoning(&mut self, fragment: &str) {
        let _ = self.tx.send(TurnEvent::ReasoningChunk {
            text: fragment.to_string(),
        });
    }

    fn on_content(&mut self, fragment: &str) {
        let _ = self.tx.send(TurnEvent::ContentChunk {
            text: fragment.to_string(),
        });
    }
}

/// 终端展示：首个推理片段前打印 `[reasoning]`，推理之后的首个回复片段前打印 `[reply]`
pub struct ConsoleSink<W: Write + Send = Stdout> {
    out: W,
    in_reasoning: bool,
    reply_started: bool,
    wrote_any: bool,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            in_reasoning: false,
            reply_started: false,
            wrote_any: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        // 终端写失败不影响解码
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.wrote_any = true;
    }
}

impl<W: Write + Send> StreamSink for ConsoleSink<W> {
    fn on_reasoning(&mut self, fragment: &str) {
        if !self.in_reasoning {
            self.in_reasoning = true;
            self.reply_started = false;
            self.write("[reasoning]\n");
        }
        self.write(fragment);
    }

    fn on_content(&mut self, fragment: &str) {
        if self.in_reasoning && !self.reply_started {
            self.write("\n[reply]\n");
        }
        self.reply_started = true;
        self.write(fragment);
    }

    fn on_end(&mut self) {
        if self.wrote_any {
            self.write("\n");
        }
        self.in_reasoning = false;
        self.reply_started = false;
        self.wrote_any = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{decode_frames, encode_frames, Message};

    #[test]
    fn test_console_headers() {
        let mut msg = Message::assistant("12");
        msg.reasoning = Some("3 times 4".to_string());
        let mut sink = ConsoleSink::new(Vec::new());
        let outcome = decode_frames(encode_frames(&msg), &mut sink);
        assert_eq!(outcome.message.text(), Some("12"));
        let printed = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(printed, "[reasoning]\n3 times 4\n[reply]\n12\n");
    }

    #[test]
    fn test_console_without_reasoning_has_no_headers() {
        let mut sink = ConsoleSink::new(Vec::new());
        decode_frames(encode_frames(&Message::assistant("hi")), &mut sink);
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "hi\n");
    }

    #[test]
    fn test_channel_sink_forwards_chunks() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        sink.on_reasoning("r");
        sink.on_content("c");
        assert_eq!(rx.try_recv().unwrap(), TurnEvent::ReasoningChunk { text: "r".into() });
        assert_eq!(rx.try_recv().unwrap(), TurnEvent::ContentChunk { text: "c".into() });
    }

    #[test]
    fn test_event_serialization() {
        let ev = TurnEvent::TurnStart {
            label: "main".into(),
            turn: 1,
            max_turns: 15,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "turn_start");
        assert_eq!(json["max_turns"], 15);
    }
}
