//! LLM 层：线格式、流式解码与传输（HTTP / Mock）

pub mod decoder;
pub mod http;
pub mod mock;
pub mod traits;
pub mod types;

pub use decoder::{decode_frames, encode_frames, DecodeOutcome, NoopSink, StreamDecoder, StreamSink};
pub use http::HttpTransport;
pub use mock::{Scripted, ScriptedTransport};
pub use traits::{ChatTransport, FrameStream};
pub use types::{
    ChatRequest, ChatResponse, FunctionCall, Message, Role, StreamChunk, TemplateOptions, ToolCall,
    ToolCallDelta,
};
