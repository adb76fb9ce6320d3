//! 核心编排层：错误类型、轮次编排、子代理委派、过程事件与组合根

pub mod builder;
pub mod delegation;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use builder::{AgentBuilder, AgentRuntime};
pub use delegation::{AgentDelegator, AgentProfile, AgentProfiles, DelegationResult, DelegationSettings};
pub use error::AgentError;
pub use events::{ChannelSink, ConsoleSink, TurnEvent};
pub use orchestrator::{ChatOptions, RunOutcome, RunReport, TurnOrchestrator};
