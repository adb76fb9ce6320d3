//! Hive - 工具调用与子代理委派的编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）、工具分组表与代理配置表
//! - **core**: 轮次编排、子代理委派、过程事件、错误类型与组合根
//! - **llm**: 对话数据模型、流式解码、传输抽象与实现（HTTP / Mock）
//! - **observability**: 日志初始化
//! - **tools**: Schema 构建、注册表与分组、执行器、内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod tools;

pub use crate::core::{AgentBuilder, AgentError, AgentRuntime, ChatOptions, RunOutcome, TurnOrchestrator};
