//! Agent 错误类型
//!
//! 按作用范围分两类：单次工具调用 / 单帧解码内的错误会被就地包装（写回 tool 消息或跳过该帧），
//! 请求/响应交换本身的错误只终止当前这一次编排运行。

use thiserror::Error;

/// 编排过程中可能出现的错误（传输、解码、参数、工具、配置等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 发送或接收失败（连接、超时、非 2xx 状态），终止本次运行，不重试
    #[error("Transport error: {0}")]
    Transport(String),

    /// 单帧或整条响应无法解析
    #[error("Decode error: {0}")]
    Decode(String),

    /// tool call 的 arguments 不是合法的 JSON 对象
    #[error("invalid arguments: {0}")]
    ArgumentParse(String),

    #[error("function {0} not found")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 迭代预算耗尽时仍在产生工具调用
    #[error("Iteration budget exhausted after {0} turns")]
    BudgetExhausted(usize),

    /// 助手回复既无 content 也无 tool_calls
    #[error("Assistant returned neither content nor tool calls")]
    DegenerateResponse,

    #[error("Unknown agent type: {agent_type}. Available agents: {available}")]
    UnknownAgentType { agent_type: String, available: String },

    #[error("Config error: {0}")]
    Config(String),

    /// 工具分组表每个进程只允许加载一次
    #[error("Tool groups already loaded")]
    GroupsAlreadyLoaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_display() {
        let err = AgentError::ToolNotFound("fly".to_string());
        assert_eq!(err.to_string(), "function fly not found");
    }

    #[test]
    fn test_unknown_agent_lists_available() {
        let err = AgentError::UnknownAgentType {
            agent_type: "poet".to_string(),
            available: "math_agent, time_agent".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("poet"));
        assert!(text.contains("math_agent, time_agent"));
    }
}
