//! 工具执行器
//!
//! 把一次 ToolCall 变成一条 tool 消息：解析 arguments -> 按名查找 -> 带超时调用。
//! 任何一步失败都只产出一条 `{"error": ...}` 的 tool 消息，不会中断同一批次的其余调用；
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{error, info};

use crate::core::AgentError;
use crate::llm::{Message, ToolCall};
use crate::tools::ToolRegistry;

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器：持有注册表与单次调用超时
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 解析并执行一次工具调用，总是返回一条 tool 消息（tool_call_id 与调用一致）
    ///
    /// 无论参数解析失败、工具未注册、超时还是成功，每次调用都输出一条审计日志。
    pub async fn dispatch(&self, call: &ToolCall) -> Message {
        let name = call.name();
        info!(id = %call.id, function = %name, arguments = %call.arguments(), "tool call");

        let start = Instant::now();
        let outcome = match parse_arguments(call.arguments()) {
            Ok(args) => self.execute(name, args).await,
            Err(e) => Err(e),
        };
        let audit = audit_record(name, &outcome, start.elapsed(), call.arguments());
        info!(audit = %audit, "tool");

        match outcome {
            Ok(content) => {
                info!(function = %name, result = %content, "tool result");
                Message::tool(&call.id, name, content)
            }
            Err(e) => {
                error!(function = %name, error = %e, "tool call failed");
                Message::tool_error(&call.id, name, e.to_string())
            }
        }
    }

    /// 执行指定工具；未注册返回 ToolNotFound，超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecution
    pub async fn execute(
        &self,
        tool_name: &str,
        args: Map<String, Value>,
    ) -> Result<String, AgentError> {
        let tool = self.registry.lookup(tool_name)?;
        let result = if tool.bounded() {
            timeout(self.timeout, tool.execute(args)).await
        } else {
            Ok(tool.execute(args).await)
        };

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecution(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }
}

/// 审计结果分类
fn audit_outcome(result: &Result<String, AgentError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(AgentError::ArgumentParse(_)) => "invalid_arguments",
        Err(AgentError::ToolNotFound(_)) => "not_found",
        Err(AgentError::ToolTimeout(_)) => "timeout",
        Err(_) => "error",
    }
}

/// 一次调用的审计记录（JSON）
fn audit_record(
    tool_name: &str,
    result: &Result<String, AgentError>,
    elapsed: Duration,
    raw_arguments: &str,
) -> Value {
    serde_json::json!({
        "event": "tool_audit",
        "tool": tool_name,
        "ok": result.is_ok(),
        "outcome": audit_outcome(result),
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(raw_arguments),
    })
}

/// 解析 tool call 的 arguments：必须是 JSON 对象；空白字符串视为无参数
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::ArgumentParse(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(AgentError::ArgumentParse(e.to_string())),
    }
}

fn args_preview(raw: &str) -> String {
    if raw.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", raw.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::tools::{Tool, ToolDefinition, ToolSchemaBuilder};

    struct Sleepy {
        def: ToolDefinition,
    }

    #[async_trait]
    impl Tool for Sleepy {
        fn definition(&self) -> &ToolDefinition {
            &self.def
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    struct Failing {
        def: ToolDefinition,
    }

    #[async_trait]
    impl Tool for Failing {
        fn definition(&self) -> &ToolDefinition {
            &self.def
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<String, String> {
            Err("disk on fire".to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(Sleepy {
            def: ToolSchemaBuilder::new("sleepy").build(),
        });
        reg.register(Failing {
            def: ToolSchemaBuilder::new("failing").build(),
        });
        crate::tools::register_builtin(&mut reg);
        ToolExecutor::new(Arc::new(reg), timeout_secs)
    }

    fn error_text(msg: &Message) -> String {
        let payload: Value = serde_json::from_str(msg.content.as_deref().unwrap()).unwrap();
        payload["error"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("  ").unwrap().len(), 0);
        assert_eq!(parse_arguments(r#"{"a": 1}"#).unwrap()["a"], 1);
        assert!(matches!(parse_arguments("[1]"), Err(AgentError::ArgumentParse(_))));
        assert!(matches!(parse_arguments("{oops"), Err(AgentError::ArgumentParse(_))));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let exec = executor(5);
        let call = ToolCall::new(
            "call_1",
            "calculate",
            r#"{"operation": "multiply", "num1": 3, "num2": 4}"#,
        );
        let msg = exec.dispatch(&call).await;
        assert_eq!(msg.role, crate::llm::Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("calculate"));
        assert_eq!(msg.content.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_dispatch_bad_arguments() {
        let exec = executor(5);
        let msg = exec
            .dispatch(&ToolCall::new("c", "calculate", "{\"operation\": "))
            .await;
        assert_eq!(msg.tool_call_id.as_deref(), Some("c"));
        assert!(error_text(&msg).starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_function() {
        let exec = executor(5);
        let msg = exec.dispatch(&ToolCall::new("c", "fly", "{}")).await;
        assert_eq!(error_text(&msg), "function fly not found");
    }

    #[tokio::test]
    async fn test_dispatch_tool_error() {
        let exec = executor(5);
        let msg = exec.dispatch(&ToolCall::new("c", "failing", "{}")).await;
        assert!(error_text(&msg).contains("disk on fire"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_every_dispatch_is_audited() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let exec = executor(5);
        exec.dispatch(&ToolCall::new("a", "calculate", r#"{"operation": "add", "num1": 1, "num2": 2}"#))
            .await;
        exec.dispatch(&ToolCall::new("b", "calculate", "{oops")).await;
        exec.dispatch(&ToolCall::new("c", "fly", "{}")).await;

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("tool_audit").count(), 3);
        assert!(text.contains("invalid_arguments"));
        assert!(text.contains("not_found"));
    }

    #[test]
    fn test_audit_record_fields() {
        let long = "x".repeat(ARGS_PREVIEW_CHARS + 50);
        let record = audit_record(
            "fly",
            &Err(AgentError::ToolNotFound("fly".into())),
            Duration::from_millis(3),
            &long,
        );
        assert_eq!(record["ok"], false);
        assert_eq!(record["outcome"], "not_found");
        assert_eq!(record["duration_ms"], 3);
        assert_eq!(
            record["args_preview"].as_str().unwrap().chars().count(),
            ARGS_PREVIEW_CHARS + 3
        );
        assert_eq!(audit_outcome(&Ok("1".into())), "ok");
        assert_eq!(audit_outcome(&Err(AgentError::ToolTimeout("s".into()))), "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_timeout() {
        let exec = executor(1);
        let msg = exec.dispatch(&ToolCall::new("c", "sleepy", "")).await;
        assert_eq!(error_text(&msg), "Tool timeout: sleepy");
    }
}
