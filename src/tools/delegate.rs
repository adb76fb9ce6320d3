//! 委派工具：让主模型把子任务交给专门的代理
//!
//! 本身是普通工具，结果是 DelegationResult 负载的 JSON 文本。
//! 子代理自带迭代上限，因此不受执行器的单次超时约束。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::delegation::AgentDelegator;
use crate::tools::{Tool, ToolDefinition, ToolSchemaBuilder};

pub const DELEGATE_TOOL_NAME: &str = "delegate_task";

/// delegate_task(agent_type, task_description)
pub struct DelegateTool {
    delegator: Arc<AgentDelegator>,
    def: ToolDefinition,
}

impl DelegateTool {
    /// 描述中列出当前可用的代理，供模型选择
    pub fn new(delegator: Arc<AgentDelegator>) -> Self {
        let agents: Vec<String> = delegator
            .profiles()
            .iter()
            .map(|p| format!("- {}: {}", p.agent_type, p.name))
            .collect();
        let roster = if agents.is_empty() {
            "(当前没有可用代理)".to_string()
        } else {
            agents.join("\n")
        };
        let doc = format!(
            "将任务委派给专门的代理（Agent）执行\n\
             每个代理都有固定的工具和身份：\n\
             {roster}\n\n\
             参数:\n\
             agent_type: 代理类型（{}）\n\
             task_description: 任务的详细描述，应该清晰说明需要完成什么任务\n\n\
             返回:\n\
             代理的执行结果",
            delegator.profiles().agent_types().join("/")
        );
        let def = ToolSchemaBuilder::new(DELEGATE_TOOL_NAME)
            .doc(doc)
            .param("agent_type", "str")
            .param("task_description", "str")
            .build();
        Self { delegator, def }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    fn bounded(&self) -> bool {
        false
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let agent_type = args
            .get("agent_type")
            .and_then(Value::as_str)
            .ok_or("missing 'agent_type'")?;
        let task = args
            .get("task_description")
            .and_then(Value::as_str)
            .ok_or("missing 'task_description'")?;
        let result = self.delegator.delegate(agent_type, task).await;
        Ok(result.to_payload().to_string())
    }
}
