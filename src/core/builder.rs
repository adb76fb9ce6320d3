//! 组合根：由配置装配传输、注册表、委派器与编排器
//!
//! 注册表显式构建后注入，不使用全局单例；测试可以注入 mock 传输、分组表与代理表。
//! 委派器拿到的是不含 delegate_task 的基础注册表，主编排器的注册表在其上追加委派工具。

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{load_agent_profiles, load_tool_groups, AppConfig};
use crate::core::delegation::{AgentDelegator, AgentProfiles, DelegationSettings};
use crate::core::orchestrator::{ChatOptions, RunReport, TurnOrchestrator};
use crate::core::AgentError;
use crate::llm::{ChatTransport, HttpTransport, Message, StreamSink};
use crate::tools::{register_builtin, DelegateTool, ToolDefinition, ToolExecutor, ToolGroups, ToolRegistry};

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    transport: Option<Arc<dyn ChatTransport>>,
    groups: Option<ToolGroups>,
    profiles: Option<AgentProfiles>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            transport: None,
            groups: None,
            profiles: None,
        }
    }

    /// 使用指定传输（默认按 [llm] 段创建 HttpTransport）
    pub fn with_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 使用指定分组表（默认读 [tools].groups_path）
    pub fn with_groups(mut self, groups: ToolGroups) -> Self {
        self.groups = Some(groups);
        self
    }

    /// 使用指定代理表（默认读 [tools].agents_path）
    pub fn with_profiles(mut self, profiles: AgentProfiles) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 基础注册表：内置工具 + 分组表，不含 delegate_task
    pub fn build_base_registry(&self, groups: ToolGroups) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry);
        registry.load_groups(groups)?;
        Ok(registry)
    }

    pub fn build(self) -> Result<AgentRuntime, AgentError> {
        let transport = match self.transport.clone() {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&self.config.llm)?),
        };
        let groups = match self.groups.clone() {
            Some(groups) => groups,
            None => load_tool_groups(&self.config.tools.groups_path)?,
        };
        let profiles = self.profiles.clone().unwrap_or_else(|| {
            load_agent_profiles(&self.config.tools.agents_path, &self.config.delegation)
        });

        let timeout = self.config.tools.tool_timeout_secs;
        let base = self.build_base_registry(groups)?;

        let delegator = Arc::new(AgentDelegator::new(
            transport.clone(),
            ToolExecutor::new(Arc::new(base.clone()), timeout),
            profiles,
            DelegationSettings {
                model: self.config.llm.model.clone(),
                temperature: self.config.delegation.temperature,
                max_tokens: self.config.delegation.max_tokens,
            },
        ));

        let mut registry = base;
        registry.register(DelegateTool::new(delegator.clone()));
        info!(
            tools = ?registry.tool_names(),
            groups = ?registry.available_groups(),
            agents = ?delegator.profiles().agent_types(),
            "agent assembled"
        );

        let orchestrator = TurnOrchestrator::new(
            transport,
            ToolExecutor::new(Arc::new(registry), timeout),
            self.config.llm.model.clone(),
        );

        Ok(AgentRuntime {
            orchestrator,
            delegator,
            config: self.config,
        })
    }
}

/// 装配完成的运行时：主编排器 + 委派器 + 配置
pub struct AgentRuntime {
    pub orchestrator: TurnOrchestrator,
    pub delegator: Arc<AgentDelegator>,
    pub config: AppConfig,
}

impl AgentRuntime {
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.orchestrator.executor().registry()
    }

    /// 主任务工具集：[chat].tool_groups 解析结果，未知分组记 warn 后忽略
    pub fn tools(&self) -> Vec<ToolDefinition> {
        let registry = self.registry();
        let (valid, invalid) = registry.validate_groups(self.config.chat.tool_groups.as_slice());
        if !invalid.is_empty() {
            warn!(
                invalid = ?invalid,
                available = ?registry.available_groups(),
                "unknown tool groups ignored"
            );
        }
        registry.resolve(valid.as_slice())
    }

    pub fn chat_options(&self) -> ChatOptions {
        self.config.chat.options()
    }

    /// 以单条 user 消息运行一次主任务
    pub async fn run(&self, prompt: &str, sink: &mut dyn StreamSink) -> RunReport {
        let messages = vec![Message::user(prompt)];
        self.orchestrator
            .chat_with_sink(&messages, &self.tools(), &self.chat_options(), sink)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delegation::AgentProfile;
    use crate::llm::{NoopSink, Scripted, ScriptedTransport, ToolCall};

    fn runtime(transport: Arc<ScriptedTransport>, chat_groups: &[&str]) -> AgentRuntime {
        let mut config = AppConfig::default();
        config.chat.tool_groups = chat_groups.iter().map(|g| g.to_string()).collect();
        config.chat.stream = false;
        AgentBuilder::new(config)
            .with_transport(transport)
            .with_groups(ToolGroups::from_iter([
                ("math", vec!["calculate", "get_random_number"]),
                ("agents", vec!["delegate_task"]),
                ("all", vec!["calculate", "get_random_number", "get_current_time", "delegate_task"]),
            ]))
            .with_profiles(AgentProfiles::from_iter([
                AgentProfile::new("math_agent").with_tool_groups(["all"]),
            ]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_main_registry_has_delegation_but_sub_registry_does_not() {
        let rt = runtime(Arc::new(ScriptedTransport::default()), &["all"]);
        assert!(rt.registry().contains("delegate_task"));
        let names: Vec<_> = rt.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["calculate", "delegate_task", "get_current_time", "get_random_number"]
        );
    }

    #[test]
    fn test_unknown_chat_groups_are_ignored() {
        let rt = runtime(Arc::new(ScriptedTransport::default()), &["math", "nope"]);
        assert_eq!(rt.tools().len(), 2);
    }

    #[tokio::test]
    async fn test_sub_agent_cannot_delegate() {
        let transport = Arc::new(ScriptedTransport::new([
            // 主任务委派给 math_agent
            Scripted::Reply(Message::assistant_tool_calls(vec![ToolCall::new(
                "c1",
                "delegate_task",
                r#"{"agent_type": "math_agent", "task_description": "算 6*7"}"#,
            )])),
            // 子代理请求
            Scripted::Reply(Message::assistant("42")),
            // 主任务收尾
            Scripted::Reply(Message::assistant("答案是 42")),
        ]));
        let rt = runtime(transport.clone(), &["all"]);
        let report = rt.run("6*7?", &mut NoopSink).await;
        assert_eq!(report.outcome.text(), Some("答案是 42"));

        let requests = transport.requests();
        let sub_tools: Vec<_> = requests[1].tools.iter().map(|t| t.name.as_str()).collect();
        assert!(!sub_tools.contains(&"delegate_task"));
        assert_eq!(sub_tools.len(), 3);
    }
}
