//! 子代理委派
//!
//! 按 agent_type 查找代理配置，新建一个完全隔离的编排运行：
//! 会话只含一条任务描述的 user 消息，工具集由代理配置的分组解析，
//! 使用较低温度、较小输出上限、非流式。父会话不会被传入，也不会被修改。
//!
//! 委派深度固定为 1：委派器持有的注册表不含 delegate_task，子代理无法再委派。
//! 无论子运行成功、耗尽还是失败（包括 panic），都返回 DelegationResult，不向上抛错。
//! 调用方放弃等待（委派 future 被 drop）时，子运行随之中止。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::orchestrator::{ChatOptions, RunOutcome, TurnOrchestrator};
use crate::core::AgentError;
use crate::llm::{ChatTransport, Message};
use crate::tools::{ToolExecutor, DELEGATE_TOOL_NAME};

/// 代理配置：身份、可用工具分组、推理强度与迭代上限
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub agent_type: String,
    pub name: String,
    pub tool_groups: Vec<String>,
    pub identity: String,
    pub reasoning_effort: String,
    pub max_iterations: usize,
}

impl AgentProfile {
    /// 默认：名称同 agent_type，无工具，推理强度 low，最多 10 轮
    pub fn new(agent_type: impl Into<String>) -> Self {
        let agent_type = agent_type.into();
        Self {
            name: agent_type.clone(),
            agent_type,
            tool_groups: Vec::new(),
            identity: String::new(),
            reasoning_effort: "low".to_string(),
            max_iterations: 10,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tool_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.tool_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// 代理配置表（agent_type -> AgentProfile），加载后只读
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentProfiles {
    profiles: BTreeMap<String, AgentProfile>,
}

impl AgentProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: AgentProfile) {
        self.profiles.insert(profile.agent_type.clone(), profile);
    }

    pub fn get(&self, agent_type: &str) -> Option<&AgentProfile> {
        self.profiles.get(agent_type)
    }

    /// 已知代理类型（有序）
    pub fn agent_types(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl FromIterator<AgentProfile> for AgentProfiles {
    fn from_iter<I: IntoIterator<Item = AgentProfile>>(iter: I) -> Self {
        let mut profiles = Self::new();
        for profile in iter {
            profiles.insert(profile);
        }
        profiles
    }
}

/// 子运行的生成参数（代理配置之外的部分）
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-oss-120b".to_string(),
            temperature: 0.3,
            max_tokens: 1500,
        }
    }
}

/// 委派结果：成功时带 result，失败时带 error
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationResult {
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
    pub agent_type: String,
    pub agent_name: String,
    pub task_description: String,
}

impl DelegationResult {
    fn success(profile: &AgentProfile, task: &str, result: String) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            agent_type: profile.agent_type.clone(),
            agent_name: profile.name.clone(),
            task_description: task.to_string(),
        }
    }

    fn failure(agent_type: &str, agent_name: &str, task: &str, error: String) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            agent_type: agent_type.to_string(),
            agent_name: agent_name.to_string(),
            task_description: task.to_string(),
        }
    }

    /// 返回给模型的负载：`{status, agent, result | error, task}`
    pub fn to_payload(&self) -> Value {
        if self.success {
            json!({
                "status": "success",
                "agent": self.agent_name,
                "result": self.result.as_deref().unwrap_or_default(),
                "task": self.task_description,
            })
        } else {
            json!({
                "status": "error",
                "agent": self.agent_name,
                "error": self.error.as_deref().unwrap_or_default(),
                "task": self.task_description,
            })
        }
    }
}

/// 委派器：为每次委派新建独立的编排运行
pub struct AgentDelegator {
    transport: Arc<dyn ChatTransport>,
    executor: ToolExecutor,
    profiles: AgentProfiles,
    settings: DelegationSettings,
}

impl AgentDelegator {
    /// `executor` 的注册表即子代理能看到的全部工具，不应包含 delegate_task
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        executor: ToolExecutor,
        profiles: AgentProfiles,
        settings: DelegationSettings,
    ) -> Self {
        if executor.registry().contains(DELEGATE_TOOL_NAME) {
            warn!("delegation registry contains {DELEGATE_TOOL_NAME}; sub-agents could recurse");
        }
        Self {
            transport,
            executor,
            profiles,
            settings,
        }
    }

    pub fn profiles(&self) -> &AgentProfiles {
        &self.profiles
    }

    /// 执行一次委派；总是返回结果，不返回错误
    pub async fn delegate(&self, agent_type: &str, task_description: &str) -> DelegationResult {
        let Some(profile) = self.profiles.get(agent_type) else {
            let e = AgentError::UnknownAgentType {
                agent_type: agent_type.to_string(),
                available: self.profiles.agent_types().join(", "),
            };
            error!(error = %e, "delegation rejected");
            return DelegationResult::failure(agent_type, agent_type, task_description, e.to_string());
        };

        let registry = self.executor.registry();
        if profile.tool_groups.iter().any(|group| {
            registry
                .groups()
                .and_then(|groups| groups.members(group))
                .is_some_and(|members| members.iter().any(|m| m == DELEGATE_TOOL_NAME))
        }) {
            warn!(
                agent = %profile.agent_type,
                "profile groups include {DELEGATE_TOOL_NAME}; sub-agents cannot delegate, tool dropped"
            );
        }
        let tools = registry.resolve(profile.tool_groups.as_slice());

        info!(
            agent = %profile.name,
            agent_type = %profile.agent_type,
            groups = ?profile.tool_groups,
            tools = tools.len(),
            task = %task_description,
            "sub-agent started"
        );

        let orchestrator = TurnOrchestrator::new(
            self.transport.clone(),
            self.executor.clone(),
            self.settings.model.clone(),
        )
        .with_label(profile.name.clone());
        let options = ChatOptions::default()
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_max_iterations(profile.max_iterations)
            .with_reasoning_effort(profile.reasoning_effort.clone())
            .with_identity(profile.identity.clone())
            .with_stream(false);
        let messages = vec![Message::user(task_description)];

        // 子运行在独立任务中执行，panic 只会变成一次失败的委派
        let mut handle = AbortOnDrop(tokio::spawn(async move {
            orchestrator.chat(&messages, &tools, &options).await
        }));

        let outcome = match (&mut handle.0).await {
            Ok(report) => report.outcome,
            Err(e) => RunOutcome::Failure(AgentError::ToolExecution(format!(
                "sub-agent task aborted: {e}"
            ))),
        };

        match outcome {
            RunOutcome::Success(text) => {
                info!(agent = %profile.name, result = %text, "sub-agent finished");
                DelegationResult::success(profile, task_description, text)
            }
            RunOutcome::Exhausted { iterations } => {
                let e = AgentError::BudgetExhausted(iterations);
                warn!(agent = %profile.name, error = %e, "sub-agent gave no answer");
                DelegationResult::failure(&profile.agent_type, &profile.name, task_description, e.to_string())
            }
            RunOutcome::Failure(e) => {
                error!(agent = %profile.name, error = %e, "sub-agent failed");
                DelegationResult::failure(&profile.agent_type, &profile.name, task_description, e.to_string())
            }
        }
    }
}

/// drop 时中止子任务；已结束的任务上 abort 无副作用
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
