//! 工具注册表
//!
//! 所有工具实现 Tool trait（definition / execute），由 ToolRegistry 按名注册与查找；
//! 分组表（分组名 -> 工具名列表）在启动时加载一次，之后只读，resolve 把若干分组解析成去重后的定义列表。
//!
//! 注册表由组合根显式构建并注入编排器，测试可以各自构建互不干扰的注册表。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::AgentError;
use crate::tools::schema::ToolDefinition;

/// 工具 trait：定义（供 LLM 理解）+ 异步执行（args 为 JSON 对象）
///
/// 工具只拿到参数，不接触会话状态；返回值即写回 tool 消息的文本。
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    /// 是否受执行器的单次超时约束（子代理委派自带迭代上限，不受此限）
    fn bounded(&self) -> bool {
        true
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String>;
}

/// 分组表：分组名 -> 工具名列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl ToolGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn members(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// 分组名（有序）
    pub fn names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, Vec<T>)> for ToolGroups {
    fn from_iter<I: IntoIterator<Item = (S, Vec<T>)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(group, tools)| (group.into(), tools.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，分组表通过 Arc 在克隆之间共享
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    groups: Arc<OnceLock<ToolGroups>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "tool re-registered, previous entry replaced");
        }
    }

    /// 加载分组表；每个注册表家族（含其克隆）只能成功一次
    pub fn load_groups(&self, groups: ToolGroups) -> Result<(), AgentError> {
        let count = groups.len();
        self.groups
            .set(groups)
            .map_err(|_| AgentError::GroupsAlreadyLoaded)?;
        debug!(groups = count, "tool groups loaded");
        Ok(())
    }

    pub fn groups(&self) -> Option<&ToolGroups> {
        self.groups.get()
    }

    /// 按名查找可调用工具
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| tool.definition())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 已注册工具名（有序）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 全部已注册工具定义（按名称排序）
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.definition(name).cloned())
            .collect()
    }

    /// 把若干分组解析为去重后的工具定义（按名称排序）。
    /// 未知分组、未注册的工具名都静默忽略。
    pub fn resolve<S: AsRef<str>>(&self, group_names: &[S]) -> Vec<ToolDefinition> {
        let Some(groups) = self.groups() else {
            return Vec::new();
        };
        let names: BTreeSet<&str> = group_names
            .iter()
            .filter_map(|group| groups.members(group.as_ref()))
            .flatten()
            .map(String::as_str)
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.definition(name).cloned())
            .collect()
    }

    /// 把请求的分组名拆成 (存在, 不存在)，保持输入顺序
    pub fn validate_groups<S: AsRef<str>>(&self, group_names: &[S]) -> (Vec<String>, Vec<String>) {
        group_names
            .iter()
            .map(|g| g.as_ref().to_string())
            .partition(|g| self.groups().is_some_and(|groups| groups.contains(g)))
    }

    pub fn available_groups(&self) -> Vec<String> {
        self.groups().map(ToolGroups::names).unwrap_or_default()
    }
}
