//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__MODEL=qwen`）。
//! 工具分组表与代理配置表是两份独立的 TOML 文档，由 load_tool_groups / load_agent_profiles 读取。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::core::orchestrator::ChatOptions;
use crate::core::{AgentError, AgentProfile, AgentProfiles};
use crate::tools::ToolGroups;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub chat: ChatSection,
    pub delegation: DelegationSection,
    pub tools: ToolsSection,
}

/// [llm] 段：端点、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_url: String,
    pub model: String,
    /// 未设置时依次读环境变量 HIVE_API_KEY、OPENAI_API_KEY
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/v1/chat/completions".to_string(),
            model: "gpt-oss-120b".to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

/// [chat] 段：主任务的生成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub reasoning_effort: String,
    pub stream: bool,
    /// 主任务可用的工具分组
    pub tool_groups: Vec<String>,
    pub model_identity: Option<String>,
    pub builtin_tools: Vec<String>,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            max_iterations: 15,
            reasoning_effort: "medium".to_string(),
            stream: true,
            tool_groups: vec!["all".to_string()],
            model_identity: None,
            builtin_tools: Vec::new(),
        }
    }
}

impl ChatSection {
    pub fn options(&self) -> ChatOptions {
        ChatOptions::default()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_max_iterations(self.max_iterations)
            .with_reasoning_effort(self.reasoning_effort.clone())
            .with_identity(self.model_identity.clone().unwrap_or_default())
            .with_builtin_tools(self.builtin_tools.clone())
            .with_stream(self.stream)
    }
}

/// [delegation] 段：子代理的生成参数，以及代理配置缺省字段的默认值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    pub temperature: f64,
    pub max_tokens: u32,
    pub reasoning_effort: String,
    pub max_iterations: usize,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1500,
            reasoning_effort: "low".to_string(),
            max_iterations: 10,
        }
    }
}

/// [tools] 段：单次工具超时与两份配置表的位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub groups_path: PathBuf,
    pub agents_path: PathBuf,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            groups_path: PathBuf::from("config/tool_groups.toml"),
            agents_path: PathBuf::from("config/agents.toml"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取工具分组表；文件缺失或格式不对都是启动错误
pub fn load_tool_groups(path: &Path) -> Result<ToolGroups, AgentError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AgentError::Config(format!("cannot read tool groups {}: {e}", path.display()))
    })?;
    let groups = parse_tool_groups(&text)?;
    info!(path = %path.display(), groups = groups.len(), "tool groups loaded");
    Ok(groups)
}

/// 解析分组表：每个键是分组名，值必须是字符串数组
pub fn parse_tool_groups(text: &str) -> Result<ToolGroups, AgentError> {
    let table: toml::Table =
        toml::from_str(text).map_err(|e| AgentError::Config(format!("tool groups: {e}")))?;

    let mut groups = BTreeMap::new();
    for (name, value) in table {
        let members = value
            .as_array()
            .ok_or_else(|| AgentError::Config(format!("tool group '{name}' must be an array")))?
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    AgentError::Config(format!("tool group '{name}' must contain only strings"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        groups.insert(name, members);
    }
    Ok(ToolGroups::new(groups))
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    name: Option<String>,
    #[serde(default)]
    tool_groups: Vec<String>,
    identity: Option<String>,
    reasoning_effort: Option<String>,
    max_iterations: Option<usize>,
}

/// 读取代理配置表；文件缺失或无法解析时退化为空表（委派总是报告未知代理）
pub fn load_agent_profiles(path: &Path, defaults: &DelegationSection) -> AgentProfiles {
    if !path.exists() {
        warn!(path = %path.display(), "agent profile file not found, no agents available");
        return AgentProfiles::new();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(e.to_string()))
        .and_then(|text| parse_agent_profiles(&text, defaults));
    match parsed {
        Ok(profiles) => {
            info!(path = %path.display(), agents = profiles.len(), "agent profiles loaded");
            profiles
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to load agent profiles");
            AgentProfiles::new()
        }
    }
}

/// 解析代理配置表：`[agent_type]` 表，除键外字段均可省略
pub fn parse_agent_profiles(
    text: &str,
    defaults: &DelegationSection,
) -> Result<AgentProfiles, AgentError> {
    let raw: BTreeMap<String, RawProfile> =
        toml::from_str(text).map_err(|e| AgentError::Config(format!("agent profiles: {e}")))?;

    Ok(raw
        .into_iter()
        .map(|(agent_type, raw)| {
            let name = raw.name.unwrap_or_else(|| agent_type.clone());
            AgentProfile::new(agent_type)
                .with_name(name)
                .with_tool_groups(raw.tool_groups)
                .with_identity(raw.identity.unwrap_or_default())
                .with_reasoning_effort(
                    raw.reasoning_effort
                        .unwrap_or_else(|| defaults.reasoning_effort.clone()),
                )
                .with_max_iterations(raw.max_iterations.unwrap_or(defaults.max_iterations))
        })
        .collect())
}
