//! 工具 Schema 构建
//!
//! 每个工具在实现旁边显式声明自己的参数（名称、类型名、默认值）和一段说明文档，
//! ToolSchemaBuilder 据此生成 ToolDefinition（OpenAI function 工具格式）。
//!
//! 参数描述从文档里「参数」段启发式提取：识别 `参数:` / `Args:` / `Parameters:` 标签
//! （大小写不敏感），遇到 `返回:` / `Returns:` / `Raises:` 停止；某行冒号前含参数名即取冒号后的文字。
//! 这只是尽力而为的约定，不是结构化文档解析器，提取不到时回退为「<参数名> parameter」。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

/// 没有任何可用描述时的占位
pub const NO_DESCRIPTION: &str = "No description";

/// JSON Schema 参数类型（固定映射表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// 由声明的类型名映射；`Option<T>` / `Optional[T]` 折叠为 T，无法识别的一律视为 string
    pub fn from_type_name(name: &str) -> Self {
        let name = name.trim();
        if let Some(inner) = unwrap_optional(name) {
            return Self::from_type_name(inner);
        }
        let base = name
            .split(['<', '['])
            .next()
            .unwrap_or(name)
            .trim();
        match base.to_ascii_lowercase().as_str() {
            "int" | "integer" | "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32"
            | "u64" | "usize" => ParamType::Integer,
            "float" | "number" | "f32" | "f64" => ParamType::Number,
            "bool" | "boolean" => ParamType::Boolean,
            "list" | "array" | "vec" => ParamType::Array,
            "dict" | "object" | "map" | "hashmap" | "btreemap" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

fn unwrap_optional(name: &str) -> Option<&str> {
    name.strip_prefix("Option<")
        .and_then(|rest| rest.strip_suffix('>'))
        .or_else(|| {
            name.strip_prefix("Optional[")
                .and_then(|rest| rest.strip_suffix(']'))
        })
}

/// 单个参数的 schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// 工具定义：注册时生成一次，之后只读
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// 按声明顺序
    pub parameters: Vec<(String, ParamSpec)>,
    /// 没有默认值的参数
    pub required: Vec<String>,
}

impl ToolDefinition {
    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// 参数部分的 JSON Schema
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    serde_json::to_value(spec).unwrap_or(Value::Null),
                )
            })
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// OpenAI function 工具格式
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }
}

impl Serialize for ToolDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// 显式声明式构建器：`名称 + 文档 + 参数声明 -> ToolDefinition`
#[derive(Debug, Clone)]
pub struct ToolSchemaBuilder {
    name: String,
    description: Option<String>,
    doc: Option<String>,
    params: Vec<(String, ParamType, Option<Value>)>,
}

impl ToolSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            doc: None,
            params: Vec::new(),
        }
    }

    /// 显式描述，优先于文档
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 说明文档（函数描述与参数描述的来源）
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// 必填参数
    pub fn param(mut self, name: impl Into<String>, type_name: &str) -> Self {
        self.params
            .push((name.into(), ParamType::from_type_name(type_name), None));
        self
    }

    /// 带默认值的可选参数，默认值写入 schema
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        type_name: &str,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push((
            name.into(),
            ParamType::from_type_name(type_name),
            Some(default.into()),
        ));
        self
    }

    pub fn build(self) -> ToolDefinition {
        let doc = self.doc.as_deref().unwrap_or("");
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| function_description(doc));

        let mut required = Vec::new();
        let parameters = self
            .params
            .into_iter()
            .map(|(name, kind, default)| {
                if default.is_none() {
                    required.push(name.clone());
                }
                let spec = ParamSpec {
                    kind,
                    description: param_description(doc, &name),
                    default,
                };
                (name, spec)
            })
            .collect();

        ToolDefinition {
            name: self.name,
            description,
            parameters,
            required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Params,
    Returns,
    Raises,
}

fn section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(参数|args|arguments|parameters|返回|returns?|raises)\s*[:：]")
            .expect("section label pattern is valid")
    })
}

fn section_label(line: &str) -> Option<Section> {
    let captures = section_pattern().captures(line.trim())?;
    let label = captures.get(1)?.as_str().to_lowercase();
    Some(match label.as_str() {
        "参数" | "args" | "arguments" | "parameters" => Section::Params,
        "raises" => Section::Raises,
        _ => Section::Returns,
    })
}

/// 函数描述：取第一个段落标签之前的非空行，以空格连接
pub fn function_description(doc: &str) -> String {
    let lines: Vec<&str> = doc
        .lines()
        .map(str::trim)
        .take_while(|line| section_label(line).is_none())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        NO_DESCRIPTION.to_string()
    } else {
        lines.join(" ")
    }
}

/// 参数描述：在「参数」段内找 `name: 描述` 行；找不到时回退为 `<name> parameter`
pub fn param_description(doc: &str, name: &str) -> String {
    let mut in_params = false;
    for line in doc.lines().map(str::trim) {
        match section_label(line) {
            Some(Section::Params) => {
                in_params = true;
                continue;
            }
            Some(Section::Returns | Section::Raises) if in_params => break,
            Some(_) => continue,
            None => {}
        }
        if !in_params || !line.contains(name) {
            continue;
        }
        if let Some((head, tail)) = line.split_once([':', '：']) {
            if head.contains(name) {
                return tail.trim().to_string();
            }
        }
    }
    format!("{name} parameter")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALC_DOC: &str = "
        执行基本的数学运算
        （加、减、乘、除）

        参数:
            operation: 运算类型（add, subtract, multiply, divide）
            num1: 第一个数字
            num2: 第二个数字

        返回:
            计算结果
    ";

    #[test]
    fn test_type_table() {
        assert_eq!(ParamType::from_type_name("int"), ParamType::Integer);
        assert_eq!(ParamType::from_type_name("u32"), ParamType::Integer);
        assert_eq!(ParamType::from_type_name("float"), ParamType::Number);
        assert_eq!(ParamType::from_type_name("f64"), ParamType::Number);
        assert_eq!(ParamType::from_type_name("str"), ParamType::String);
        assert_eq!(ParamType::from_type_name("bool"), ParamType::Boolean);
        assert_eq!(ParamType::from_type_name("list"), ParamType::Array);
        assert_eq!(ParamType::from_type_name("Vec<String>"), ParamType::Array);
        assert_eq!(ParamType::from_type_name("dict"), ParamType::Object);
        assert_eq!(ParamType::from_type_name("Uuid"), ParamType::String);
    }

    #[test]
    fn test_optional_collapses_to_inner() {
        assert_eq!(ParamType::from_type_name("Option<i64>"), ParamType::Integer);
        assert_eq!(ParamType::from_type_name("Optional[bool]"), ParamType::Boolean);
        assert_eq!(ParamType::from_type_name("Optional[str]"), ParamType::String);
    }

    #[test]
    fn test_function_description_stops_at_section() {
        assert_eq!(function_description(CALC_DOC), "执行基本的数学运算 （加、减、乘、除）");
        assert_eq!(function_description(""), NO_DESCRIPTION);
        assert_eq!(function_description("Args:\n  x: y"), NO_DESCRIPTION);
    }

    #[test]
    fn test_param_description_extraction() {
        assert_eq!(param_description(CALC_DOC, "num1"), "第一个数字");
        assert_eq!(
            param_description(CALC_DOC, "operation"),
            "运算类型（add, subtract, multiply, divide）"
        );
        assert_eq!(param_description(CALC_DOC, "precision"), "precision parameter");
    }

    #[test]
    fn test_param_description_labels_are_case_insensitive() {
        let doc = "Say hello.\n\nARGS:\n    name: who to greet\nReturns:\n    name: not this";
        assert_eq!(param_description(doc, "name"), "who to greet");
        let doc = "Say hello.\nparameters:\n  name：全角冒号";
        assert_eq!(param_description(doc, "name"), "全角冒号");
    }

    #[test]
    fn test_param_outside_section_is_ignored() {
        let doc = "name: in the summary\nArgs:\n  other: x";
        assert_eq!(param_description(doc, "name"), "name parameter");
    }

    #[test]
    fn test_builder_required_and_defaults() {
        let def = ToolSchemaBuilder::new("get_random_number")
            .doc("生成随机整数\n\n参数:\n    min_value: 最小值\n    max_value: 最大值")
            .param_with_default("min_value", "int", 0)
            .param_with_default("max_value", "int", 100)
            .build();
        assert!(def.required.is_empty());
        assert_eq!(def.parameter("max_value").unwrap().default, Some(json!(100)));
        assert_eq!(def.parameter("min_value").unwrap().description, "最小值");

        let def = ToolSchemaBuilder::new("calculate")
            .doc(CALC_DOC)
            .param("operation", "str")
            .param("num1", "float")
            .param("num2", "float")
            .build();
        assert_eq!(def.required, vec!["operation", "num1", "num2"]);
        assert!(def.is_required("num2"));
    }

    #[test]
    fn test_explicit_description_wins() {
        let def = ToolSchemaBuilder::new("add_numbers")
            .description("将两个数字相加")
            .doc("ignored summary")
            .param("x", "float")
            .build();
        assert_eq!(def.description, "将两个数字相加");
    }

    #[test]
    fn test_wire_format() {
        let def = ToolSchemaBuilder::new("calculate")
            .doc(CALC_DOC)
            .param("operation", "str")
            .param_with_default("num1", "float", 1.5)
            .build();
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "calculate");
        let params = &wire["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["operation"]["type"], "string");
        assert_eq!(params["properties"]["num1"]["type"], "number");
        assert_eq!(params["properties"]["num1"]["default"], 1.5);
        assert_eq!(params["required"], json!(["operation"]));
    }
}
