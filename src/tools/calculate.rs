//! 四则运算工具
//!
//! 除零与不支持的运算返回固定文本而不是错误，模型可以直接读到原因。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolDefinition, ToolSchemaBuilder};

const DOC: &str = "
    执行基本的数学运算（加、减、乘、除）

    参数:
        operation: 运算类型（add, subtract, multiply, divide）
        num1: 第一个数字
        num2: 第二个数字

    返回:
        计算结果
";

pub const DIVISION_BY_ZERO: &str = "Error: division by zero";

/// calculate(operation, num1, num2)
pub struct CalculateTool {
    def: ToolDefinition,
}

impl CalculateTool {
    pub fn new() -> Self {
        Self {
            def: ToolSchemaBuilder::new("calculate")
                .doc(DOC)
                .param("operation", "str")
                .param("num1", "float")
                .param("num2", "float")
                .build(),
        }
    }
}

impl Default for CalculateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculateTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let operation = args
            .get("operation")
            .and_then(Value::as_str)
            .ok_or("missing 'operation'")?;
        let num1 = number_arg(&args, "num1")?.ok_or("missing 'num1'")?;
        let num2 = number_arg(&args, "num2")?.ok_or("missing 'num2'")?;

        let value = match operation {
            "add" => num1 + num2,
            "subtract" => num1 - num2,
            "multiply" => num1 * num2,
            "divide" if num2 == 0.0 => return Ok(DIVISION_BY_ZERO.to_string()),
            "divide" => num1 / num2,
            other => return Ok(format!("Error: unsupported operation {other}")),
        };
        Ok(format_number(value))
    }
}

/// 读取数值参数；接受 JSON 数字或可解析为数字的字符串
pub(crate) fn number_arg(args: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("'{key}' is not a finite number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{key}' is not a number: {s}")),
        Some(other) => Err(format!("'{key}' is not a number: {other}")),
    }
}

/// 整数结果不带小数部分：12.0 -> "12"
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(args: Value) -> Result<String, String> {
        let Value::Object(map) = args else {
            unreachable!()
        };
        CalculateTool::new().execute(map).await
    }

    #[tokio::test]
    async fn test_operations() {
        let r = run(json!({"operation": "multiply", "num1": 3, "num2": 4})).await;
        assert_eq!(r.unwrap(), "12");
        let r = run(json!({"operation": "add", "num1": 1.5, "num2": 1})).await;
        assert_eq!(r.unwrap(), "2.5");
        let r = run(json!({"operation": "subtract", "num1": "10", "num2": 4})).await;
        assert_eq!(r.unwrap(), "6");
        let r = run(json!({"operation": "divide", "num1": 1, "num2": 4})).await;
        assert_eq!(r.unwrap(), "0.25");
    }

    #[tokio::test]
    async fn test_fixed_error_texts() {
        let r = run(json!({"operation": "divide", "num1": 1, "num2": 0})).await;
        assert_eq!(r.unwrap(), DIVISION_BY_ZERO);
        let r = run(json!({"operation": "pow", "num1": 2, "num2": 3})).await;
        assert_eq!(r.unwrap(), "Error: unsupported operation pow");
    }

    #[tokio::test]
    async fn test_missing_or_bad_arguments() {
        assert!(run(json!({"operation": "add", "num1": 1})).await.is_err());
        assert!(run(json!({"operation": "add", "num1": "x", "num2": 1})).await.is_err());
        assert!(run(json!({"num1": 1, "num2": 1})).await.is_err());
    }

    #[test]
    fn test_schema() {
        let tool = CalculateTool::new();
        let def = tool.definition();
        assert_eq!(def.required, vec!["operation", "num1", "num2"]);
        assert_eq!(def.parameter("num2").unwrap().description, "第二个数字");
    }
}
