//! 随机整数工具

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};

use crate::tools::calculate::number_arg;
use crate::tools::{Tool, ToolDefinition, ToolSchemaBuilder};

const DOC: &str = "
    生成一个指定范围内的随机整数

    Args:
        min_value: 随机数的最小值
        max_value: 随机数的最大值

    Returns:
        随机整数
";

const DEFAULT_MIN: i64 = 0;
const DEFAULT_MAX: i64 = 100;

/// get_random_number(min_value = 0, max_value = 100)，闭区间
pub struct RandomNumberTool {
    def: ToolDefinition,
}

impl RandomNumberTool {
    pub fn new() -> Self {
        Self {
            def: ToolSchemaBuilder::new("get_random_number")
                .doc(DOC)
                .param_with_default("min_value", "int", DEFAULT_MIN)
                .param_with_default("max_value", "int", DEFAULT_MAX)
                .build(),
        }
    }
}

impl Default for RandomNumberTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RandomNumberTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let min = number_arg(&args, "min_value")?.map_or(DEFAULT_MIN, |v| v as i64);
        let max = number_arg(&args, "max_value")?.map_or(DEFAULT_MAX, |v| v as i64);
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let value = rand::thread_rng().gen_range(low..=high);
        Ok(value.to_string())
    }
}
