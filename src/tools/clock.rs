//! 当前时间工具

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolDefinition, ToolSchemaBuilder};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// get_current_time()：本地时间
pub struct CurrentTimeTool {
    def: ToolDefinition,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            def: ToolSchemaBuilder::new("get_current_time")
                .doc("获取当前的日期和时间\n\n返回:\n    当前时间的字符串表示")
                .build(),
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, _args: Map<String, Value>) -> Result<String, String> {
        Ok(Local::now().format(TIME_FORMAT).to_string())
    }
}
