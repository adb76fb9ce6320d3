//! 工具层：Schema 构建、注册表与分组、执行器，以及内置工具

pub mod calculate;
pub mod clock;
pub mod delegate;
pub mod executor;
pub mod random;
pub mod registry;
pub mod schema;

pub use calculate::CalculateTool;
pub use clock::CurrentTimeTool;
pub use delegate::{DelegateTool, DELEGATE_TOOL_NAME};
pub use executor::{parse_arguments, ToolExecutor};
pub use random::RandomNumberTool;
pub use registry::{Tool, ToolGroups, ToolRegistry};
pub use schema::{ParamSpec, ParamType, ToolDefinition, ToolSchemaBuilder, NO_DESCRIPTION};

/// 注册不依赖其他组件的内置工具（delegate_task 需要委派器，由组合根单独注册）
pub fn register_builtin(registry: &mut ToolRegistry) {
    registry.register(RandomNumberTool::new());
    registry.register(CurrentTimeTool::new());
    registry.register(CalculateTool::new());
}
