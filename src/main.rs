//! Hive 命令行入口
//!
//! `hive [prompt...]`：加载配置、初始化日志、装配 Agent，流式运行一次主任务并打印结果。

use anyhow::Context;
use hive::{config::load_config, core::ConsoleSink, observability, AgentBuilder, RunOutcome};

const DEFAULT_PROMPT: &str = "帮我生成一个 1 到 100 之间的随机数，再把它乘以 3";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let prompt = if args.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        args.join(" ")
    };

    let config_path = std::env::var("HIVE_CONFIG").ok().map(Into::into);
    let config = load_config(config_path).context("Failed to load config")?;
    let runtime = AgentBuilder::new(config)
        .build()
        .context("Failed to assemble agent")?;

    println!("[user]\n{prompt}\n");
    let mut sink = ConsoleSink::stdout();
    let report = runtime.run(&prompt, &mut sink).await;

    match report.outcome {
        // 回复已由 ConsoleSink 打印
        RunOutcome::Success(_) => {}
        RunOutcome::Exhausted { iterations } => {
            println!("[exhausted] no final answer after {iterations} turns");
        }
        RunOutcome::Failure(e) => {
            println!("[no result] {e}");
        }
    }
    Ok(())
}
