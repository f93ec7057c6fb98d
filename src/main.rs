//! EMIS Agent 命令行对话
//!
//! 入口：初始化日志与配置，构建 AgentService，逐行读取用户输入；每行开启一个新会话。
//! 遇到 human_input_needed 时就地询问答案并 resume；输入 exit / quit 退出。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use emis_agent::config::load_config;
use emis_agent::core::{AgentBuilder, AgentService, Invocation};
use emis_agent::AgentEvent;

type StdinLines = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut StdinLines, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

/// 打印一次调用的事件；挂起时返回待回答的问题
async fn render(invocation: Invocation) -> anyhow::Result<Option<String>> {
    let mut events = invocation.events;
    let mut in_response = false;
    while let Some(event) = events.next().await {
        match event {
            AgentEvent::Thinking(text) => println!("{text}"),
            AgentEvent::ClearThinking => {}
            AgentEvent::ToolCall(tool) => println!("🔧 Executing: {tool}"),
            AgentEvent::Response(chunk) => {
                if !in_response {
                    print!("🤖 Agent: ");
                    in_response = true;
                }
                print!("{chunk}");
                std::io::stdout().flush()?;
            }
            AgentEvent::Completed => {
                println!();
                println!("✅ Task completed!\n");
                in_response = false;
            }
            AgentEvent::HumanInputNeeded(query) => {
                println!("\n🤖 Agent: {query}");
                return Ok(Some(query));
            }
            AgentEvent::Error(msg) => println!("\n❌ Error: {msg}\nPlease try again.\n"),
            AgentEvent::End => {
                if in_response {
                    println!();
                }
            }
        }
    }
    Ok(None)
}

async fn run_task(
    service: &Arc<AgentService>,
    lines: &mut StdinLines,
    input: &str,
) -> anyhow::Result<()> {
    let invocation = service.start(input, None).await?;
    let session_id = invocation.session_id.clone();
    let mut pending = render(invocation).await?;
    while pending.is_some() {
        let Some(answer) = prompt(lines, "👤 Your response: ").await? else {
            return Ok(());
        };
        let invocation = service.resume(&session_id, answer.trim()).await?;
        pending = render(invocation).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emis_agent::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let service = Arc::new(
        AgentBuilder::new(cfg)
            .build()
            .await
            .context("Failed to create agent")?,
    );

    println!("🤖 Autonomous EMIS Agent - I'll handle multi-step tasks automatically!");
    println!("📋 Available tools: {}", service.tool_names().join(", "));
    println!("💡 Just tell me what you want to accomplish! (exit / quit to leave)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = prompt(&mut lines, "👤 You: ").await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if let Err(e) = run_task(&service, &mut lines, input).await {
            println!("❌ Error: {e}\nPlease try again.\n");
        }
    }
    println!("👋 Goodbye!");
    Ok(())
}
