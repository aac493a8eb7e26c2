//! Support Agent 命令行入口
//!
//! 从标准输入逐行读取用户消息，输出回复。用法：`support-agent [session_id] [config.toml]`。
//! 输入 `/trace` 打印上一轮的推理轨迹，`/quit` 退出。

use std::path::PathBuf;

use anyhow::Context;
use support_agent::{core::create_agent, observability, AgentResponse};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let session_id = args.next().unwrap_or_else(|| "cli".to_string());
    let config_path = args.next().map(PathBuf::from);

    let agent = create_agent(config_path).await.context("Failed to create agent")?;
    println!("Support agent ready (session: {}). Type /quit to exit.", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last: Option<AgentResponse> = None;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/trace" => {
                match &last {
                    Some(r) => println!("{}", r.scratchpad.render()),
                    None => println!("(no turn yet)"),
                }
                continue;
            }
            _ => {}
        }
        match agent.run(&session_id, input).await {
            Ok(response) => {
                println!("{}", response.reply.text());
                last = Some(response);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}
