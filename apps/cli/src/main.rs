use anyhow::Result;
use clap::{Parser, Subcommand};

use sagegreen_core_sdk::models::ChatQuery;
use sagegreen_core_sdk::orchestrator::Orchestrator;
use sagegreen_core_sdk::{server, telemetry};

/**
 * \brief CLI 程序入口。
 */
#[derive(Parser, Debug)]
#[command(name = "sagegreen", version, about = "SageGreen intelligence assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 发送一条查询并打印回答与来源。
     */
    Ask {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        session: Option<String>,
        /** \brief 固定使用指定 Provider（按名称） */
        #[arg(long)]
        provider: Option<String>,
    },

    /**
     * \brief 启动 HTTP 服务并提供静态聊天页。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },

    /**
     * \brief 打印当前配置的 Provider 调用链（凭据脱敏）。
     */
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_from_env();

    match cli.command {
        Commands::Ask {
            prompt,
            session,
            provider,
        } => {
            let orchestrator = Orchestrator::from_env();
            let session_id = session.unwrap_or_else(|| "cli-session".to_string());

            telemetry::log_event(
                "cli.ask",
                &format!("session={} prompt_len={}", session_id, prompt.len()),
            );

            let mut query = ChatQuery::new(prompt, session_id);
            query.force_provider = provider;

            let answer = orchestrator.answer(&query).await;
            println!("{}", answer.response);
            match answer.model {
                Some(model) => println!("[source: {} | model: {}]", answer.source, model),
                None => println!("[source: {}]", answer.source),
            }
        }
        Commands::Providers => {
            let orchestrator = Orchestrator::from_env();
            if orchestrator.chain().is_empty() {
                println!("No providers configured; every query resolves via the canned fallback.");
            }
            for (idx, provider) in orchestrator.chain().iter().enumerate() {
                println!(
                    "{}. {} [{}] {}",
                    idx + 1,
                    provider.name,
                    provider.kind.label(),
                    provider.redacted_endpoint()
                );
            }
        }
        Commands::Serve { addr } => {
            server::run(&addr).await?;
        }
    }

    Ok(())
}
