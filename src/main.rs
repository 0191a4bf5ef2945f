//! Arbor CLI
//!
//! 用法: arbor "你的问题"
//! 对单个问题执行一次树搜索，过程事件打印到终端，Ctrl-C 协作取消。
//! RUST_LOG=debug 可查看选择/扩展细节。

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use arbor::config::load_config;
use arbor::core::EngineError;
use arbor::llm::create_llm;
use arbor::mcts::{search_loop, EngineEvent, SearchSession};
use arbor::tools::{create_provider, ToolInvoker};

#[tokio::main]
async fn main() -> Result<()> {
    arbor::observability::init();

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("usage: arbor \"<question>\"");
    }

    let cfg = load_config(None).map_err(|e| EngineError::ConfigError(e.to_string()))?;
    let llm = create_llm(&cfg.llm);
    let provider = create_provider(&cfg.search);
    let invoker = Arc::new(ToolInvoker::new(
        provider,
        cfg.search.timeout_secs,
        cfg.search.max_results,
        cfg.search.cache_ttl_secs,
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, cancelling search");
                cancel.cancel();
            }
        });
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match ev {
                EngineEvent::Token { text, .. } => {
                    print!("{}", text);
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                }
                EngineEvent::NodeEnter { depth, .. } => {
                    if depth > 0 {
                        println!("\n--- candidate (depth {}) ---", depth);
                    }
                }
                EngineEvent::ToolIo {
                    query,
                    provider,
                    result_count,
                } => {
                    println!("\n[search via {}: \"{}\" -> {} hits]", provider, query, result_count);
                }
                EngineEvent::Score { value, .. } => {
                    println!("\n[score {:.2}]", value);
                }
                EngineEvent::Error { text } => {
                    eprintln!("\n[warn] {}", text);
                }
                _ => {}
            }
        }
    });

    let session = SearchSession::new(llm.clone(), invoker, &cfg)
        .with_event_tx(tx)
        .with_cancel(cancel);

    let outcome = search_loop(&session, &query).await?;
    // 发送端随会话释放，打印任务才会收到通道关闭而退出
    drop(session);
    let _ = printer.await;

    println!("\n==============================");
    if outcome.low_confidence {
        println!("(no confirmed terminal answer; best-scored node follows)");
    }
    println!("{}", outcome.final_answer);
    println!("==============================");
    println!("laps: {}, tree size: {}", outcome.laps, outcome.tree.len());

    let (prompt, completion, total) = llm.token_usage();
    if total > 0 {
        println!("tokens: prompt {} / completion {} / total {}", prompt, completion, total);
    }

    Ok(())
}
