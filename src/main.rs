//! Wayfarer - Rust 旅行规划智能体
//!
//! 入口：初始化日志，加载配置与 [trip] 参数，流式运行规划并在终端渲染时间线，
//! 最后把方案写入 app.output_dir。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use wayfarer::config::load_config;
use wayfarer::timeline::TerminalRenderer;
use wayfarer::{drive_timeline, observability, plan_trip_stream, PlanStream, PlannerBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选参数：配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let trip = cfg.trip.clone();
    let seed = cfg.orchestrator.seed_message.clone();
    let preview_chars = cfg.research.sub_result_preview_chars;
    let output_dir = cfg.app.output_dir.clone();

    let components = Arc::new(PlannerBuilder::new(cfg).build());
    let PlanStream {
        events,
        cancel,
        outcome,
    } = plan_trip_stream(components, &trip, &seed).context("Invalid trip parameters")?;

    // Ctrl-C 放弃会话
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling session");
            cancel.cancel();
        }
    });

    let mut renderer = TerminalRenderer::stdout();
    let (timeline, _log) = drive_timeline(events, &mut renderer, preview_chars).await;
    let outcome = outcome
        .await
        .context("Planning task panicked")?
        .context("Planning failed")?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(&outcome.filename);
    std::fs::write(&path, &outcome.artifact)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        work_items = timeline.work_items().count(),
        "travel plan saved"
    );
    println!("\nSaved to {}", path.display());
    Ok(())
}
