use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use veracity::audit::AuditLog;
use veracity::cli::{Cli, Command};
use veracity::telemetry::{self, LogFormat};
use veracity::ui::{self, JobProgress};
use veracity::{Veracity, VeracityConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = VeracityConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }
    if cli.verbose {
        config.log_format = LogFormat::Pretty;
        config.log_level = "debug".to_string();
    }

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            telemetry::init(config.log_format, &config.log_level)?;
            serve(config).await
        }
        Command::Classify { text } => {
            if cli.verbose {
                telemetry::init(config.log_format, &config.log_level)?;
            }
            classify(config, &text).await
        }
        Command::Audit { limit } => audit(&config, limit),
    }
}

async fn serve(config: VeracityConfig) -> Result<()> {
    let app = Veracity::open(&config)?;
    let router = veracity::http::router(app.http_state());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    app.shutdown().await;
    Ok(())
}

async fn classify(config: VeracityConfig, text: &str) -> Result<()> {
    let app = Veracity::open(&config)?;
    let job_id = app.submissions().submit(text).await?;
    let progress = JobProgress::start(&job_id);

    let view = loop {
        let view = app.status().status(&job_id)?;
        if view.is_finished() {
            break view;
        }
        progress.processing();
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    progress.finish(&view);
    app.shutdown().await;
    Ok(())
}

fn audit(config: &VeracityConfig, limit: usize) -> Result<()> {
    let log = AuditLog::open_existing(&config.audit_db_path).with_context(|| {
        format!(
            "no audit log at {}; run `veracity serve` or `veracity classify` first",
            config.audit_db_path.display()
        )
    })?;
    let summary = log.summary()?;
    let records = log.recent(limit)?;
    ui::print_audit(&summary, &records);
    Ok(())
}
