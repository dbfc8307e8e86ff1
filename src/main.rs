use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use nordsvcp_relay::channels::{ImapMailbox, SftpTransfer, SmtpNotifier};
use nordsvcp_relay::config::RelayConfig;
use nordsvcp_relay::pipeline::types::SystemClock;
use nordsvcp_relay::pipeline::{WorkflowCoordinator, WorkflowDeps};
use nordsvcp_relay::store::FsArtifactStore;

/// Exit code when the batch ran but some messages failed.
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let _log_guard = init_tracing(config.log_dir.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        imap = %config.mailbox.host,
        smtp = %config.smtp.host,
        sftp = %config.sftp.host,
        reviewers = config.workflow.recipients.len(),
        "NORDSVCP relay starting"
    );

    let notifier = SmtpNotifier::new(&config.smtp).context("invalid SMTP settings")?;
    let mailbox = Arc::new(
        ImapMailbox::open(&config.mailbox)
            .await
            .context("mailbox unavailable")?,
    );

    let deps = WorkflowDeps {
        mailbox: mailbox.clone(),
        store: Arc::new(FsArtifactStore::new(config.workflow.artifact_dir.clone())),
        notifier: Arc::new(notifier),
        transfer: Arc::new(SftpTransfer::new(config.sftp.clone())),
        clock: Arc::new(SystemClock),
    };

    let coordinator = WorkflowCoordinator::new(&config.workflow, deps);
    let result = coordinator.run_batch().await;
    mailbox.close().await;
    let summary = result.context("batch aborted")?;

    info!(summary = %serde_json::to_string(&summary)?, "Batch summary");

    if summary.has_failures() {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nordsvcp-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}
