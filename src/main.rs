use std::process::ExitCode;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use drip_outreach::config::{AppConfig, Env, LogConfig};
use drip_outreach::error::{Error, Result};
use drip_outreach::runner::{CONFIG_EXIT_CODE, DripRunner, RunClass};

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let env = Env::from_process();
    let _log_guard = init_tracing(&LogConfig::from_env(&env));

    let (config, runner) = match setup(&env) {
        Ok(ready) => ready,
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(e, Error::Config(_)) {
                eprintln!("  Required: SMTP_EMAIL, SMTP_PASSWORD, GH_TOKEN, GITHUB_REPO and the LLM API key");
            }
            return ExitCode::from(CONFIG_EXIT_CODE);
        }
    };

    eprintln!("📬 Drip Outreach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Store: {}", config.store.csv_path.display());
    eprintln!("   Sync:  {}@{}", config.sync.repo, config.sync.branch);
    if runner.daily_limit() > 0 {
        eprintln!("   Daily cap: {}", runner.daily_limit());
    }

    // ── Run ─────────────────────────────────────────────────────────────
    let outcome = runner.run(&config.store.csv_path).await;
    let class = outcome.classification();

    match class {
        RunClass::Escalated => {
            eprintln!();
            eprintln!("🚨🚨🚨 ESCALATED FAILURE 🚨🚨🚨");
            eprintln!("   {}", outcome.summary());
            eprintln!("   The email WAS sent but the store was NOT updated.");
            eprintln!(
                "   Mark the lead as sent in {} before the next run.",
                config.store.csv_path.display()
            );
        }
        RunClass::Failed => eprintln!("❌ {}", outcome.summary()),
        RunClass::NoOp | RunClass::Success => eprintln!("✅ {}", outcome.summary()),
    }
    if !outcome.token_budgets.is_empty() {
        eprintln!(
            "   Generation: {} attempt(s), budgets {:?}",
            outcome.generation_attempts, outcome.token_budgets
        );
    }

    ExitCode::from(class.exit_code())
}

/// Load configuration and build the runner before anything touches the network.
fn setup(env: &Env) -> Result<(AppConfig, DripRunner)> {
    let config = AppConfig::from_env(env)?;
    let runner = DripRunner::from_config(&config)?;
    Ok((config, runner))
}

/// Stderr logging plus, when configured, a daily-rolling file.
fn init_tracing(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match &log.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "drip-outreach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    guard
}
