use clap::Parser;
use parlor_core::{ChatStore, ParlorConfig, SessionId};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use parlor_chat::{ChatPipeline, Dispatcher};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "parlor.toml")]
    config: String,

    /// Check the chat log and model artifacts, then exit
    #[arg(long)]
    health: bool,

    /// Print a stored session as JSON lines, then exit
    #[arg(long, value_name = "SESSION_ID")]
    transcript: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ParlorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; stdout belongs to the conversation
    let directive: Directive = config
        .service
        .log_level
        .parse()
        .unwrap_or_else(|_| tracing::Level::INFO.into());
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    if args.health {
        return run_health(&config).await;
    }

    if let Some(session_id) = args.transcript {
        return run_transcript(&config, SessionId(session_id)).await;
    }

    let (pipeline, dispatcher) = match ChatPipeline::bootstrap(&config).await {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Failed to open chat log {}: {}", config.database.path.display(), e);
            std::process::exit(1);
        }
    };

    run_chat(&pipeline, dispatcher, Duration::from_millis(config.service.poll_interval_ms)).await;

    pipeline
        .shutdown(Duration::from_secs(config.service.shutdown_grace_secs))
        .await;
    Ok(())
}

/// Line-based front-end: stdin lines in, drained tuples out on a fixed cadence.
async fn run_chat(pipeline: &ChatPipeline, mut dispatcher: Dispatcher, poll_interval: Duration) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for tuple in dispatcher.drain_all() {
                    println!("{tuple}\n");
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim() == "/quit" => break,
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = pipeline.submit_message(&line) {
                            tracing::warn!(error = %e, "Message rejected");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    // Flush whatever already arrived before shutting down.
    for tuple in dispatcher.drain_all() {
        println!("{tuple}\n");
    }
}

async fn run_health(config: &ParlorConfig) -> anyhow::Result<()> {
    let store = match ChatStore::open(&config.database.path).await {
        Ok(s) => s,
        Err(e) => {
            println!("❌ Chat log unavailable: {}", e);
            std::process::exit(1);
        }
    };

    match parlor_core::db::health_check(store.pool()).await {
        Ok(v) => println!("✅ SQLite connected: {}", v),
        Err(e) => {
            println!("❌ SQLite check failed: {}", e);
            std::process::exit(1);
        }
    }

    let counts = store.row_counts().await?;
    println!(
        "✅ Chat log {}: {} sessions, {} messages, {} responses",
        config.database.path.display(),
        counts.sessions,
        counts.user_messages,
        counts.bot_responses
    );

    let mut healthy = true;
    for path in [config.model.model_path(), config.model.tokenizer_path()] {
        if path.exists() {
            println!("✅ Model artifact present: {}", path.display());
        } else {
            println!("❌ Model artifact missing: {}", path.display());
            healthy = false;
        }
    }
    store.close().await;

    if !healthy {
        std::process::exit(1);
    }
    println!("✅ Parlor health check passed");
    Ok(())
}

async fn run_transcript(config: &ParlorConfig, session_id: SessionId) -> anyhow::Result<()> {
    let store = ChatStore::open(&config.database.path).await?;

    if store.session(session_id).await?.is_none() {
        eprintln!("Session {} not found", session_id);
        store.close().await;
        std::process::exit(1);
    }

    for entry in store.transcript(session_id).await? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    store.close().await;
    Ok(())
}
