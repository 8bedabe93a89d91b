//! ARIty CLI Application

use anyhow::{Context, Result};
use arity_core::prelude::*;
use arity_core::simulator::{events, SimulatedSwitch, SwitchRequest};
use arity_core::{CallerId, ChannelSnapshot};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Application name to subscribe as
    #[arg(short, long, env = "ARITY_APP")]
    app: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "ARITY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted inbound call against the simulated switch
    Demo {
        /// Sound played to the caller
        #[arg(long, default_value = "hello-world")]
        sound: String,

        /// Number of times the sound is played
        #[arg(long, default_value_t = 2)]
        repeat: u32,

        /// Endpoint dialed once the greeting is done
        #[arg(long, default_value = "PJSIP/200")]
        endpoint: String,

        /// Caller number of the inbound call (random if omitted)
        #[arg(long)]
        caller: Option<String>,

        /// How long the callee stays on the line, in milliseconds
        #[arg(long, default_value_t = 250)]
        talk_ms: u64,
    },

    /// Show the effective configuration and available commands
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("arity=info,arity_core=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ArityConfig::default(),
    };
    if let Some(app) = cli.app {
        config.app_name = app;
    }

    match cli.command {
        Commands::Demo {
            sound,
            repeat,
            endpoint,
            caller,
            talk_ms,
        } => {
            let caller = caller.unwrap_or_else(generate_caller_number);
            handle_demo(config, sound, repeat, endpoint, caller, talk_ms).await?;
        }
        Commands::Status => {
            handle_status(&config)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ArityConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Answer, greet, connect the caller to `endpoint`, then hang up
async fn run_script(
    call: &CallController,
    sound: &str,
    repeat: u32,
    endpoint: &str,
) -> Result<DialReport, ArityError> {
    call.answer().await?;
    println!("✅ Answered {} from {}", call.channel_id(), call.caller_number());

    let greeting = call.play(sound).with_repeat(repeat).run().await?;
    println!("🔊 Played {} {} time(s)", sound, greeting.value().played);

    let dial = call.dial(endpoint).with_caller_id(call.caller_number());
    println!("📞 Dialing {} as {}", endpoint, dial.callee_channel_id());
    let report = dial.run().await?.into_inner();
    Ok(report)
}

async fn handle_demo(
    config: ArityConfig,
    sound: String,
    repeat: u32,
    endpoint: String,
    caller: String,
    talk_ms: u64,
) -> Result<()> {
    println!("🧪 Running demo call as app '{}'", config.app_name);

    let switch = Arc::new(SimulatedSwitch::new().with_auto_complete());
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let arity = Arity::builder(switch.clone())
        .with_config(config)
        .on_transport_failure(|err| tracing::warn!(error = %err, "Event stream failure"))
        .with_handler(move || {
            let done = done_tx.clone();
            let sound = sound.clone();
            let endpoint = endpoint.clone();
            handler_fn(move |call: CallController| async move {
                let result = run_script(&call, &sound, repeat, &endpoint).await;
                let result = call.end_call(result).await;
                let _ = done.send(result);
                Ok(())
            })
        })
        .connect()
        .await?;
    println!("✅ Connected to simulated switch");

    let inbound = ChannelSnapshot {
        name: format!("PJSIP/trunk-{caller}"),
        state: "Ring".to_string(),
        caller: CallerId {
            name: "Demo Caller".to_string(),
            number: caller,
        },
        ..ChannelSnapshot::with_id(arity_core::new_id())
    };
    println!("📞 Incoming call {}", inbound.id);
    switch.emit(events::start_with(inbound, Vec::new()));

    let callee = match switch.wait_for("dial").await {
        SwitchRequest::Dial { channel_id, .. } => channel_id,
        other => anyhow::bail!("unexpected request {other:?}"),
    };
    tokio::time::sleep(Duration::from_millis(talk_ms)).await;
    println!("📴 Callee {} hangs up", callee);
    switch.emit(events::hangup(&callee));

    let result = tokio::time::timeout(Duration::from_secs(10), done_rx.recv())
        .await
        .context("demo call did not finish")?
        .context("call handler went away")?;
    let report = result?;

    println!();
    println!("📊 Dial report");
    println!("   Status:   {:?} ({})", report.dial_status, report.raw_status);
    println!("   Ended by: {:?}", report.ended_by);
    if let (Some(call), Some(media)) = (report.call_duration, report.media_duration) {
        println!("   Call:     {} ms", call.as_millis());
        println!("   Media:    {} ms", media.as_millis());
    }

    println!();
    println!("📜 Requests seen by the switch:");
    for request in switch.requests() {
        println!("   {:<28} {:?}", request.name(), request);
    }

    arity.shutdown();
    Ok(())
}

fn handle_status(config: &ArityConfig) -> Result<()> {
    println!("📊 ARIty CLI Status");
    println!("===================");
    println!("Effective configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("Available commands:");
    println!("  arity demo [options]  - Run a scripted call on the simulated switch");
    println!("  arity status          - Show this status");
    println!();
    println!("Use 'arity --help' for detailed options");

    Ok(())
}

fn generate_caller_number() -> String {
    let mut rng = rand::thread_rng();
    format!("555{:04}", rng.gen_range(0..10_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_numbers_look_like_numbers() {
        let number = generate_caller_number();
        assert_eq!(number.len(), 7);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn cli_parses_demo_options() {
        let cli = Cli::parse_from(["arity", "--app", "ivr", "demo", "--repeat", "3"]);
        assert_eq!(cli.app.as_deref(), Some("ivr"));
        match cli.command {
            Commands::Demo { repeat, sound, .. } => {
                assert_eq!(repeat, 3);
                assert_eq!(sound, "hello-world");
            }
            Commands::Status => panic!("expected demo"),
        }
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("arity-cli-{}", arity_core::new_id()));
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"app_name":"ivr","dial_timeout_secs":30}"#).ok();

        let config = load_config(&path).ok();
        std::fs::remove_dir_all(&dir).ok();

        let config = config.unwrap_or_default();
        assert_eq!(config.app_name, "ivr");
        assert_eq!(config.dial_timeout_secs, 30);
        assert_eq!(config.default_language, "en");
    }
}
