// ============================================================================
// token-gate - CLI front end for the token gate
// ============================================================================
// Usage:
//   token-gate check --wallet <PUBKEY>                   Print a balance snapshot
//   token-gate connect --keypair <PATH> [--accept-restricted]
//                                                        Full access attempt
//   token-gate trial                                     Unauthenticated entry
//   token-gate config                                    Print effective config
// ============================================================================

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use gate_core::access::ControlState;
use gate_core::{
    AccessGate, BalanceAggregator, DisplaySurface, GateConfig, GateContext, KeypairWallet,
    RpcLedger, StaticDiscovery, WalletAdapter, WalletProvider,
};
use std::sync::Arc;
use tracing::info;

/// Token gate command line
#[derive(Parser)]
#[command(name = "token-gate", version, about = "Check token holdings and run gate access attempts")]
struct Cli {
    /// JSON config file (default: GATE_* environment, .env supported)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the balance snapshot for a wallet as JSON
    Check {
        /// Wallet public key
        #[arg(long)]
        wallet: String,
    },

    /// Connect a keypair wallet, verify its balance and enter
    Connect {
        /// Keypair file (solana-keygen JSON format)
        #[arg(long)]
        keypair: String,

        /// Accept restricted access when the balance is below the minimum
        #[arg(long)]
        accept_restricted: bool,

        /// Print every gate event as a JSON line
        #[arg(long)]
        events: bool,
    },

    /// Enter without a wallet
    Trial,

    /// Print the effective configuration
    Config,
}

/// Terminal rendering of the gate display
struct ConsoleDisplay {
    accept_restricted: bool,
}

/// Drop banner markup for terminal output
fn plain_text(message: &str) -> String {
    message
        .replace("<br>", "\n  ")
        .replace("<small>", "")
        .replace("</small>", "")
}

impl DisplaySurface for ConsoleDisplay {
    fn set_status(&self, message: &str) {
        println!("» {}", message);
    }

    fn show_error(&self, message: Option<&str>) {
        if let Some(message) = message {
            eprintln!("✗ {}", plain_text(message));
        }
    }

    fn set_loading(&self, _loading: bool) {}

    fn set_controls(&self, controls: ControlState) {
        tracing::debug!("Controls: {:?}", controls);
    }

    fn set_network_label(&self, label: &str) {
        println!("Network: {}", label);
    }

    fn confirm_reduced_entry(&self, message: &str) -> bool {
        println!("! {}", plain_text(message));
        if self.accept_restricted {
            println!("  Continuing with restricted access (--accept-restricted)");
        } else {
            println!("  Not continuing. Pass --accept-restricted to enter anyway.");
        }
        self.accept_restricted
    }
}

fn load_config(path: Option<&str>) -> Result<GateConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow!("Failed to read config {}: {}", path, e))?;
            GateConfig::from_json(&contents)
        }
        None => Ok(GateConfig::from_env()),
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("token_gate=info".parse()?)
                .add_directive("gate_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { wallet } => cmd_check(config, &wallet).await,
        Commands::Connect {
            keypair,
            accept_restricted,
            events,
        } => cmd_connect(config, &keypair, accept_restricted, events).await,
        Commands::Trial => cmd_trial(config),
        Commands::Config => cmd_config(&config),
    }
}

async fn cmd_check(config: GateConfig, wallet: &str) -> Result<()> {
    config.validate()?;

    let ledger = Arc::new(RpcLedger::from_config(&config));
    let aggregator = BalanceAggregator::new(GateContext::new(config), ledger);
    let snapshot = aggregator.snapshot(wallet).await;

    eprintln!(
        "{} holds {} (minimum {}) as of {}",
        snapshot.identity,
        snapshot.decimal_value,
        snapshot.threshold,
        format_timestamp(snapshot.timestamp)
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn build_gate(
    ctx: GateContext,
    providers: Vec<Arc<dyn WalletProvider>>,
    accept_restricted: bool,
) -> AccessGate {
    let ledger = Arc::new(RpcLedger::from_config(&ctx.config));
    let wallets = WalletAdapter::new(
        Arc::new(StaticDiscovery::new(providers)),
        ctx.config.recognized_wallets.clone(),
    );

    AccessGate::new(
        ctx,
        wallets,
        ledger,
        Arc::new(ConsoleDisplay { accept_restricted }),
        Box::new(|grant| info!("Entry granted: {} {:?}", grant.tier, grant.identity)),
    )
}

async fn cmd_connect(
    config: GateConfig,
    keypair: &str,
    accept_restricted: bool,
    events: bool,
) -> Result<()> {
    let wallet: Arc<dyn WalletProvider> = Arc::new(KeypairWallet::from_file(keypair)?);
    let ctx = GateContext::new(config);

    if events {
        let _ = ctx.bus.subscribe_all(|event| match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Unserializable event {:?}: {}", event.topic(), e),
        });
    }

    let gate = build_gate(ctx, vec![wallet], accept_restricted);
    gate.initialize();

    let tier = gate.connect().await?;
    println!("Access tier: {}", tier);

    if tier.grants_entry() {
        let grant = gate.enter()?;
        println!("{}", serde_json::to_string_pretty(&grant)?);
    }

    let session = gate.session();
    if let Some(balance) = &session.balance {
        println!(
            "Balance: {} across {} account(s)",
            balance.decimal_value, balance.accounts_found
        );
    }
    println!(
        "Session credential: {}",
        if session.credential.is_some() { "issued" } else { "none" }
    );
    Ok(())
}

fn cmd_trial(config: GateConfig) -> Result<()> {
    let gate = build_gate(GateContext::new(config), Vec::new(), false);
    gate.initialize();

    let grant = gate.enter_trial()?;
    println!("{}", serde_json::to_string_pretty(&grant)?);
    Ok(())
}

fn cmd_config(config: &GateConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if let Err(e) = config.validate() {
        eprintln!("Warning: {}", e);
    }
    Ok(())
}
