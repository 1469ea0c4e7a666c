//! Pulse position-funding CLI entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_funding::api::{create_router, AppState};
use pulse_funding::chain::catalog::{chain_name, source_at, SOURCE_CATALOG};
use pulse_funding::chain::RpcChainReader;
use pulse_funding::config::Config;
use pulse_funding::funding::flow::FundingSession;
use pulse_funding::funding::plan::{FundingPlan, QuoteRequest};
use pulse_funding::funding::selector::cost_score;
use pulse_funding::funding::steps::{steps_for_plan, PositionStep};
use pulse_funding::market::{MarketTarget, Side};
use pulse_funding::metrics;
use pulse_funding::routing::LifiRouter;
use pulse_funding::signing::{address_from_private_key, LocalWallet, WalletSigner};
use pulse_funding::trading::{JsonFileTradeLog, SellRequest, Withdrawer};

/// Pay for prediction-market positions from any supported chain.
#[derive(Parser, Debug)]
#[command(name = "pulse-funding")]
#[command(about = "Cross-chain position funding for the Pulse prediction market")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Position arguments shared by `quote` and `open`.
#[derive(clap::Args, Debug, Clone)]
struct PositionArgs {
    /// Market contract address, or "placeholder".
    #[arg(long, value_parser = parse_market)]
    market: MarketTarget,

    /// Position side (yes/no).
    #[arg(long, default_value = "yes")]
    side: Side,

    /// Amount in settlement token units.
    #[arg(long)]
    amount: Decimal,

    /// Catalog index of the source; chosen automatically when omitted.
    #[arg(long)]
    source: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check configuration validity.
    CheckConfig,

    /// List the funding source catalog.
    Sources,

    /// Scan balances and show which source would be used.
    Scan {
        /// Wallet to scan; defaults to the configured wallet.
        #[arg(long)]
        owner: Option<Address>,

        /// Amount the position needs.
        #[arg(long, default_value = "0")]
        amount: Decimal,
    },

    /// Quote a funding plan without submitting anything.
    Quote(PositionArgs),

    /// Quote and execute a funding plan.
    Open(PositionArgs),

    /// Sell position tokens back to the market.
    Sell {
        /// Market contract address.
        #[arg(long, value_parser = parse_market)]
        market: MarketTarget,

        /// Position side (yes/no).
        #[arg(long)]
        side: Side,

        /// Shares to sell.
        #[arg(long)]
        amount: Decimal,
    },

    /// Serve the HTTP API.
    Serve {
        /// HTTP server port; defaults to PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn parse_market(raw: &str) -> Result<MarketTarget, String> {
    if raw.eq_ignore_ascii_case("placeholder") {
        return Ok(MarketTarget::placeholder("placeholder"));
    }
    raw.parse::<Address>()
        .map(MarketTarget::deployed)
        .map_err(|e| format!("invalid market address: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("pulse_funding=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    match args.command {
        Command::CheckConfig => cmd_check_config().await,
        Command::Sources => cmd_sources(),
        Command::Scan { owner, amount } => cmd_scan(owner, amount).await,
        Command::Quote(position) => cmd_quote(position).await,
        Command::Open(position) => cmd_open(position).await,
        Command::Sell { market, side, amount } => cmd_sell(market, side, amount).await,
        Command::Serve { port } => cmd_serve(port).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

fn local_wallet(config: &Config, reader: &RpcChainReader) -> anyhow::Result<Arc<LocalWallet>> {
    let key = config
        .wallet_private_key
        .as_deref()
        .ok_or_else(|| anyhow!("WALLET_PRIVATE_KEY is required for this command"))?;
    Ok(Arc::new(LocalWallet::new(key, reader.clone(), config.destination_chain_id)?))
}

fn session(config: &Config) -> anyhow::Result<FundingSession> {
    let reader = RpcChainReader::new(config)?;
    let wallet = local_wallet(config, &reader)?;
    let router = Arc::new(LifiRouter::new(config)?);
    let trade_log = Arc::new(JsonFileTradeLog::new(&config.trade_log_dir));
    Ok(FundingSession::from_config(config, wallet, Arc::new(reader), router, trade_log)?)
}

fn print_steps(steps: &[PositionStep]) {
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
        if let Some(link) = &step.tx_link {
            println!("     {}", link);
        }
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PULSE FUNDING - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow!("Configuration validation failed"));
        }
    }

    print!("Checking private key... ");
    match config.wallet_private_key.as_deref().map(address_from_private_key) {
        Some(Ok(addr)) => {
            println!("OK");
            println!("  Wallet address: {}", addr);
        }
        Some(Err(e)) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow!("Private key invalid"));
        }
        None => println!("NOT SET (read-only commands only)"),
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!(
        "  Destination: {} on {} ({})",
        config.settlement_symbol,
        chain_name(config.destination_chain_id),
        config.destination_chain_id
    );
    println!("  Settlement Token: {}", config.settlement_token);
    println!("  Routing API: {} (integrator {})", config.lifi_api_url, config.lifi_integrator);
    for (chain_id, url) in config.rpc_urls() {
        println!("  RPC {:>6}: {}", chain_id, url);
    }
    println!(
        "  Verification: {} attempts every {}ms",
        config.verify_max_attempts, config.verify_interval_ms
    );
    println!("  Trade Log: {}", config.trade_log_dir);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// List the catalog with cost scores.
fn cmd_sources() -> anyhow::Result<()> {
    let config = load_config()?;
    let destination = config.destination()?;

    println!("{:>3}  {:<24} {:>8}  {:<6} {}", "#", "SOURCE", "CHAIN", "SCORE", "TOKEN");
    for (i, source) in SOURCE_CATALOG.iter().enumerate() {
        println!(
            "{:>3}  {:<24} {:>8}  {:<6} {}",
            i,
            source.label,
            source.chain_id,
            cost_score(source, &destination),
            source.token_address
        );
    }
    Ok(())
}

/// Scan balances and print the selection.
async fn cmd_scan(owner: Option<Address>, amount: Decimal) -> anyhow::Result<()> {
    let config = load_config()?;
    let reader = RpcChainReader::new(&config)?;
    let owner = match owner {
        Some(owner) => owner,
        None => local_wallet(&config, &reader)?.address(),
    };

    info!(owner = %owner, amount = %amount, "Scanning balances");
    let entries = pulse_funding::funding::scanner::scan_balances(
        &reader,
        &SOURCE_CATALOG,
        owner,
        config.balance_query_timeout(),
    )
    .await;
    let selection = pulse_funding::funding::selector::select_source(
        &entries,
        amount,
        &SOURCE_CATALOG,
        &config.destination()?,
    );

    if selection.all_balances.is_empty() {
        println!("No balances found for {}", owner);
        return Ok(());
    }
    for entry in &selection.all_balances {
        let marker = if Some(entry.source_index) == selection.chosen_index() { "*" } else { " " };
        if let Some(source) = source_at(entry.source_index) {
            println!("{} {:>3}  {:<24} {}", marker, entry.source_index, source.label, entry.human_balance);
        }
    }
    Ok(())
}

async fn quote(session: &FundingSession, position: &PositionArgs) -> anyhow::Result<QuoteRequest> {
    let source_index = match position.source {
        Some(index) => index,
        None => session
            .find_source(position.amount)
            .await
            .chosen_index()
            .ok_or_else(|| anyhow!("No funding source with a balance was found"))?,
    };
    let source = source_at(source_index)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown source index {}", source_index))?;

    Ok(QuoteRequest {
        source,
        market: position.market.clone(),
        side: position.side,
        amount: position.amount,
        recipient: session.owner(),
    })
}

fn describe(plan: &FundingPlan, settlement_decimals: u8) {
    let settlement = plan.settlement();
    println!(
        "Plan: {} ({} {} via {})",
        plan.kind(),
        settlement.spent(settlement_decimals),
        settlement.side,
        settlement.market
    );
    if let FundingPlan::Routed(routed) = plan {
        println!("  Source: {}", routed.source.label);
        println!("  Route: {}", routed.itinerary.id);
        for leg in &routed.itinerary.legs {
            println!("    {} -> {} via {}", leg.from_chain_id, leg.to_chain_id, leg.tool);
        }
    }
    print_steps(&steps_for_plan(plan));
}

/// Quote without executing.
async fn cmd_quote(position: PositionArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let session = session(&config)?;
    let request = quote(&session, &position).await?;

    let mut flow = session.flow();
    let plan = flow.quote(request).await?;
    describe(plan, config.settlement_decimals);
    Ok(())
}

/// Quote, execute and verify.
async fn cmd_open(position: PositionArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let session = session(&config)?;
    let request = quote(&session, &position).await?;

    let mut flow = session.flow();
    describe(flow.quote(request).await?, config.settlement_decimals);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping verification");
                cancel.cancel();
            }
        })
    };

    let sink = |steps: &[PositionStep]| {
        if let Some(step) = steps
            .iter()
            .rev()
            .find(|s| s.status != pulse_funding::funding::StepStatus::Pending)
        {
            info!(step = %step, "Progress");
        }
    };
    let outcome = flow.execute(Some(Arc::new(sink)), &cancel).await;
    ctrl_c.abort();

    println!("----------------------------------------------------------------------");
    print_steps(&outcome.steps);
    match (&outcome.error, &outcome.verified) {
        (Some(e), _) => {
            error!(kind = %e.kind, class = %e.class, detail = %e.detail, "Position failed");
            println!("FAILED: {} (retry options: {:?})", e.message, e.actions());
            Err(anyhow!(e.message.clone()))
        }
        (None, Some(verified)) => {
            println!("SUCCESS: {}", verified.summary());
            Ok(())
        }
        (None, None) => {
            println!("SUCCESS: transaction {}", outcome.tx_hash.as_deref().unwrap_or("-"));
            Ok(())
        }
    }
}

/// Sell position tokens.
async fn cmd_sell(market: MarketTarget, side: Side, amount: Decimal) -> anyhow::Result<()> {
    let config = load_config()?;
    let reader = RpcChainReader::new(&config)?;
    let wallet = local_wallet(&config, &reader)?;
    let withdrawer = Withdrawer::new(
        wallet,
        Arc::new(reader),
        Arc::new(JsonFileTradeLog::new(&config.trade_log_dir)),
        config.destination()?,
    );

    let outcome = withdrawer
        .sell_position(&SellRequest { market, side, amount }, None)
        .await;
    print_steps(&outcome.steps);
    match outcome.error {
        Some(e) => Err(anyhow!("Sell failed: {}", e.message)),
        None => {
            println!("SOLD: {}", outcome.tx_hash.as_deref().unwrap_or("-"));
            Ok(())
        }
    }
}

/// Serve the HTTP API until interrupted.
async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config()?;
    let reader = Arc::new(RpcChainReader::new(&config)?);
    let handle = metrics::install_prometheus().context("Failed to install Prometheus recorder")?;

    let app_state = AppState::new(reader, config.destination()?, config.balance_query_timeout())
        .with_metrics(handle)
        .with_scan_debounce(config.scan_debounce());

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    app_state.set_ready(true);
    axum::serve(listener, create_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
