//! Futures Desk - Main Entry Point
//!
//! Serves the dashboard API by default; the subcommands run the same batch
//! operations from the terminal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_desk::api::{self, AppState};
use futures_desk::config::Config;
use futures_desk::exchange::{
    BinanceClient, CoinGeckoClient, FuturesExchange, MarketCapSource, MockExchange, PositionSide,
};
use futures_desk::trading::{
    parse_side, BatchExecutor, BatchOutcome, CloseFilter, MarketRanker, PositionReader,
    RankingItem, SymbolResult,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Paper trading market data refresh interval.
const PAPER_REFRESH_SECS: u64 = 30;

/// Futures Desk CLI
#[derive(Parser)]
#[command(name = "futures-desk")]
#[command(version, about = "Batch open and close Binance USDT-M futures positions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,

    /// Print market cap, gainer and loser rankings
    Rankings {
        /// Entries per list (default: trading.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Rank by volume without fetching market caps
        #[arg(long)]
        skip_market_cap: bool,
    },

    /// Open positions on every listed symbol
    Trade {
        /// LONG or SHORT
        #[arg(short, long, value_parser = parse_side)]
        side: PositionSide,

        /// Symbols such as BTCUSDT or BTC/USDT:USDT
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Add one configured-size order to existing positions
    AddMargin {
        /// LONG or SHORT
        #[arg(short, long, value_parser = parse_side)]
        side: PositionSide,

        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Close open positions
    Close {
        /// LONG, SHORT or ALL
        #[arg(short = 't', long = "type", default_value = "ALL")]
        close_type: CloseFilter,

        /// Only close these symbols
        symbols: Vec<String>,
    },

    /// Show open positions with their TP/SL triggers
    Positions,
}

/// Trading mode: Live (real orders) or Paper (simulated exchange).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    let trading_mode = if std::env::var("PAPER_TRADING").unwrap_or_default() == "true" {
        info!("📝 PAPER TRADING MODE - Orders are simulated");
        TradingMode::Paper
    } else {
        warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
        TradingMode::Live
    };

    let (exchange, has_credentials) = build_exchange(&config, trading_mode).await?;
    let market_caps: Arc<dyn MarketCapSource> = Arc::new(CoinGeckoClient::new(&config.market)?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("╔════════════════════════════════════════════════════════════╗");
            info!(
                "║              Futures Desk v{} - Dashboard API            ║",
                env!("CARGO_PKG_VERSION")
            );
            info!("╚════════════════════════════════════════════════════════════╝");
            log_config(&config, has_credentials);

            let state = AppState::new(exchange, market_caps, config, has_credentials);
            api::serve(state).await
        }
        Commands::Rankings {
            limit,
            skip_market_cap,
        } => {
            let limit = limit.unwrap_or(config.trading.default_limit);
            let rankings = MarketRanker::new(exchange, market_caps)
                .rankings(limit, skip_market_cap)
                .await?;

            print_ranking("🏆 Top Market Cap", &rankings.top_market);
            print_ranking("📈 Top Gainers", &rankings.top_gainers);
            print_ranking("📉 Top Losers", &rankings.top_losers);
            Ok(())
        }
        Commands::Trade { side, symbols } => {
            require_credentials(has_credentials)?;
            let executor = BatchExecutor::new(exchange, config.trading.clone());

            let mut results = Vec::new();
            for (i, chunk) in symbols.chunks(config.batch.trade_batch_size).enumerate() {
                info!("📦 Trade batch {} ({} symbols)", i + 1, chunk.len());
                results.extend(executor.open_batch(chunk, side).await?);
            }
            print_results(&format!("Open {}", side), &results);
            Ok(())
        }
        Commands::AddMargin { side, symbols } => {
            require_credentials(has_credentials)?;
            let executor = BatchExecutor::new(exchange, config.trading.clone());

            let mut results = Vec::new();
            for (i, chunk) in symbols.chunks(config.batch.trade_batch_size).enumerate() {
                info!("📦 Add margin batch {} ({} symbols)", i + 1, chunk.len());
                results.extend(executor.add_margin(chunk, side).await?);
            }
            print_results(&format!("Add margin {}", side), &results);
            Ok(())
        }
        Commands::Close {
            close_type,
            symbols,
        } => {
            require_credentials(has_credentials)?;
            let executor = BatchExecutor::new(exchange, config.trading.clone());

            let results = if symbols.is_empty() {
                executor.close_positions(close_type, None).await?
            } else {
                let mut results = Vec::new();
                for (i, chunk) in symbols.chunks(config.batch.close_batch_size).enumerate() {
                    info!("📦 Close batch {} ({} symbols)", i + 1, chunk.len());
                    results.extend(executor.close_positions(close_type, Some(chunk)).await?);
                }
                results
            };
            print_results(&format!("Close {:?}", close_type), &results);
            Ok(())
        }
        Commands::Positions => {
            require_credentials(has_credentials)?;
            show_positions(exchange).await
        }
    }
}

/// Live client, or a simulated exchange seeded from live public data.
async fn build_exchange(
    config: &Config,
    mode: TradingMode,
) -> Result<(Arc<dyn FuturesExchange>, bool)> {
    let client = Arc::new(BinanceClient::new(&config.binance)?);

    match mode {
        TradingMode::Live => {
            let has_credentials = client.has_credentials();
            match config.binance.credentials() {
                Some(credentials) => info!("🔑 Using API key {:?}", credentials),
                None => warn!("⚠️  No API keys configured. Only market data is available."),
            }
            let exchange: Arc<dyn FuturesExchange> = client;
            Ok((exchange, has_credentials))
        }
        TradingMode::Paper => {
            let mock = Arc::new(MockExchange::new(dec!(10000))); // $10k paper balance
            mock.seed_from(client.as_ref()).await?;

            let refresh = mock.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(PAPER_REFRESH_SECS));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    match client.tickers_24h().await {
                        Ok(tickers) => refresh.update_tickers(tickers).await,
                        Err(e) => warn!("Failed to refresh paper market data: {}", e),
                    }
                }
            });

            let exchange: Arc<dyn FuturesExchange> = mock;
            Ok((exchange, true))
        }
    }
}

fn require_credentials(has_credentials: bool) -> Result<()> {
    anyhow::ensure!(
        has_credentials,
        "No API credentials configured (set DESK__BINANCE__API_KEY and DESK__BINANCE__SECRET_KEY)"
    );
    Ok(())
}

/// Initialize logging to stdout and an hourly rolled file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "futures-desk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("futures_desk=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config, has_credentials: bool) {
    let trading = &config.trading;
    info!("📋 Configuration:");
    info!("   LONG:  {} USDT x {}x", trading.long_margin, trading.long_leverage);
    info!("   SHORT: {} USDT x {}x", trading.short_margin, trading.short_leverage);
    match trading.take_profit_percent() {
        Some(tp) => info!("   Take Profit: {}% of margin", tp),
        None => info!("   Take Profit: off"),
    }
    match trading.stop_loss_percent() {
        Some(sl) => info!("   Stop Loss: {}% of margin", sl),
        None => info!("   Stop Loss: off"),
    }
    info!(
        "   Balance Cap: {}% of available USDT",
        trading.max_balance_fraction * dec!(100)
    );
    if !trading.ignored_symbols.trim().is_empty() {
        info!("   Ignored: {}", trading.ignored_symbols.trim());
    }
    info!("   Server IP: {}", config.server.server_ip);
    info!(
        "   Credentials: {}",
        if has_credentials { "configured" } else { "missing" }
    );
}

fn print_ranking(title: &str, items: &[RankingItem]) {
    println!("\n{}", title);
    for (i, item) in items.iter().enumerate() {
        println!(
            "   {:>3}. {:<16} {:>14} {:>+8.2}%  vol {:>9}  cap {:>10}",
            i + 1,
            item.symbol,
            item.price,
            item.change,
            item.volume_formatted,
            item.market_cap_formatted
        );
    }
}

fn print_results(title: &str, results: &[SymbolResult]) {
    let succeeded = results.iter().filter(|r| r.is_success()).count();

    println!("\n📊 {} ({}/{} succeeded)", title, succeeded, results.len());
    for result in results {
        match &result.outcome {
            BatchOutcome::Success { order_id, message } => println!(
                "   ✅ {:<16} order {}{}",
                result.symbol,
                order_id,
                message
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            ),
            BatchOutcome::Closed => println!("   ✅ {:<16} closed", result.symbol),
            BatchOutcome::Skipped { message } => {
                println!("   ⏭️  {:<16} {}", result.symbol, message)
            }
            BatchOutcome::Failed { message } => {
                println!("   ❌ {:<16} {}", result.symbol, message)
            }
        }
    }
}

async fn show_positions(exchange: Arc<dyn FuturesExchange>) -> Result<()> {
    let snapshot = match PositionReader::new(exchange).snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to read positions: {:#}", e);
            return Err(e);
        }
    };

    println!("\n💰 Wallet Balance: ${:.2}", snapshot.wallet_balance);
    if snapshot.positions.is_empty() {
        println!("\n   No open positions.");
        return Ok(());
    }

    println!("\n🔓 Open Positions");
    for p in &snapshot.positions {
        println!("   ┌─ {} {}", p.symbol, p.side);
        println!("   ├─ Size:     {} @ {} (mark {})", p.size, p.entry_price, p.mark_price);
        println!("   ├─ Notional: ${:.2} ({:.1}x, margin ${:.2})", p.position_notional, p.leverage, p.margin);
        println!("   ├─ PnL:      ${:.4}", p.pnl);
        println!(
            "   └─ TP / SL:  {} / {}",
            p.take_profit_price.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            p.stop_loss_price.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}
