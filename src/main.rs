use anyhow::Context;
use flyerx::core::config::AppConfig;
use flyerx::core::traits::{AccountInfo, MarketDataSource};
use flyerx::exchanges::bitflyer::build_connector;
use flyerx::utils::logging::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const TICKER_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    init_logging(&config.log_file).context("initializing logging")?;

    let connector =
        build_connector(config.exchange.clone()).context("building bitFlyer connector")?;

    if config.exchange.has_credentials() {
        match connector.get_balance().await {
            Ok(balances) => {
                for balance in balances {
                    println!(
                        "{}: amount={} available={}",
                        balance.currency_code, balance.amount, balance.available
                    );
                }
            }
            Err(e) => error!("Failed to fetch balances: {}", e),
        }
    }

    let cancel = CancellationToken::new();
    let mut tickers = connector
        .subscribe_ticker(&config.product_code, TICKER_BUFFER, cancel.clone())
        .await
        .with_context(|| format!("subscribing to {} tickers", config.product_code))?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        shutdown.cancel();
    });

    while let Some(ticker) = tickers.recv().await {
        println!("{}", ticker);
        println!("mid price: {}", ticker.mid_price());
    }

    cancel.cancel();
    info!("Ticker stream finished");
    Ok(())
}
