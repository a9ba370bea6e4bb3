pub mod core;
pub mod exchanges;
pub mod utils;

pub use core::{
    config::{AppConfig, ExchangeConfig},
    errors::ExchangeError,
    traits::{AccountInfo, MarketDataSource},
    types::*,
};
pub use exchanges::bitflyer::BitflyerConnector;
