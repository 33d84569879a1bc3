pub mod api_server;
pub mod dexscreener;
pub mod http;
pub mod polymarket;
pub mod postgres;
pub mod repository;

pub use api_server::start_api_server;
pub use dexscreener::{BoostedToken, DexPair, DexScreenerClient, MarketDataSource};
pub use http::{fetch_with_retry, retry_async, TtlCache};
pub use polymarket::{GammaClient, GammaMarket, PredictionMarketSource};
pub use postgres::PostgresStore;
pub use repository::{MemoryRepository, Repository};
