// src/ingest/providers/mod.rs
pub mod coindesk_rss;
pub mod coingecko;
pub mod wttr;

pub use coindesk_rss::CoinDeskRssAdapter;
pub use coingecko::CoinGeckoAdapter;
pub use wttr::WttrAdapter;
