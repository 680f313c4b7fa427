//! Market Data Feed Adapters - Perp Reference Prices
//!
//! - PriceBook: seeded reference prices, implements the `PriceFeed` port
//! - Binance: optional live aggTrade stream writing into the book

pub mod binance;
pub mod price_book;

pub use binance::BinanceFeed;
pub use price_book::{PriceBook, Quote};
