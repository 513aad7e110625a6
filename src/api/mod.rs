pub mod dexscreener;

pub use dexscreener::{DexScreenerClient, TokenQuote};
