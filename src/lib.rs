#![forbid(unsafe_code)]

pub mod browser;
pub mod cli;
pub mod config;
pub mod dates;
pub mod diagnostics;
pub mod extract;
pub mod filter;
pub mod formats;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod scrape;
