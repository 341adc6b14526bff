#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod client;
pub mod clock;
pub mod config;
pub mod data;
pub mod feed;
pub mod fetcher;
pub mod gallery;
pub mod layout;
pub mod logging;
pub mod observer;
pub mod read_tracker;
pub mod scroll;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
