#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod auth;
pub mod config;
pub mod content;
pub mod data;
pub mod error;
pub mod keymap;
pub mod layout;
pub mod loader;
pub mod navigator;
pub mod page;
pub mod reddit;
pub mod sequence;
pub mod session;
pub mod storage;
pub mod submission;
pub mod subreddit;
pub mod subscription;
pub mod terminal;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
