#![deny(clippy::await_holding_refcell_ref)]

pub mod client;
pub mod common;
pub mod config;
pub mod local;


pub type Error = crate::common::error::AppError;
pub type Result<T> = std::result::Result<T, Error>;

pub use trainq_core;

pub const TRAINQ_VERSION: &str = env!("CARGO_PKG_VERSION");
