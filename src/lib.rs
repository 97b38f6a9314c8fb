//! SHARPLINE: edge detection and staking engine for weekly sports cards.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod config;
pub mod storage;
pub mod strategy;
pub mod types;
