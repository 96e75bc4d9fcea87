// src/services/mod.rs
pub mod alpaca;
pub mod analysis;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod export;
pub mod filters;
pub mod horizons;
pub mod normalizer;
pub mod polygon;
pub mod provider;
pub mod spreads;
pub mod trading_day;
