pub mod config;
pub mod market_data;
pub mod registry;
pub mod simulation;
