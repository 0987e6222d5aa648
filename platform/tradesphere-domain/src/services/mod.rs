pub mod audit;
pub mod engine;
pub mod hedge;
pub mod price_resolver;
pub mod rule_engine;
