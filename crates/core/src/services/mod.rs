pub mod allocation_service;
pub mod analytics_service;
pub mod chart_service;
pub mod currency_service;
pub mod market_data_service;
pub mod rebalancing_service;
pub mod target_weight_service;
pub mod valuation_service;
