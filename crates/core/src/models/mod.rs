pub mod analytics;
pub mod cache;
pub mod chart;
pub mod holding;
pub mod market;
pub mod series;
pub mod settings;
