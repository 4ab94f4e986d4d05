pub mod registry;
pub mod scores;
pub mod traits;

// API provider implementations
pub mod frankfurter;
#[cfg(not(target_arch = "wasm32"))]
pub mod yahoo_finance;
