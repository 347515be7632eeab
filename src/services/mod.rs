pub mod code_executor;
pub mod failure_cache;
pub mod llm_service;
pub mod plot_service;
pub mod price_service;
pub mod stock_service;
