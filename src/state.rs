use std::sync::Arc;

use crate::config::Settings;
use crate::services::stock_service::StockService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub stock_service: Arc<StockService>,
}
