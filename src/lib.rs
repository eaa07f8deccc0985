pub mod api;
pub mod charts;
pub mod config;
pub mod error;
pub mod queries;
pub mod startup;
pub mod warehouse;
pub mod wordcloud;

use std::sync::Arc;

use queries::Templates;
use startup::DashboardOptions;
use warehouse::QueryGateway;

/// Application state that will be shared across handlers.
///
/// Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn QueryGateway>,
    pub templates: Arc<Templates>,
    pub options: Arc<DashboardOptions>,
}
