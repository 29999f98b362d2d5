use crate::approval::ApprovalHandler;
use crate::monitor::AnomalyHistory;
use crate::repair::FixRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FixRegistry>,
    pub history: Arc<AnomalyHistory>,
    pub approval: Arc<ApprovalHandler>,
    pub repair_enabled: bool,
}
