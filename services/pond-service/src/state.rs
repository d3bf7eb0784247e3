use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;

use crate::ai::ChatAssistant;
use crate::predict::YieldService;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Client>>,
    pub yields: Arc<YieldService>,
    pub assistant: ChatAssistant,
    pub chat_history_limit: i64,
}
