use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionService;
use crate::mailbox::MailboxGateway;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum
/// extractors, and cloned into the background scheduler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailbox: Arc<dyn MailboxGateway>,
    pub llm: Arc<dyn CompletionService>,
    pub config: Config,
}
