use std::sync::Arc;

use mongodb::Database;

use crate::services::{CredentialRegistry, MpesaPaymentService, TokenBroker};

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<MpesaPaymentService>,
    pub configs: Arc<CredentialRegistry>,
    pub tokens: Arc<TokenBroker>,
    pub db: Option<Database>,
}

impl AppState {
    pub fn new(payments: Arc<MpesaPaymentService>, configs: Arc<CredentialRegistry>, tokens: Arc<TokenBroker>) -> Self {
        AppState {
            payments,
            configs,
            tokens,
            db: None,
        }
    }

    pub fn with_db(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}
