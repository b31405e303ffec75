//! Storage ports for configs and payments, with in-memory and MongoDB adapters.

pub mod connection;
pub mod indexes;
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::filter::{Page, Pageable, Predicate};
use crate::models::{Environment, PaymentTransaction, ShortcodeConfig};

pub use memory::{InMemoryConfigStore, InMemoryPaymentStore};
pub use mongo::{MongoConfigStore, MongoPaymentStore};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fails with `ConfigurationAlreadyExists` when (shortcode, environment) is taken.
    async fn insert(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig>;
    async fn update(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ShortcodeConfig>>;
    /// Matches active and inactive rows.
    async fn find_by_identity(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>>;
    async fn find_active(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>>;
    async fn list_active(&self, pageable: &Pageable) -> Result<Page<ShortcodeConfig>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: PaymentTransaction) -> Result<PaymentTransaction>;
    async fn update(&self, payment: PaymentTransaction) -> Result<PaymentTransaction>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn find_by_merchant_request_id(&self, merchant_request_id: &str) -> Result<Option<PaymentTransaction>>;

    /// Atomically returns the row carrying `seed.external_transaction_id`,
    /// inserting `seed` if there is none. The flag is true when inserted.
    async fn find_or_create_by_external_id(&self, seed: PaymentTransaction) -> Result<(PaymentTransaction, bool)>;

    /// Replaces the stored row only while it is still PENDING.
    /// Returns false when another writer finalized it first.
    async fn finalize_pending(&self, next: PaymentTransaction) -> Result<bool>;

    /// Every row matching `predicate`, newest first.
    async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<PaymentTransaction>>;

    async fn search(&self, predicate: Option<&Predicate>, pageable: &Pageable) -> Result<Page<PaymentTransaction>>;
}
