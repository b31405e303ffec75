use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConfigStore, PaymentStore};
use crate::errors::{AppError, Result};
use crate::filter::{Filterable, Page, Pageable, Predicate, Sort, SortDirection};
use crate::models::{Environment, PaymentTransaction, ShortcodeConfig, TransactionStatus};

/// Thread-safe config store backed by a `HashMap`. Used by tests and
/// single-process deployments without MongoDB.
#[derive(Default, Clone)]
pub struct InMemoryConfigStore {
    configs: Arc<RwLock<HashMap<Uuid, ShortcodeConfig>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.configs.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn insert(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig> {
        let mut configs = self.configs.write().await;
        let taken = configs
            .values()
            .any(|c| c.shortcode == config.shortcode && c.environment == config.environment);
        if taken {
            return Err(AppError::ConfigurationAlreadyExists {
                shortcode: config.shortcode,
                environment: config.environment.to_string(),
            });
        }
        configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn update(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig> {
        let mut configs = self.configs.write().await;
        match configs.get_mut(&config.id) {
            Some(slot) => {
                *slot = config.clone();
                Ok(config)
            }
            None => Err(AppError::ConfigurationNotFound(config.id.to_string())),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ShortcodeConfig>> {
        Ok(self.configs.read().await.get(&id).cloned())
    }

    async fn find_by_identity(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>> {
        let configs = self.configs.read().await;
        Ok(configs
            .values()
            .find(|c| c.shortcode == shortcode && c.environment == environment)
            .cloned())
    }

    async fn find_active(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>> {
        Ok(self
            .find_by_identity(shortcode, environment)
            .await?
            .filter(|c| c.active))
    }

    async fn list_active(&self, pageable: &Pageable) -> Result<Page<ShortcodeConfig>> {
        let mut active: Vec<ShortcodeConfig> = self
            .configs
            .read()
            .await
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.shortcode
                .cmp(&b.shortcode)
                .then_with(|| a.environment.as_str().cmp(b.environment.as_str()))
        });
        Ok(slice_page(active, pageable))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }

    fn filtered(rows: Vec<PaymentTransaction>, predicate: Option<&Predicate>) -> Result<Vec<PaymentTransaction>> {
        let Some(predicate) = predicate else {
            return Ok(rows);
        };
        let mut matching = Vec::new();
        for row in rows {
            if predicate.evaluate(&row)? {
                matching.push(row);
            }
        }
        Ok(matching)
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: PaymentTransaction) -> Result<PaymentTransaction> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn update(&self, payment: PaymentTransaction) -> Result<PaymentTransaction> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&payment.id) {
            Some(slot) => {
                *slot = payment.clone();
                Ok(payment)
            }
            None => Err(AppError::PaymentNotFound(payment.id.to_string())),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.external_transaction_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_merchant_request_id(&self, merchant_request_id: &str) -> Result<Option<PaymentTransaction>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.merchant_request_id.as_deref() == Some(merchant_request_id))
            .cloned())
    }

    async fn find_or_create_by_external_id(&self, seed: PaymentTransaction) -> Result<(PaymentTransaction, bool)> {
        let external_id = seed
            .external_transaction_id
            .clone()
            .ok_or_else(|| AppError::ValidationError("find-or-create needs an external transaction id".into()))?;

        // One write lock covers lookup and insert.
        let mut payments = self.payments.write().await;
        if let Some(existing) = payments
            .values()
            .find(|p| p.external_transaction_id.as_deref() == Some(external_id.as_str()))
        {
            return Ok((existing.clone(), false));
        }
        payments.insert(seed.id, seed.clone());
        Ok((seed, true))
    }

    async fn finalize_pending(&self, next: PaymentTransaction) -> Result<bool> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&next.id) {
            Some(slot) if slot.transaction_status == TransactionStatus::Pending => {
                *slot = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::PaymentNotFound(next.id.to_string())),
        }
    }

    async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<PaymentTransaction>> {
        let rows: Vec<PaymentTransaction> = self.payments.read().await.values().cloned().collect();
        let mut matching = Self::filtered(rows, Some(predicate))?;
        sort_rows(&mut matching, &Sort::desc("created_at"));
        Ok(matching)
    }

    async fn search(&self, predicate: Option<&Predicate>, pageable: &Pageable) -> Result<Page<PaymentTransaction>> {
        let rows: Vec<PaymentTransaction> = self.payments.read().await.values().cloned().collect();
        let mut matching = Self::filtered(rows, predicate)?;
        let sort = pageable.sort.clone().unwrap_or_else(|| Sort::desc("created_at"));
        sort_rows(&mut matching, &sort);
        Ok(slice_page(matching, pageable))
    }
}

fn sort_rows<T: Filterable>(rows: &mut [T], sort: &Sort) {
    rows.sort_by(|a, b| {
        let left = a.field_value(&sort.column).flatten();
        let right = b.field_value(&sort.column).flatten();
        let ordering = match (&left, &right) {
            (Some(l), Some(r)) => l.compare(r).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match (sort.direction, &left, &right) {
            // Nulls stay last in both directions.
            (SortDirection::Desc, Some(_), Some(_)) => ordering.reverse(),
            _ => ordering,
        }
    });
}

fn slice_page<T>(rows: Vec<T>, pageable: &Pageable) -> Page<T> {
    let total = rows.len() as u64;
    let content = rows
        .into_iter()
        .skip(pageable.offset() as usize)
        .take(pageable.size as usize)
        .collect();
    Page::new(content, pageable, total)
}
