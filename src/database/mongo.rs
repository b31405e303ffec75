// database/mongo.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use super::{ConfigStore, PaymentStore};
use crate::errors::{AppError, Result};
use crate::filter::{FilterValue, Operand, Operator, Page, Pageable, Predicate, Sort, SortDirection};
use crate::models::{
    AuditMetadata, Environment, PaymentTransaction, ShortcodeConfig, ShortcodeType, TransactionStatus, TransactionType,
};

pub const CONFIG_COLLECTION: &str = "mpesa_configs";
pub const PAYMENT_COLLECTION: &str = "mpesa_payments";

const DUPLICATE_KEY: i32 = 11000;

fn to_bson_date(value: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(value.timestamp_millis())
}

fn from_bson_date(value: bson::DateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .unwrap_or_default()
}

fn to_money(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn from_money(value: f64) -> Decimal {
    let mut amount = Decimal::from_f64(value).unwrap_or_default().round_dp(2);
    amount.rescale(2);
    amount
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::Serialization(format!("Stored uuid '{}' is invalid: {}", raw, e)))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

// ===== Config documents =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub uuid: String,
    pub shortcode: String,
    pub environment: Environment,
    pub shortcode_type: ShortcodeType,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: Option<String>,
    pub security_credential: Option<String>,
    pub initiator_name: Option<String>,
    pub collection_callback_url: Option<String>,
    pub collection_validation_url: Option<String>,
    pub collection_timeout_url: Option<String>,
    pub collection_result_url: Option<String>,
    pub disbursement_result_url: Option<String>,
    pub disbursement_timeout_url: Option<String>,
    pub disbursement_queue_url: Option<String>,
    pub stk_callback_url: Option<String>,
    pub active: bool,
    pub description: Option<String>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub created_by: String,
    pub updated_by: String,
}

impl From<&ShortcodeConfig> for ConfigDocument {
    fn from(config: &ShortcodeConfig) -> Self {
        ConfigDocument {
            id: None,
            uuid: config.id.to_string(),
            shortcode: config.shortcode.clone(),
            environment: config.environment,
            shortcode_type: config.shortcode_type,
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            passkey: config.passkey.clone(),
            security_credential: config.security_credential.clone(),
            initiator_name: config.initiator_name.clone(),
            collection_callback_url: config.collection_callback_url.clone(),
            collection_validation_url: config.collection_validation_url.clone(),
            collection_timeout_url: config.collection_timeout_url.clone(),
            collection_result_url: config.collection_result_url.clone(),
            disbursement_result_url: config.disbursement_result_url.clone(),
            disbursement_timeout_url: config.disbursement_timeout_url.clone(),
            disbursement_queue_url: config.disbursement_queue_url.clone(),
            stk_callback_url: config.stk_callback_url.clone(),
            active: config.active,
            description: config.description.clone(),
            created_at: to_bson_date(config.audit.created_at),
            updated_at: to_bson_date(config.audit.updated_at),
            created_by: config.audit.created_by.clone(),
            updated_by: config.audit.updated_by.clone(),
        }
    }
}

impl TryFrom<ConfigDocument> for ShortcodeConfig {
    type Error = AppError;

    fn try_from(doc: ConfigDocument) -> Result<Self> {
        Ok(ShortcodeConfig {
            id: parse_uuid(&doc.uuid)?,
            shortcode: doc.shortcode,
            environment: doc.environment,
            shortcode_type: doc.shortcode_type,
            consumer_key: doc.consumer_key,
            consumer_secret: doc.consumer_secret,
            passkey: doc.passkey,
            security_credential: doc.security_credential,
            initiator_name: doc.initiator_name,
            collection_callback_url: doc.collection_callback_url,
            collection_validation_url: doc.collection_validation_url,
            collection_timeout_url: doc.collection_timeout_url,
            collection_result_url: doc.collection_result_url,
            disbursement_result_url: doc.disbursement_result_url,
            disbursement_timeout_url: doc.disbursement_timeout_url,
            disbursement_queue_url: doc.disbursement_queue_url,
            stk_callback_url: doc.stk_callback_url,
            active: doc.active,
            description: doc.description,
            audit: AuditMetadata {
                created_at: from_bson_date(doc.created_at),
                updated_at: from_bson_date(doc.updated_at),
                created_by: doc.created_by,
                updated_by: doc.updated_by,
            },
        })
    }
}

// ===== Payment documents =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub uuid: String,
    // Omitted rather than null so the sparse unique index skips it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub phone_number: Option<String>,
    pub payer_identifier: Option<String>,
    pub payee_identifier: Option<String>,
    pub amount: f64,
    pub charges_amount: f64,
    pub currency: String,
    pub account_reference: Option<String>,
    pub transaction_desc: Option<String>,
    pub transaction_type: TransactionType,
    pub transaction_status: TransactionStatus,
    pub business_short_code: Option<String>,
    pub bill_ref_number: Option<String>,
    pub invoice_number: Option<String>,
    pub org_account_balance: Option<f64>,
    pub third_party_trans_id: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub transaction_time: Option<bson::DateTime>,
    pub raw_request: Option<Value>,
    pub raw_response: Option<Value>,
    pub raw_callback: Option<Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub completed_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    pub created_by: String,
    pub updated_by: String,
}

impl From<&PaymentTransaction> for PaymentDocument {
    fn from(p: &PaymentTransaction) -> Self {
        PaymentDocument {
            id: None,
            uuid: p.id.to_string(),
            external_transaction_id: p.external_transaction_id.clone(),
            merchant_request_id: p.merchant_request_id.clone(),
            checkout_request_id: p.checkout_request_id.clone(),
            phone_number: p.phone_number.clone(),
            payer_identifier: p.payer_identifier.clone(),
            payee_identifier: p.payee_identifier.clone(),
            amount: to_money(p.amount),
            charges_amount: to_money(p.charges_amount),
            currency: p.currency.clone(),
            account_reference: p.account_reference.clone(),
            transaction_desc: p.transaction_desc.clone(),
            transaction_type: p.transaction_type,
            transaction_status: p.transaction_status,
            business_short_code: p.business_short_code.clone(),
            bill_ref_number: p.bill_ref_number.clone(),
            invoice_number: p.invoice_number.clone(),
            org_account_balance: p.org_account_balance.map(to_money),
            third_party_trans_id: p.third_party_trans_id.clone(),
            first_name: p.first_name.clone(),
            middle_name: p.middle_name.clone(),
            last_name: p.last_name.clone(),
            transaction_time: p.transaction_time.map(to_bson_date),
            raw_request: p.raw_request.clone(),
            raw_response: p.raw_response.clone(),
            raw_callback: p.raw_callback.clone(),
            error_message: p.error_message.clone(),
            retry_count: p.retry_count,
            completed_at: p.completed_at.map(to_bson_date),
            created_at: to_bson_date(p.audit.created_at),
            updated_at: to_bson_date(p.audit.updated_at),
            created_by: p.audit.created_by.clone(),
            updated_by: p.audit.updated_by.clone(),
        }
    }
}

impl TryFrom<PaymentDocument> for PaymentTransaction {
    type Error = AppError;

    fn try_from(doc: PaymentDocument) -> Result<Self> {
        Ok(PaymentTransaction {
            id: parse_uuid(&doc.uuid)?,
            external_transaction_id: doc.external_transaction_id,
            merchant_request_id: doc.merchant_request_id,
            checkout_request_id: doc.checkout_request_id,
            phone_number: doc.phone_number,
            payer_identifier: doc.payer_identifier,
            payee_identifier: doc.payee_identifier,
            amount: from_money(doc.amount),
            charges_amount: from_money(doc.charges_amount),
            currency: doc.currency,
            account_reference: doc.account_reference,
            transaction_desc: doc.transaction_desc,
            transaction_type: doc.transaction_type,
            transaction_status: doc.transaction_status,
            business_short_code: doc.business_short_code,
            bill_ref_number: doc.bill_ref_number,
            invoice_number: doc.invoice_number,
            org_account_balance: doc.org_account_balance.map(from_money),
            third_party_trans_id: doc.third_party_trans_id,
            first_name: doc.first_name,
            middle_name: doc.middle_name,
            last_name: doc.last_name,
            transaction_time: doc.transaction_time.map(from_bson_date),
            raw_request: doc.raw_request,
            raw_response: doc.raw_response,
            raw_callback: doc.raw_callback,
            error_message: doc.error_message,
            retry_count: doc.retry_count,
            completed_at: doc.completed_at.map(from_bson_date),
            audit: AuditMetadata {
                created_at: from_bson_date(doc.created_at),
                updated_at: from_bson_date(doc.updated_at),
                created_by: doc.created_by,
                updated_by: doc.updated_by,
            },
        })
    }
}

// ===== Predicate translation =====

fn filter_value_to_bson(value: &FilterValue) -> Bson {
    match value {
        FilterValue::Uuid(v) => Bson::String(v.to_string()),
        FilterValue::Bool(v) => Bson::Boolean(*v),
        FilterValue::Integer(v) => Bson::Int64(*v),
        FilterValue::Float(v) => Bson::Double(*v),
        FilterValue::Decimal(v) => Bson::Double(to_money(*v)),
        FilterValue::Date(v) => v
            .and_hms_opt(0, 0, 0)
            .map(|naive| Bson::DateTime(to_bson_date(Utc.from_utc_datetime(&naive))))
            .unwrap_or(Bson::Null),
        FilterValue::Timestamp(v) => Bson::DateTime(to_bson_date(*v)),
        FilterValue::Text(v) => Bson::String(v.clone()),
    }
}

fn escape_regex(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Translates a predicate tree into a MongoDB filter document. Null
/// fields never match, matching in-memory evaluation.
pub fn predicate_to_document(predicate: &Predicate) -> Document {
    match predicate {
        Predicate::And(parts) if parts.is_empty() => doc! {},
        Predicate::And(parts) => {
            let clauses: Vec<Document> = parts.iter().map(predicate_to_document).collect();
            doc! { "$and": clauses }
        }
        Predicate::Condition(condition) => {
            let field = condition.field.as_str();
            let clause = match (&condition.operator, &condition.operand) {
                (Operator::Eq, Operand::Single(v)) => filter_value_to_bson(v),
                (Operator::NotEq, Operand::Single(v)) => {
                    Bson::Document(doc! { "$nin": [filter_value_to_bson(v), Bson::Null] })
                }
                (Operator::Gt, Operand::Single(v)) => Bson::Document(doc! { "$gt": filter_value_to_bson(v) }),
                (Operator::Lt, Operand::Single(v)) => Bson::Document(doc! { "$lt": filter_value_to_bson(v) }),
                (Operator::Gte, Operand::Single(v)) => Bson::Document(doc! { "$gte": filter_value_to_bson(v) }),
                (Operator::Lte, Operand::Single(v)) => Bson::Document(doc! { "$lte": filter_value_to_bson(v) }),
                (Operator::Between, Operand::Range(low, high)) => Bson::Document(doc! {
                    "$gte": filter_value_to_bson(low),
                    "$lte": filter_value_to_bson(high),
                }),
                (Operator::In, Operand::List(values)) => {
                    let values: Vec<Bson> = values.iter().map(filter_value_to_bson).collect();
                    Bson::Document(doc! { "$in": values })
                }
                (Operator::NotIn, Operand::List(values)) => {
                    let mut values: Vec<Bson> = values.iter().map(filter_value_to_bson).collect();
                    values.push(Bson::Null);
                    Bson::Document(doc! { "$nin": values })
                }
                (Operator::Like, Operand::Pattern(p)) => {
                    Bson::Document(doc! { "$regex": escape_regex(p), "$options": "i" })
                }
                (Operator::StartsWith, Operand::Pattern(p)) => {
                    Bson::Document(doc! { "$regex": format!("^{}", escape_regex(p)), "$options": "i" })
                }
                (Operator::EndsWith, Operand::Pattern(p)) => {
                    Bson::Document(doc! { "$regex": format!("{}$", escape_regex(p)), "$options": "i" })
                }
                (operator, operand) => {
                    error!("Operator {} cannot take operand {:?}", operator, operand);
                    Bson::Document(doc! { "$in": Vec::<Bson>::new() })
                }
            };
            let mut document = Document::new();
            document.insert(field, clause);
            document
        }
    }
}

fn sort_document(sort: Option<&Sort>) -> Document {
    match sort {
        Some(sort) => {
            let direction = match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            let mut document = Document::new();
            document.insert(sort.column.as_str(), direction);
            document
        }
        None => doc! { "created_at": -1 },
    }
}

// ===== Stores =====

#[derive(Clone)]
pub struct MongoConfigStore {
    collection: Collection<ConfigDocument>,
}

impl MongoConfigStore {
    pub fn new(db: &Database) -> Self {
        MongoConfigStore {
            collection: db.collection(CONFIG_COLLECTION),
        }
    }

    async fn find_one(&self, filter: Document) -> Result<Option<ShortcodeConfig>> {
        self.collection
            .find_one(filter)
            .await?
            .map(ShortcodeConfig::try_from)
            .transpose()
    }
}

#[async_trait]
impl ConfigStore for MongoConfigStore {
    async fn insert(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig> {
        match self.collection.insert_one(ConfigDocument::from(&config)).await {
            Ok(_) => Ok(config),
            Err(e) if is_duplicate_key(&e) => Err(AppError::ConfigurationAlreadyExists {
                shortcode: config.shortcode,
                environment: config.environment.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, config: ShortcodeConfig) -> Result<ShortcodeConfig> {
        let result = self
            .collection
            .replace_one(doc! { "uuid": config.id.to_string() }, ConfigDocument::from(&config))
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::ConfigurationNotFound(config.id.to_string()));
        }
        Ok(config)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ShortcodeConfig>> {
        self.find_one(doc! { "uuid": id.to_string() }).await
    }

    async fn find_by_identity(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>> {
        self.find_one(doc! { "shortcode": shortcode, "environment": environment.as_str() })
            .await
    }

    async fn find_active(&self, shortcode: &str, environment: Environment) -> Result<Option<ShortcodeConfig>> {
        self.find_one(doc! {
            "shortcode": shortcode,
            "environment": environment.as_str(),
            "active": true,
        })
        .await
    }

    async fn list_active(&self, pageable: &Pageable) -> Result<Page<ShortcodeConfig>> {
        let filter = doc! { "active": true };
        let total = self.collection.count_documents(filter.clone()).await?;
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "shortcode": 1, "environment": 1 })
            .skip(pageable.offset())
            .limit(pageable.size as i64)
            .await?;
        let documents: Vec<ConfigDocument> = cursor.try_collect().await?;
        let configs = documents
            .into_iter()
            .map(ShortcodeConfig::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(configs, pageable, total))
    }
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    collection: Collection<PaymentDocument>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        MongoPaymentStore {
            collection: db.collection(PAYMENT_COLLECTION),
        }
    }

    async fn find_one(&self, filter: Document) -> Result<Option<PaymentTransaction>> {
        self.collection
            .find_one(filter)
            .await?
            .map(PaymentTransaction::try_from)
            .transpose()
    }

    async fn collect(&self, filter: Document, sort: Document, skip: u64, limit: Option<i64>) -> Result<Vec<PaymentTransaction>> {
        let mut find = self.collection.find(filter).sort(sort).skip(skip);
        if let Some(limit) = limit {
            find = find.limit(limit);
        }
        let documents: Vec<PaymentDocument> = find.await?.try_collect().await?;
        documents
            .into_iter()
            .map(PaymentTransaction::try_from)
            .collect()
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert(&self, payment: PaymentTransaction) -> Result<PaymentTransaction> {
        self.collection.insert_one(PaymentDocument::from(&payment)).await?;
        Ok(payment)
    }

    async fn update(&self, payment: PaymentTransaction) -> Result<PaymentTransaction> {
        let result = self
            .collection
            .replace_one(doc! { "uuid": payment.id.to_string() }, PaymentDocument::from(&payment))
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::PaymentNotFound(payment.id.to_string()));
        }
        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        self.find_one(doc! { "uuid": id.to_string() }).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<PaymentTransaction>> {
        self.find_one(doc! { "external_transaction_id": external_id }).await
    }

    async fn find_by_merchant_request_id(&self, merchant_request_id: &str) -> Result<Option<PaymentTransaction>> {
        self.find_one(doc! { "merchant_request_id": merchant_request_id }).await
    }

    async fn find_or_create_by_external_id(&self, seed: PaymentTransaction) -> Result<(PaymentTransaction, bool)> {
        let external_id = seed
            .external_transaction_id
            .clone()
            .ok_or_else(|| AppError::ValidationError("find-or-create needs an external transaction id".into()))?;

        let mut on_insert = bson::to_document(&PaymentDocument::from(&seed))
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        // Upsert copies the equality filter into the new document.
        on_insert.remove("external_transaction_id");

        let stored = self
            .collection
            .find_one_and_update(
                doc! { "external_transaction_id": external_id.as_str() },
                doc! { "$setOnInsert": on_insert },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(external_id.clone()))?;

        let payment = PaymentTransaction::try_from(stored)?;
        let created = payment.id == seed.id;
        Ok((payment, created))
    }

    async fn finalize_pending(&self, next: PaymentTransaction) -> Result<bool> {
        let result = self
            .collection
            .replace_one(
                doc! {
                    "uuid": next.id.to_string(),
                    "transaction_status": TransactionStatus::Pending.as_str(),
                },
                PaymentDocument::from(&next),
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<PaymentTransaction>> {
        self.collect(predicate_to_document(predicate), sort_document(None), 0, None)
            .await
    }

    async fn search(&self, predicate: Option<&Predicate>, pageable: &Pageable) -> Result<Page<PaymentTransaction>> {
        let filter = predicate.map(predicate_to_document).unwrap_or_default();
        let total = self.collection.count_documents(filter.clone()).await?;
        let content = self
            .collect(
                filter,
                sort_document(pageable.sort.as_ref()),
                pageable.offset(),
                Some(pageable.size as i64),
            )
            .await?;
        Ok(Page::new(content, pageable, total))
    }
}
