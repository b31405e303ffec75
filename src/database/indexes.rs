use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use tracing::info;

use super::mongo::{ConfigDocument, PaymentDocument, CONFIG_COLLECTION, PAYMENT_COLLECTION};
use crate::errors::Result;

fn index(keys: Document, name: &str, unique: bool, sparse: bool) -> IndexModel {
    let options = IndexOptions::builder()
        .name(name.to_string())
        .unique(unique)
        .sparse(sparse)
        .build();
    IndexModel::builder().keys(keys).options(options).build()
}

/// Creates the indexes the stores rely on. Safe to run on every start.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let configs = db.collection::<ConfigDocument>(CONFIG_COLLECTION);
    configs
        .create_indexes(vec![
            index(doc! { "shortcode": 1, "environment": 1 }, "shortcode_environment_unique", true, false),
            index(doc! { "uuid": 1 }, "config_uuid_unique", true, false),
        ])
        .await?;

    let payments = db.collection::<PaymentDocument>(PAYMENT_COLLECTION);
    payments
        .create_indexes(vec![
            index(doc! { "uuid": 1 }, "payment_uuid_unique", true, false),
            index(doc! { "external_transaction_id": 1 }, "external_transaction_id_unique", true, true),
            index(doc! { "merchant_request_id": 1 }, "merchant_request_id", false, true),
            index(doc! { "phone_number": 1, "created_at": -1 }, "phone_number_created_at", false, false),
            index(doc! { "transaction_status": 1, "created_at": 1 }, "status_created_at", false, false),
        ])
        .await?;

    info!("MongoDB indexes ensured on {} and {}", CONFIG_COLLECTION, PAYMENT_COLLECTION);
    Ok(())
}
