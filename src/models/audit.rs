use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SYSTEM_ACTOR: &str = "system";

/// Creation/modification stamps carried by every stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl AuditMetadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        AuditMetadata {
            created_at: now,
            updated_at: now,
            created_by: SYSTEM_ACTOR.to_string(),
            updated_by: SYSTEM_ACTOR.to_string(),
        }
    }

    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        AuditMetadata {
            updated_at: now,
            updated_by: SYSTEM_ACTOR.to_string(),
            ..self.clone()
        }
    }
}
