use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::refund::RefundRequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Created,
    StatusChange,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChange => "status_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "status_change" => Some(Self::StatusChange),
            _ => None,
        }
    }
}

/// One record of the append-only activity timeline of a refund request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub refund_request_id: RefundRequestId,
    pub activity_type: ActivityType,
    pub description: String,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        refund_request_id: RefundRequestId,
        activity_type: ActivityType,
        description: impl Into<String>,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId(Uuid::new_v4().to_string()),
            refund_request_id,
            activity_type,
            description: description.into(),
            actor: actor.into(),
            metadata: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::refund::RefundRequestId;

    use super::{ActivityEntry, ActivityType};

    #[test]
    fn entries_carry_metadata_and_unique_ids() {
        let now = Utc::now();
        let first = ActivityEntry::new(
            RefundRequestId("R-1".to_owned()),
            ActivityType::StatusChange,
            "Estado actualizado a: Enviado",
            "user-1",
            now,
        )
        .with_metadata("from", "borrador")
        .with_metadata("to", "enviado");
        let second = ActivityEntry::new(
            RefundRequestId("R-1".to_owned()),
            ActivityType::StatusChange,
            "Estado actualizado a: En Proceso",
            "reviewer",
            now,
        );

        assert_ne!(first.id, second.id);
        assert_eq!(first.metadata.get("to").map(String::as_str), Some("enviado"));
        assert_eq!(
            ActivityType::parse(first.activity_type.as_str()),
            Some(ActivityType::StatusChange)
        );
    }
}
