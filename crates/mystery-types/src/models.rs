use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An anonymous message as seen by its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `None` until the recipient answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}
