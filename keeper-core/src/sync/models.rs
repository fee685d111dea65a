//! Sync data models: secret kinds, outbox actions and the wire format
//! shared by the client and the server of record.

use crate::database::models::{BlobPayload, CardPayload, CredentialPayload, NotePayload};
use serde::{Deserialize, Serialize};

/// Type of syncable secret. Doubles as the local table name and the
/// replication route segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Credentials,
    TextData,
    BinaryData,
    Cards,
}

impl SecretKind {
    /// Every kind, in the order the worker pushes them.
    pub const ALL: [SecretKind; 4] = [
        SecretKind::Credentials,
        SecretKind::TextData,
        SecretKind::BinaryData,
        SecretKind::Cards,
    ];

    /// Convert the kind to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::TextData => "text_data",
            Self::BinaryData => "binary_data",
            Self::Cards => "cards",
        }
    }

    /// Parse a kind from its string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credentials" => Some(Self::Credentials),
            "text_data" => Some(Self::TextData),
            "binary_data" => Some(Self::BinaryData),
            "cards" => Some(Self::Cards),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation recorded in the outbox and carried by each wire item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxAction {
    #[serde(rename = "save")]
    Save,
    #[serde(rename = "deleted")]
    Delete,
}

impl OutboxAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Delete => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "save" => Some(Self::Save),
            "deleted" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A single replicated mutation.
///
/// Payload fields are flattened into the item, so a credential item reads
/// `{id, owning_user_id, resource, login, password, updated_at, action, access_token}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem<P> {
    /// Local row id on the sending device.
    pub id: i64,
    /// Local user id on the sending device.
    pub owning_user_id: i64,
    #[serde(flatten)]
    pub payload: P,
    /// RFC 3339 timestamp of the local mutation.
    pub updated_at: String,
    pub action: OutboxAction,
    /// Token the server resolves to the owning user.
    pub access_token: String,
}

/// Request body of one replication call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest<P> {
    pub items: Vec<SyncItem<P>>,
}

/// One replication call's worth of items, tagged by kind.
#[derive(Debug, Clone)]
pub enum SyncBatch {
    Credentials(Vec<SyncItem<CredentialPayload>>),
    TextData(Vec<SyncItem<NotePayload>>),
    BinaryData(Vec<SyncItem<BlobPayload>>),
    Cards(Vec<SyncItem<CardPayload>>),
}

impl SyncBatch {
    pub fn kind(&self) -> SecretKind {
        match self {
            Self::Credentials(_) => SecretKind::Credentials,
            Self::TextData(_) => SecretKind::TextData,
            Self::BinaryData(_) => SecretKind::BinaryData,
            Self::Cards(_) => SecretKind::Cards,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Credentials(items) => items.len(),
            Self::TextData(items) => items.len(),
            Self::BinaryData(items) => items.len(),
            Self::Cards(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token presented to the server's gate: the first item's token.
    pub fn bearer(&self) -> Option<&str> {
        match self {
            Self::Credentials(items) => items.first().map(|i| i.access_token.as_str()),
            Self::TextData(items) => items.first().map(|i| i.access_token.as_str()),
            Self::BinaryData(items) => items.first().map(|i| i.access_token.as_str()),
            Self::Cards(items) => items.first().map(|i| i.access_token.as_str()),
        }
    }

    /// Local ids of the items, in send order.
    pub fn item_ids(&self) -> Vec<i64> {
        match self {
            Self::Credentials(items) => items.iter().map(|i| i.id).collect(),
            Self::TextData(items) => items.iter().map(|i| i.id).collect(),
            Self::BinaryData(items) => items.iter().map(|i| i.id).collect(),
            Self::Cards(items) => items.iter().map(|i| i.id).collect(),
        }
    }

    /// JSON request body (`{"items": [...]}`).
    pub fn to_body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Credentials(items) => serde_json::to_value(SyncRequestRef { items }),
            Self::TextData(items) => serde_json::to_value(SyncRequestRef { items }),
            Self::BinaryData(items) => serde_json::to_value(SyncRequestRef { items }),
            Self::Cards(items) => serde_json::to_value(SyncRequestRef { items }),
        }
    }
}

#[derive(Serialize)]
struct SyncRequestRef<'a, P: Serialize> {
    items: &'a [SyncItem<P>],
}

/// Per-item result of a replication call, index-aligned with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Echo of the item's local id.
    pub id: i64,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replication acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAck {
    pub message: String,
    pub results: Vec<ItemOutcome>,
}

/// Login/password pair sent to the register and auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of a direct soft delete: the natural key of the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_kind_roundtrip() {
        for kind in SecretKind::ALL {
            assert_eq!(SecretKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SecretKind::parse("entries"), None);
    }

    #[test]
    fn outbox_action_wire_names() {
        assert_eq!(serde_json::to_string(&OutboxAction::Save).unwrap(), "\"save\"");
        assert_eq!(
            serde_json::to_string(&OutboxAction::Delete).unwrap(),
            "\"deleted\""
        );
        assert_eq!(OutboxAction::parse("deleted"), Some(OutboxAction::Delete));
        assert_eq!(OutboxAction::parse("delete"), None);
    }

    #[test]
    fn sync_item_flattens_payload() {
        let item = SyncItem {
            id: 7,
            owning_user_id: 1,
            payload: CredentialPayload {
                resource: "github".to_string(),
                login: "alice".to_string(),
                password: "s3cr3t".to_string(),
            },
            updated_at: "2024-01-01T00:00:00+00:00".to_string(),
            action: OutboxAction::Save,
            access_token: "tok".to_string(),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["resource"], "github");
        assert_eq!(json["action"], "save");
        assert_eq!(json["access_token"], "tok");

        let back: SyncItem<CredentialPayload> = serde_json::from_value(json).unwrap();
        assert_eq!(back.payload.login, "alice");
        assert_eq!(back.id, 7);
    }

    #[test]
    fn batch_body_and_bearer() {
        let batch = SyncBatch::TextData(vec![SyncItem {
            id: 1,
            owning_user_id: 1,
            payload: NotePayload {
                text: "hello".to_string(),
            },
            updated_at: String::new(),
            action: OutboxAction::Delete,
            access_token: "first".to_string(),
        }]);

        assert_eq!(batch.kind(), SecretKind::TextData);
        assert_eq!(batch.bearer(), Some("first"));

        let body = batch.to_body().unwrap();
        assert_eq!(body["items"][0]["text"], "hello");
        assert_eq!(body["items"][0]["action"], "deleted");

        assert_eq!(SyncBatch::Cards(Vec::new()).bearer(), None);
    }
}
