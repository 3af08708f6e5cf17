//! Domain models for the Genesis integration core.
//!
//! Defines the three durable entities (webhook logs, sync logs, API tokens),
//! their strongly-typed identifiers, and the status state machines that the
//! storage layer enforces with compare-and-set updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <Uuid as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
                Ok(Self(uuid))
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

uuid_id! {
    /// Strongly-typed webhook log identifier.
    ///
    /// Wraps a UUID to prevent mixing with other ID types. The id follows a
    /// webhook event from ingestion through its processing lifecycle.
    WebhookLogId
}

uuid_id! {
    /// Strongly-typed sync log identifier.
    ///
    /// Each synchronization attempt gets its own log row and therefore its
    /// own id; retries never reuse an existing one.
    SyncLogId
}

uuid_id! {
    /// Strongly-typed API token identifier.
    TokenId
}

/// Webhook log lifecycle status.
///
/// Transitions are strictly controlled by the storage layer:
///
/// ```text
/// pending -> processing -> completed
///                       -> failed -> processing   (retry re-entry)
/// ```
///
/// `completed` is absorbing; `failed` becomes absorbing once the retry
/// budget is exhausted. No status ever returns to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Created by the ingestion path, waiting for a worker.
    Pending,
    /// A worker has claimed the log and is dispatching its handler.
    Processing,
    /// Handler finished (or no handler matched). Terminal.
    Completed,
    /// Handler failed. Re-enters `processing` on retry, terminal once the
    /// retry budget is spent.
    Failed,
}

impl WebhookStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Processing)
        )
    }

    /// Statuses that are allowed to precede `next`.
    ///
    /// Used by the storage layer to build compare-and-set predicates.
    pub fn allowed_prior(next: Self) -> Vec<Self> {
        [Self::Pending, Self::Processing, Self::Completed, Self::Failed]
            .into_iter()
            .filter(|prior| prior.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for WebhookStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid webhook status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Sync log lifecycle status.
///
/// ```text
/// pending -> running -> completed
///                    -> failed
/// ```
///
/// There is no retry edge: a retried sync is a fresh `SyncLog` row, which
/// preserves the full attempt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Row created, sync not yet started.
    Pending,
    /// Remote fetch in flight. `started_at` is stamped on entry.
    Running,
    /// Sync finished and results cached. Terminal.
    Completed,
    /// Sync failed or was cancelled. Terminal.
    Failed,
}

impl SyncStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Statuses that are allowed to precede `next`.
    pub fn allowed_prior(next: Self) -> Vec<Self> {
        [Self::Pending, Self::Running, Self::Completed, Self::Failed]
            .into_iter()
            .filter(|prior| prior.can_transition_to(next))
            .collect()
    }

    /// Terminal states carry a `completed_at` timestamp.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for SyncStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for SyncStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid sync status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for SyncStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Kind of dataset a sync pulls from the remote Genesis API.
///
/// The set is open: unknown kinds round-trip through `Other` so new remote
/// datasets can be logged before this crate learns about them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Project user roster.
    Users,
    /// Billing plans.
    Billing,
    /// Feature flags.
    Features,
    /// Any dataset this crate has no typed remote call for yet.
    Other(String),
}

impl DataType {
    /// Parses a data type from its wire/database representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "users" => Self::Users,
            "billing" => Self::Billing,
            "features" => Self::Features,
            other => Self::Other(other.to_string()),
        }
    }

    /// The string form used in cache keys and database rows.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Users => "users",
            Self::Billing => "billing",
            Self::Features => "features",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<PgDb> for DataType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DataType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self::parse(s))
    }
}

impl sqlx::Encode<'_, PgDb> for DataType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str().to_string(), buf)
    }
}

/// Durable record of one inbound webhook event.
///
/// Created as `pending` by the ingestion path and mutated only by the
/// webhook processor. Rows are an audit trail and are never deleted here;
/// retention is an external concern.
///
/// Invariants (enforced by the storage layer):
/// - `completed` implies `processed_at` is set and `error_message` is empty
/// - `failed` implies `error_message` is set
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookLog {
    /// Unique identifier for this log row.
    pub id: WebhookLogId,

    /// Remote project this event belongs to.
    pub project_id: String,

    /// Event type string, e.g. `payment.completed`. Dispatch key for the
    /// handler registry.
    pub event_type: String,

    /// Raw event payload. Opaque to the store.
    pub payload: sqlx::types::Json<Value>,

    /// Current lifecycle status.
    pub status: WebhookStatus,

    /// Failure detail from the most recent failed attempt.
    pub error_message: Option<String>,

    /// Number of failed processing attempts so far.
    pub attempts: i32,

    /// When processing completed successfully.
    pub processed_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Durable record of one synchronization attempt.
///
/// Invariants: `completed_at` is set only in terminal states; `started_at`
/// is stamped before the transition to `running`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncLog {
    /// Unique identifier for this log row.
    pub id: SyncLogId,

    /// Remote project being synchronized.
    pub project_id: String,

    /// Dataset kind being synchronized.
    pub data_type: DataType,

    /// Current lifecycle status.
    pub status: SyncStatus,

    /// Cardinality of the fetched dataset, recorded on success.
    pub records_synced: i32,

    /// Failure detail, including the "cancelled" marker for aborted syncs.
    pub error_message: Option<String>,

    /// When the sync transitioned to `running`.
    pub started_at: Option<DateTime<Utc>>,

    /// When the sync reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Hashed, scoped, optionally expiring bearer credential.
///
/// The raw secret is never stored; `token_hash` is the SHA-256 hex digest
/// computed at issuance and again at validation time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiToken {
    /// Unique identifier for this token row.
    pub id: TokenId,

    /// Project the token is bound to.
    pub project_id: String,

    /// Owning user, when the token is user-scoped rather than
    /// project-scoped.
    pub user_id: Option<String>,

    /// SHA-256 hex digest of the raw secret. Unique.
    pub token_hash: String,

    /// Optional human-readable label.
    pub name: Option<String>,

    /// Permission strings. `*` grants everything.
    pub scopes: sqlx::types::Json<Vec<String>>,

    /// Last successful validation, updated best-effort.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Expiry instant; `None` means non-expiring.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl ApiToken {
    /// Whether the token is still within its validity window at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_status_happy_path() {
        assert!(WebhookStatus::Pending.can_transition_to(WebhookStatus::Processing));
        assert!(WebhookStatus::Processing.can_transition_to(WebhookStatus::Completed));
        assert!(WebhookStatus::Processing.can_transition_to(WebhookStatus::Failed));
    }

    #[test]
    fn webhook_failed_reenters_processing_but_never_pending() {
        assert!(WebhookStatus::Failed.can_transition_to(WebhookStatus::Processing));
        assert!(!WebhookStatus::Failed.can_transition_to(WebhookStatus::Pending));
    }

    #[test]
    fn webhook_completed_is_absorbing() {
        for next in [
            WebhookStatus::Pending,
            WebhookStatus::Processing,
            WebhookStatus::Completed,
            WebhookStatus::Failed,
        ] {
            assert!(!WebhookStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn webhook_allowed_prior_matches_table() {
        assert_eq!(
            WebhookStatus::allowed_prior(WebhookStatus::Processing),
            vec![WebhookStatus::Pending, WebhookStatus::Failed]
        );
        assert_eq!(
            WebhookStatus::allowed_prior(WebhookStatus::Completed),
            vec![WebhookStatus::Processing]
        );
        assert!(WebhookStatus::allowed_prior(WebhookStatus::Pending).is_empty());
    }

    #[test]
    fn sync_status_has_no_retry_edge() {
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Running));
        assert!(SyncStatus::Running.can_transition_to(SyncStatus::Completed));
        assert!(SyncStatus::Running.can_transition_to(SyncStatus::Failed));
        assert!(!SyncStatus::Failed.can_transition_to(SyncStatus::Running));
        assert!(!SyncStatus::Failed.can_transition_to(SyncStatus::Pending));
        assert!(!SyncStatus::Completed.can_transition_to(SyncStatus::Running));
    }

    #[test]
    fn sync_terminal_states() {
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
    }

    #[test]
    fn data_type_round_trips_unknown_kinds() {
        assert_eq!(DataType::parse("users"), DataType::Users);
        assert_eq!(DataType::parse("billing"), DataType::Billing);
        assert_eq!(DataType::parse("features"), DataType::Features);
        let other = DataType::parse("invoices");
        assert_eq!(other, DataType::Other("invoices".to_string()));
        assert_eq!(other.as_str(), "invoices");
    }

    #[test]
    fn status_display_matches_database_representation() {
        assert_eq!(WebhookStatus::Pending.to_string(), "pending");
        assert_eq!(WebhookStatus::Processing.to_string(), "processing");
        assert_eq!(WebhookStatus::Completed.to_string(), "completed");
        assert_eq!(WebhookStatus::Failed.to_string(), "failed");
        assert_eq!(SyncStatus::Running.to_string(), "running");
    }

    #[test]
    fn token_liveness_respects_expiry() {
        let now = Utc::now();
        let token = ApiToken {
            id: TokenId::new(),
            project_id: "p1".into(),
            user_id: None,
            token_hash: "abc".into(),
            name: None,
            scopes: sqlx::types::Json(vec!["*".into()]),
            last_used_at: None,
            expires_at: Some(now - chrono::Duration::seconds(1)),
            created_at: now,
            updated_at: now,
        };
        assert!(!token.is_live_at(now));

        let non_expiring = ApiToken { expires_at: None, ..token };
        assert!(non_expiring.is_live_at(now));
    }
}
