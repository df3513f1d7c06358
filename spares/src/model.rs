//! Domain entities. These are the shapes the core components agree on;
//! `schema.rs` holds the wire-facing request/response DTOs built from
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

pub type UserId = i64;
pub type DeckId = i64;
pub type NoteId = i64;
pub type CardId = i64;
pub type RelationshipId = i64;
pub type InvitationId = i64;
/// Client-generated; the primary key of the events table.
pub type EventId = String;
pub type SessionId = String;

/// A fixed synthetic user every new sign-up is bound to.
pub const AI_TUTOR_USER_ID: UserId = 1;

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoleTag {
    Student,
    Tutor,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: String,
    pub is_admin: bool,
    #[sqlx(try_from = "String")]
    pub role_tag: RoleTagColumn,
    pub created_at: DateTime<Utc>,
}

/// `sqlx`'s `FromRow` derive decodes enum columns through `TryFrom<String>`;
/// wrapping each enum in a newtype keeps that glue out of `strum`'s derive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoleTagColumn(pub RoleTag);

impl TryFrom<String> for RoleTagColumn {
    type Error = strum::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(RoleTagColumn)
    }
}

impl std::str::FromStr for RoleTagColumn {
    type Err = strum::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RoleTagColumn)
    }
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    /// JSON-encoded `[f64; 21]`; see `scheduler::weights_from_json`.
    pub fsrs_weights: String,
    pub request_retention: f64,
    pub new_cards_per_day: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub deck_id: DeckId,
    pub orthographic: String,
    pub phonetic: String,
    pub gloss: String,
    pub annotations: Option<String>,
    pub audio_blob_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    PromptFromForm,
    PromptFromGloss,
    PromptFromAudio,
}

impl CardType {
    pub const ALL: [CardType; 3] = [
        CardType::PromptFromForm,
        CardType::PromptFromGloss,
        CardType::PromptFromAudio,
    ];
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    #[sqlx(try_from = "String")]
    pub card_type: CardTypeColumn,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CardTypeColumn(pub CardType);

impl TryFrom<String> for CardTypeColumn {
    type Error = strum::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(CardTypeColumn)
    }
}

/// Rating ids are fixed at 0..=3 (again/hard/good/easy).
pub type RatingId = u8;

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn from_id(id: RatingId) -> Option<Rating> {
        match id {
            0 => Some(Rating::Again),
            1 => Some(Rating::Hard),
            2 => Some(Rating::Good),
            3 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn id(self) -> RatingId {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: EventId,
    pub card_id: CardId,
    pub user_id: UserId,
    pub rating: RatingId,
    pub reviewed_at: DateTime<Utc>,
    pub time_spent_ms: Option<i64>,
    pub user_answer: Option<String>,
    pub recording_blob_key: Option<String>,
    /// Server receipt time; unused by the fold, kept for audit.
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Queue {
    New,
    Learning,
    Review,
    Relearning,
}

/// Derived card state. Never the source of truth — a projection of the
/// event stream, optionally cached (`projector.rs`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputedCardState {
    pub card_id: CardId,
    pub queue: Queue,
    pub stability: f64,
    pub difficulty: f64,
    pub scheduled_days: f64,
    pub reps: u32,
    pub lapses: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub due_at: DateTime<Utc>,
    pub algorithm_version: String,
    /// Number of events folded to produce this state; part of the cache
    /// key alongside `last_reviewed_at`.
    pub event_count: u64,
}

#[derive(Clone, Debug, FromRow)]
pub struct DailyCount {
    pub user_id: UserId,
    pub deck_id: DeckId,
    pub date: chrono::NaiveDate,
    pub count: i64,
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Active,
    Removed,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub requester_id: UserId,
    pub recipient_id: UserId,
    #[sqlx(try_from = "String")]
    pub requester_role: RoleTagColumn,
    #[sqlx(try_from = "String")]
    pub status: RelationshipStatusColumn,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelationshipStatusColumn(pub RelationshipStatus);

impl TryFrom<String> for RelationshipStatusColumn {
    type Error = strum::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(RelationshipStatusColumn)
    }
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub id: InvitationId,
    pub inviter_id: UserId,
    pub recipient_email: String,
    #[sqlx(try_from = "String")]
    pub inviter_role: RoleTagColumn,
    #[sqlx(try_from = "String")]
    pub status: InvitationStatusColumn,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InvitationStatusColumn(pub InvitationStatus);

impl TryFrom<String> for InvitationStatusColumn {
    type Error = strum::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(InvitationStatusColumn)
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct SyncMetadata {
    pub user_id: UserId,
    pub last_event_at: DateTime<Utc>,
}

#[derive(Clone, Debug, FromRow)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
