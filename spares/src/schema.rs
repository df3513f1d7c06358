//! Wire-facing request/response DTOs. Field names and JSON shapes are
//! stable API surface; kept separate from `model.rs` so storage
//! representation can change without moving the API.

use crate::{
    event_log::{AppendBatchResult, EventsSincePage, NewReviewEvent},
    model::{
        EventId, InvitationId, PendingInvitation, Relationship, RelationshipId, ReviewEvent,
        RoleTag, UserId,
    },
    relationships::RelationshipsView,
    scheduler::IntervalPreview,
    selector::{NextCardResult, QueueCounts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub struct ReviewEventRequest {
    pub id: EventId,
    pub card_id: i64,
    pub rating: u8,
    pub reviewed_at: DateTime<Utc>,
    pub time_spent_ms: Option<i64>,
    pub user_answer: Option<String>,
    pub recording_blob_key: Option<String>,
}

impl From<ReviewEventRequest> for NewReviewEvent {
    fn from(request: ReviewEventRequest) -> Self {
        NewReviewEvent {
            id: request.id,
            card_id: request.card_id,
            rating: request.rating,
            reviewed_at: request.reviewed_at,
            time_spent_ms: request.time_spent_ms,
            user_answer: request.user_answer,
            recording_blob_key: request.recording_blob_key,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppendReviewsRequest {
    pub events: Vec<ReviewEventRequest>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AppendReviewsResponse {
    pub created: u32,
    pub skipped: u32,
}

impl From<AppendBatchResult> for AppendReviewsResponse {
    fn from(result: AppendBatchResult) -> Self {
        Self { created: result.created, skipped: result.skipped }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventsSinceQuery {
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct EventsSinceResponse {
    pub events: Vec<ReviewEvent>,
    pub has_more: bool,
    pub server_time: DateTime<Utc>,
}

impl From<EventsSincePage> for EventsSinceResponse {
    fn from(page: EventsSincePage) -> Self {
        Self { events: page.events, has_more: page.has_more, server_time: page.server_time }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NextCardQuery {
    pub deck_id: Option<i64>,
    #[serde(default)]
    pub exclude_notes: Vec<i64>,
    #[serde(default)]
    pub ignore_daily_limit: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SelectedCardResponse {
    pub card_id: i64,
    pub note_id: i64,
    pub queue: String,
    pub due_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NextCardResponse {
    pub card: Option<SelectedCardResponse>,
    pub counts: QueueCounts,
    #[serde(rename = "intervalPreviews")]
    pub interval_previews: Vec<IntervalPreviewResponse>,
    #[serde(rename = "hasMoreNewCards", skip_serializing_if = "Option::is_none")]
    pub has_more_new_cards: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IntervalPreviewResponse {
    pub rating: u8,
    pub next_review_at: DateTime<Utc>,
    pub interval_label: String,
}

impl From<IntervalPreview> for IntervalPreviewResponse {
    fn from(preview: IntervalPreview) -> Self {
        Self {
            rating: preview.rating.id(),
            next_review_at: preview.next_review_at,
            interval_label: preview.interval_label,
        }
    }
}

impl From<NextCardResult> for NextCardResponse {
    fn from(result: NextCardResult) -> Self {
        let (card, interval_previews) = match result.card {
            Some(selected) => (
                Some(SelectedCardResponse {
                    card_id: selected.card_id,
                    note_id: selected.note_id,
                    queue: selected.state.queue.to_string(),
                    due_at: selected.state.due_at,
                }),
                selected
                    .interval_previews
                    .into_iter()
                    .map(IntervalPreviewResponse::from)
                    .collect(),
            ),
            None => (None, Vec::new()),
        };
        Self {
            card,
            counts: result.counts,
            interval_previews,
            has_more_new_cards: result.has_more_new_cards,
        }
    }
}

impl Serialize for QueueCounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("QueueCounts", 3)?;
        s.serialize_field("new", &self.new)?;
        s.serialize_field("learning", &self.learning)?;
        s.serialize_field("review", &self.review)?;
        s.end()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReviewRequest {
    pub card_id: i64,
    pub rating: u8,
    pub time_spent_ms: Option<i64>,
    pub user_answer: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewResponse {
    pub event_id: EventId,
    #[serde(rename = "intervalPreviews")]
    pub applied_interval: IntervalPreviewResponse,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RequestRelationshipRequest {
    pub recipient_email: String,
    pub role: RoleTag,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestRelationshipResponse {
    Relationship(RelationshipResponse),
    Invitation(InvitationResponse),
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationshipResponse {
    pub id: RelationshipId,
    pub requester_id: UserId,
    pub recipient_id: UserId,
    pub requester_role: RoleTag,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<Relationship> for RelationshipResponse {
    fn from(r: Relationship) -> Self {
        Self {
            id: r.id,
            requester_id: r.requester_id,
            recipient_id: r.recipient_id,
            requester_role: r.requester_role.0,
            status: r.status.0.to_string(),
            created_at: r.created_at,
            accepted_at: r.accepted_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct InvitationResponse {
    pub id: InvitationId,
    pub inviter_id: UserId,
    pub recipient_email: String,
    pub inviter_role: RoleTag,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<PendingInvitation> for InvitationResponse {
    fn from(i: PendingInvitation) -> Self {
        Self {
            id: i.id,
            inviter_id: i.inviter_id,
            recipient_email: i.recipient_email,
            inviter_role: i.inviter_role.0,
            status: i.status.0.to_string(),
            created_at: i.created_at,
            expires_at: i.expires_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationshipsViewResponse {
    pub tutors: Vec<RelationshipResponse>,
    pub students: Vec<RelationshipResponse>,
    pub pending_in: Vec<RelationshipResponse>,
    pub pending_out: Vec<RelationshipResponse>,
    pub pending_invitations: Vec<InvitationResponse>,
}

impl From<RelationshipsView> for RelationshipsViewResponse {
    fn from(view: RelationshipsView) -> Self {
        Self {
            tutors: view.tutors.into_iter().map(Into::into).collect(),
            students: view.students.into_iter().map(Into::into).collect(),
            pending_in: view.pending_in.into_iter().map(Into::into).collect(),
            pending_out: view.pending_out.into_iter().map(Into::into).collect(),
            pending_invitations: view.pending_invitations.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub email: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
