//! The Relationship Graph. Requests, accepts, removes tutor<->student
//! relationships; promotes deferred invitations on sign-up; gates every
//! downstream cross-user resource. Uses explicit `Error` variants and
//! pre-read-then-insert uniqueness checks, accepting a benign race
//! between the check and the insert rather than serializing on it.

use crate::{
    Error,
    model::{
        AI_TUTOR_USER_ID, InvitationId, InvitationStatus, PendingInvitation, Relationship,
        RelationshipId, RelationshipStatus, RoleTag, User, UserId,
    },
    store,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

/// Either a freshly (or already) pending Relationship, or a deferred
/// invitation, depending on whether the recipient email resolves to an
/// existing user.
#[derive(Clone, Debug)]
pub enum RelationshipRequestOutcome {
    Relationship(Relationship),
    Invitation(PendingInvitation),
}

pub async fn request_relationship(
    pool: &SqlitePool,
    requester_id: UserId,
    recipient_email: &str,
    requester_role: RoleTag,
    invitation_expiry_days: i64,
) -> Result<RelationshipRequestOutcome, Error> {
    let requester = store::get_user(pool, requester_id).await?;
    if requester.email.as_deref() == Some(recipient_email) {
        return Err(Error::Conflict(
            "cannot create a relationship with yourself".to_string(),
        ));
    }

    let recipient: Option<User> =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(recipient_email)
            .fetch_optional(pool)
            .await?;

    match recipient {
        Some(recipient) => {
            if recipient.id == requester_id {
                return Err(Error::Conflict(
                    "cannot create a relationship with yourself".to_string(),
                ));
            }
            if let Some(existing) = find_non_removed_relationship(pool, requester_id, recipient.id).await? {
                return Ok(RelationshipRequestOutcome::Relationship(existing));
            }
            let relationship =
                insert_relationship(pool, requester_id, recipient.id, requester_role, RelationshipStatus::Pending, None)
                    .await?;
            Ok(RelationshipRequestOutcome::Relationship(relationship))
        }
        None => {
            if let Some(existing) = find_pending_invitation(pool, requester_id, recipient_email).await? {
                return Ok(RelationshipRequestOutcome::Invitation(existing));
            }
            let now = Utc::now();
            let expires_at = now + Duration::days(invitation_expiry_days.max(30));
            let id = sqlx::query_scalar::<_, InvitationId>(
                "INSERT INTO pending_invitations (inviter_id, recipient_email, inviter_role, \
                 status, created_at, expires_at) VALUES (?, ?, ?, 'pending', ?, ?) RETURNING id",
            )
            .bind(requester_id)
            .bind(recipient_email)
            .bind(requester_role.to_string())
            .bind(now)
            .bind(expires_at)
            .fetch_one(pool)
            .await?;
            let invitation = get_invitation(pool, id).await?;
            Ok(RelationshipRequestOutcome::Invitation(invitation))
        }
    }
}

async fn find_non_removed_relationship(
    pool: &SqlitePool,
    a: UserId,
    b: UserId,
) -> Result<Option<Relationship>, Error> {
    let (low, high) = ordered_pair(a, b);
    let relationship = sqlx::query_as::<_, Relationship>(
        "SELECT * FROM relationships WHERE \
         ((requester_id = ? AND recipient_id = ?) OR (requester_id = ? AND recipient_id = ?)) \
         AND status != 'removed'",
    )
    .bind(low)
    .bind(high)
    .bind(high)
    .bind(low)
    .fetch_optional(pool)
    .await?;
    Ok(relationship)
}

async fn find_pending_invitation(
    pool: &SqlitePool,
    inviter_id: UserId,
    recipient_email: &str,
) -> Result<Option<PendingInvitation>, Error> {
    let invitation = sqlx::query_as::<_, PendingInvitation>(
        "SELECT * FROM pending_invitations WHERE inviter_id = ? AND recipient_email = ? \
         AND status = 'pending' AND expires_at > ?",
    )
    .bind(inviter_id)
    .bind(recipient_email)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;
    Ok(invitation)
}

fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

async fn insert_relationship(
    pool: &SqlitePool,
    requester_id: UserId,
    recipient_id: UserId,
    requester_role: RoleTag,
    status: RelationshipStatus,
    accepted_at: Option<DateTime<Utc>>,
) -> Result<Relationship, Error> {
    let now = Utc::now();
    let id = sqlx::query_scalar::<_, RelationshipId>(
        "INSERT INTO relationships (requester_id, recipient_id, requester_role, status, \
         created_at, accepted_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(requester_id)
    .bind(recipient_id)
    .bind(requester_role.to_string())
    .bind(status.to_string())
    .bind(now)
    .bind(accepted_at)
    .fetch_one(pool)
    .await?;
    get_relationship(pool, id).await
}

pub async fn get_relationship(pool: &SqlitePool, id: RelationshipId) -> Result<Relationship, Error> {
    sqlx::query_as::<_, Relationship>("SELECT * FROM relationships WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("relationship {id} not found")))
}

pub async fn get_invitation(pool: &SqlitePool, id: InvitationId) -> Result<PendingInvitation, Error> {
    sqlx::query_as::<_, PendingInvitation>("SELECT * FROM pending_invitations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("invitation {id} not found")))
}

/// Only the recipient may accept a pending relationship.
pub async fn accept_relationship(
    pool: &SqlitePool,
    relationship_id: RelationshipId,
    user_id: UserId,
) -> Result<Relationship, Error> {
    let relationship = get_relationship(pool, relationship_id).await?;
    if relationship.recipient_id != user_id {
        return Err(Error::PermissionDenied(
            "only the recipient may accept this relationship".to_string(),
        ));
    }
    if relationship.status.0 != RelationshipStatus::Pending {
        return Err(Error::Conflict(
            "relationship is not pending".to_string(),
        ));
    }
    let now = Utc::now();
    sqlx::query("UPDATE relationships SET status = 'active', accepted_at = ? WHERE id = ?")
        .bind(now)
        .bind(relationship_id)
        .execute(pool)
        .await?;
    get_relationship(pool, relationship_id).await
}

/// Either participant may remove a relationship, from any status.
pub async fn remove_relationship(
    pool: &SqlitePool,
    relationship_id: RelationshipId,
    user_id: UserId,
) -> Result<Relationship, Error> {
    let relationship = get_relationship(pool, relationship_id).await?;
    if relationship.requester_id != user_id && relationship.recipient_id != user_id {
        return Err(Error::PermissionDenied(
            "user is not a participant in this relationship".to_string(),
        ));
    }
    sqlx::query("UPDATE relationships SET status = 'removed' WHERE id = ?")
        .bind(relationship_id)
        .execute(pool)
        .await?;
    get_relationship(pool, relationship_id).await
}

/// Only the inviter may cancel an invitation, and only while pending.
pub async fn cancel_invitation(
    pool: &SqlitePool,
    invitation_id: InvitationId,
    user_id: UserId,
) -> Result<PendingInvitation, Error> {
    let invitation = get_invitation(pool, invitation_id).await?;
    if invitation.inviter_id != user_id {
        return Err(Error::PermissionDenied(
            "only the inviter may cancel this invitation".to_string(),
        ));
    }
    if invitation.status.0 != InvitationStatus::Pending {
        return Err(Error::Conflict("invitation is not pending".to_string()));
    }
    sqlx::query("UPDATE pending_invitations SET status = 'cancelled' WHERE id = ?")
        .bind(invitation_id)
        .execute(pool)
        .await?;
    get_invitation(pool, invitation_id).await
}

/// Promotes every still-pending, unexpired invitation addressed to
/// `new_user`'s email into an active Relationship, atomically with
/// marking the invitation accepted. Per-invitation failures are logged
/// and do not abort the rest.
pub async fn process_pending_invitations_on_sign_up(
    pool: &SqlitePool,
    new_user: &User,
) -> Result<u32, Error> {
    let Some(email) = new_user.email.as_deref() else {
        return Ok(0);
    };
    let invitations = sqlx::query_as::<_, PendingInvitation>(
        "SELECT * FROM pending_invitations WHERE recipient_email = ? AND status = 'pending' AND expires_at > ?",
    )
    .bind(email)
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;

    let mut promoted = 0;
    for invitation in invitations {
        match promote_invitation(pool, &invitation, new_user.id).await {
            Ok(()) => promoted += 1,
            Err(e) => {
                log::error!(
                    "failed to promote invitation {} for user {}: {e}",
                    invitation.id,
                    new_user.id
                );
            }
        }
    }
    Ok(promoted)
}

async fn promote_invitation(
    pool: &SqlitePool,
    invitation: &PendingInvitation,
    new_user_id: UserId,
) -> Result<(), Error> {
    if find_non_removed_relationship(pool, invitation.inviter_id, new_user_id)
        .await?
        .is_some()
    {
        // A relationship already exists (e.g. a concurrent request
        // beat us to it); mark the invitation accepted anyway since its
        // intent is satisfied.
        sqlx::query("UPDATE pending_invitations SET status = 'accepted' WHERE id = ?")
            .bind(invitation.id)
            .execute(pool)
            .await?;
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO relationships (requester_id, recipient_id, requester_role, status, \
         created_at, accepted_at) VALUES (?, ?, ?, 'active', ?, ?)",
    )
    .bind(invitation.inviter_id)
    .bind(new_user_id)
    .bind(invitation.inviter_role.0.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE pending_invitations SET status = 'accepted' WHERE id = ?")
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Binds a brand-new user to the synthetic AI tutor with an active
/// relationship, skipped for the AI tutor itself.
pub async fn bind_to_ai_tutor(pool: &SqlitePool, new_user_id: UserId) -> Result<(), Error> {
    if new_user_id == AI_TUTOR_USER_ID {
        return Ok(());
    }
    if find_non_removed_relationship(pool, AI_TUTOR_USER_ID, new_user_id)
        .await?
        .is_some()
    {
        return Ok(());
    }
    insert_relationship(
        pool,
        AI_TUTOR_USER_ID,
        new_user_id,
        RoleTag::Tutor,
        RelationshipStatus::Active,
        Some(Utc::now()),
    )
    .await?;
    Ok(())
}

/// A capability handle proving `user_id` has active access through
/// `relationship`, produced only by `verify_access`. Callers hold this
/// instead of re-checking role strings.
#[derive(Clone, Debug)]
pub struct AccessGrant {
    pub relationship: Relationship,
    pub user_id: UserId,
}

impl AccessGrant {
    pub fn counterpart(&self) -> UserId {
        if self.relationship.requester_id == self.user_id {
            self.relationship.recipient_id
        } else {
            self.relationship.requester_id
        }
    }
}

/// Required in front of every conversation, shared deck, progress view,
/// and tutor-review request.
pub async fn verify_access(
    pool: &SqlitePool,
    relationship_id: RelationshipId,
    user_id: UserId,
) -> Result<AccessGrant, Error> {
    let relationship = get_relationship(pool, relationship_id).await?;
    let is_participant = relationship.requester_id == user_id || relationship.recipient_id == user_id;
    if !is_participant || relationship.status.0 != RelationshipStatus::Active {
        return Err(Error::PermissionDenied(
            "not an active participant in this relationship".to_string(),
        ));
    }
    Ok(AccessGrant { relationship, user_id })
}

#[derive(Clone, Debug, Default)]
pub struct RelationshipsView {
    pub tutors: Vec<Relationship>,
    pub students: Vec<Relationship>,
    pub pending_in: Vec<Relationship>,
    pub pending_out: Vec<Relationship>,
    pub pending_invitations: Vec<PendingInvitation>,
}

/// Backs `GET /relationships`.
pub async fn categorised_view(pool: &SqlitePool, user_id: UserId) -> Result<RelationshipsView, Error> {
    let relationships = sqlx::query_as::<_, Relationship>(
        "SELECT * FROM relationships WHERE (requester_id = ? OR recipient_id = ?) AND status != 'removed'",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut view = RelationshipsView::default();
    for relationship in relationships {
        if relationship.status.0 == RelationshipStatus::Pending {
            if relationship.recipient_id == user_id {
                view.pending_in.push(relationship);
            } else {
                view.pending_out.push(relationship);
            }
            continue;
        }
        // Active: tutor is whichever participant matches requester_role=tutor.
        let user_is_tutor = (relationship.requester_id == user_id && relationship.requester_role.0 == RoleTag::Tutor)
            || (relationship.recipient_id == user_id && relationship.requester_role.0 == RoleTag::Student);
        if user_is_tutor {
            view.students.push(relationship);
        } else {
            view.tutors.push(relationship);
        }
    }

    view.pending_invitations = sqlx::query_as::<_, PendingInvitation>(
        "SELECT * FROM pending_invitations WHERE inviter_id = ? AND status = 'pending'",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlx::SqlitePool;

    async fn make_user(pool: &SqlitePool, email: &str) -> User {
        store::get_or_create_user_by_email(pool, email, email).await.unwrap()
    }

    #[sqlx::test]
    async fn self_invite_is_rejected_and_writes_nothing(pool: SqlitePool) {
        let alice = make_user(&pool, "alice@example.com").await;
        let result = request_relationship(&pool, alice.id, "alice@example.com", RoleTag::Tutor, 30).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relationships")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn duplicate_request_returns_the_same_pending_relationship(pool: SqlitePool) {
        let alice = make_user(&pool, "alice@example.com").await;
        let bob = make_user(&pool, "bob@example.com").await;
        let first = request_relationship(&pool, alice.id, &bob.email.clone().unwrap(), RoleTag::Tutor, 30)
            .await
            .unwrap();
        let second = request_relationship(&pool, alice.id, &bob.email.unwrap(), RoleTag::Tutor, 30)
            .await
            .unwrap();
        match (first, second) {
            (RelationshipRequestOutcome::Relationship(a), RelationshipRequestOutcome::Relationship(b)) => {
                assert_eq!(a.id, b.id);
            }
            other => panic!("expected two relationships, got {other:?}"),
        }
    }

    #[sqlx::test]
    async fn deferred_invitation_promotes_to_active_relationship_on_sign_up(pool: SqlitePool) {
        let alice = make_user(&pool, "alice@example.com").await;
        let outcome = request_relationship(&pool, alice.id, "bob@example.com", RoleTag::Tutor, 30)
            .await
            .unwrap();
        assert!(matches!(outcome, RelationshipRequestOutcome::Invitation(_)));

        let bob = make_user(&pool, "bob@example.com").await;
        let promoted = process_pending_invitations_on_sign_up(&pool, &bob).await.unwrap();
        assert_eq!(promoted, 1);

        let relationships = sqlx::query_as::<_, Relationship>(
            "SELECT * FROM relationships WHERE requester_id = ? AND recipient_id = ? AND status = 'active'",
        )
        .bind(alice.id)
        .bind(bob.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(relationships.len(), 1);

        let remaining_pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_invitations WHERE recipient_email = ? AND status = 'pending'",
        )
        .bind("bob@example.com")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(remaining_pending, 0);
    }

    #[sqlx::test]
    async fn at_most_one_non_removed_relationship_per_pair(pool: SqlitePool) {
        let alice = make_user(&pool, "alice@example.com").await;
        let bob = make_user(&pool, "bob@example.com").await;
        request_relationship(&pool, alice.id, &bob.email.clone().unwrap(), RoleTag::Tutor, 30)
            .await
            .unwrap();
        request_relationship(&pool, bob.id, &alice.email.unwrap(), RoleTag::Student, 30)
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relationships WHERE status != 'removed'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn only_recipient_may_accept(pool: SqlitePool) {
        let alice = make_user(&pool, "alice@example.com").await;
        let bob = make_user(&pool, "bob@example.com").await;
        let outcome = request_relationship(&pool, alice.id, &bob.email.clone().unwrap(), RoleTag::Tutor, 30)
            .await
            .unwrap();
        let RelationshipRequestOutcome::Relationship(relationship) = outcome else {
            panic!("expected relationship")
        };
        let result = accept_relationship(&pool, relationship.id, alice.id).await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
        let accepted = accept_relationship(&pool, relationship.id, bob.id).await.unwrap();
        assert_eq!(accepted.status.0, RelationshipStatus::Active);
    }
}
