//! The Event Log. Append-only store of ReviewEvents, idempotent on the
//! client-chosen id, with a change-feed and per-card replay.

use crate::{
    Error,
    model::{EventId, ReviewEvent, UserId},
    store,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// A single event as submitted by a client, prior to acceptance.
#[derive(Clone, Debug)]
pub struct NewReviewEvent {
    pub id: EventId,
    pub card_id: i64,
    pub rating: u8,
    pub reviewed_at: DateTime<Utc>,
    pub time_spent_ms: Option<i64>,
    pub user_answer: Option<String>,
    pub recording_blob_key: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendBatchResult {
    pub created: u32,
    pub skipped: u32,
}

/// Rows are chunked to stay well under SQLite's default bound-parameter
/// limit.
const MAX_EVENTS_PER_INSERT: usize = 100;

/// Verifies ownership for every event up front and rejects the whole
/// batch on any failure (the caller retries with offenders removed);
/// accepted events are inserted insert-if-absent.
pub async fn append_batch(
    pool: &SqlitePool,
    user_id: UserId,
    events: &[NewReviewEvent],
) -> Result<AppendBatchResult, Error> {
    if events.is_empty() {
        return Ok(AppendBatchResult::default());
    }

    for event in events {
        if event.id.trim().is_empty() {
            return Err(Error::InvalidArgument("event id must not be empty".to_string()));
        }
        if crate::model::Rating::from_id(event.rating).is_none() {
            return Err(Error::InvalidArgument(format!(
                "invalid rating {}",
                event.rating
            )));
        }
        let card = store::get_card(pool, event.card_id).await?;
        let deck = store::deck_for_card(pool, card.id).await?;
        if deck.owner_id != user_id {
            return Err(Error::PermissionDenied(format!(
                "user does not own card {}",
                event.card_id
            )));
        }
    }

    let mut tx = pool.begin().await?;
    let mut created = 0u32;
    let now = Utc::now();
    for chunk in events.chunks(MAX_EVENTS_PER_INSERT) {
        for event in chunk {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO review_events \
                 (id, card_id, user_id, rating, reviewed_at, time_spent_ms, user_answer, \
                  recording_blob_key, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.id)
            .bind(event.card_id)
            .bind(user_id)
            .bind(event.rating)
            .bind(event.reviewed_at)
            .bind(event.time_spent_ms)
            .bind(&event.user_answer)
            .bind(&event.recording_blob_key)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                created += 1;
            }
        }
    }

    let max_reviewed_at = events.iter().map(|e| e.reviewed_at).max();
    if let Some(max_reviewed_at) = max_reviewed_at {
        sqlx::query(
            "INSERT INTO sync_metadata (user_id, last_event_at) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET last_event_at = MAX(last_event_at, excluded.last_event_at)",
        )
        .bind(user_id)
        .bind(max_reviewed_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(AppendBatchResult {
        created,
        skipped: events.len() as u32 - created,
    })
}

#[derive(Clone, Debug)]
pub struct EventsSincePage {
    pub events: Vec<ReviewEvent>,
    pub has_more: bool,
    pub server_time: DateTime<Utc>,
}

/// The change-feed. Ordered by `reviewed_at` then `id` (tie-break),
/// bounded by `limit` (default 1000).
pub async fn events_since(
    pool: &SqlitePool,
    user_id: UserId,
    since: DateTime<Utc>,
    limit: u32,
) -> Result<EventsSincePage, Error> {
    let limit = if limit == 0 { 1000 } else { limit };
    let mut rows = sqlx::query_as::<_, ReviewEvent>(
        "SELECT * FROM review_events WHERE user_id = ? AND reviewed_at > ? \
         ORDER BY reviewed_at ASC, id ASC LIMIT ?",
    )
    .bind(user_id)
    .bind(since)
    .bind(i64::from(limit) + 1)
    .fetch_all(pool)
    .await?;

    let has_more = rows.len() > limit as usize;
    if has_more {
        rows.truncate(limit as usize);
    }
    Ok(EventsSincePage {
        events: rows,
        has_more,
        server_time: Utc::now(),
    })
}

/// All events for a card owned by the user, ascending by `reviewed_at`.
pub async fn events_for_card(
    pool: &SqlitePool,
    card_id: i64,
    user_id: UserId,
) -> Result<Vec<ReviewEvent>, Error> {
    let card = store::get_card(pool, card_id).await?;
    let deck = store::deck_for_card(pool, card.id).await?;
    if deck.owner_id != user_id {
        return Err(Error::PermissionDenied(
            "user does not own this card".to_string(),
        ));
    }
    events_for_card_unchecked(pool, card_id).await
}

/// Internal replay fetch with no ownership check, for use by the State
/// Projector and Session Selector, which already operate within a
/// request whose ownership was established upstream.
pub async fn events_for_card_unchecked(
    pool: &SqlitePool,
    card_id: i64,
) -> Result<Vec<ReviewEvent>, Error> {
    let events = sqlx::query_as::<_, ReviewEvent>(
        "SELECT * FROM review_events WHERE card_id = ? ORDER BY reviewed_at ASC, id ASC",
    )
    .bind(card_id)
    .fetch_all(pool)
    .await?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use pretty_assertions::assert_eq;
    use sqlx::SqlitePool;

    async fn seed(pool: &SqlitePool) -> (i64, i64) {
        let user = store::get_or_create_user_by_email(pool, "alice@example.com", "Alice")
            .await
            .unwrap();
        let deck = store::create_deck(pool, user.id, "Spanish", "", 20).await.unwrap();
        let (_, cards) = store::create_note(pool, deck.id, "hola", "OH-la", "hello", None)
            .await
            .unwrap();
        (user.id, cards[0].id)
    }

    #[sqlx::test]
    async fn append_batch_is_idempotent(pool: SqlitePool) {
        let (user_id, card_id) = seed(&pool).await;
        let events = vec![NewReviewEvent {
            id: "e1".to_string(),
            card_id,
            rating: 2,
            reviewed_at: Utc::now(),
            time_spent_ms: None,
            user_answer: None,
            recording_blob_key: None,
        }];
        let first = append_batch(&pool, user_id, &events).await.unwrap();
        assert_eq!(first, AppendBatchResult { created: 1, skipped: 0 });
        let second = append_batch(&pool, user_id, &events).await.unwrap();
        assert_eq!(second, AppendBatchResult { created: 0, skipped: 1 });

        let stored = events_for_card(&pool, card_id, user_id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[sqlx::test]
    async fn append_batch_rejects_events_for_unowned_cards(pool: SqlitePool) {
        let (_user_id, card_id) = seed(&pool).await;
        let other = store::get_or_create_user_by_email(&pool, "bob@example.com", "Bob")
            .await
            .unwrap();
        let events = vec![NewReviewEvent {
            id: "e1".to_string(),
            card_id,
            rating: 2,
            reviewed_at: Utc::now(),
            time_spent_ms: None,
            user_answer: None,
            recording_blob_key: None,
        }];
        let result = append_batch(&pool, other.id, &events).await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }

    #[sqlx::test]
    async fn events_since_respects_the_exclusive_lower_bound(pool: SqlitePool) {
        let (user_id, card_id) = seed(&pool).await;
        let t = Utc::now();
        let events = vec![NewReviewEvent {
            id: "e1".to_string(),
            card_id,
            rating: 2,
            reviewed_at: t,
            time_spent_ms: None,
            user_answer: None,
            recording_blob_key: None,
        }];
        append_batch(&pool, user_id, &events).await.unwrap();
        let page = events_since(&pool, user_id, t - chrono::Duration::milliseconds(1), 1000)
            .await
            .unwrap();
        assert_eq!(page.events.len(), 1);
        assert!(!page.has_more);
    }
}
