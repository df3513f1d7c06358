//! Storage for the foundational aggregates (User, Deck, Note, Card,
//! Session) that every component reads through. Grounded on the
//! teacher's `api::note::create::create_notes`/`create_cards` for the
//! atomic note-plus-three-cards insert, and on `api::review`'s direct
//! `SqlitePool` query style generally.

use crate::{
    Error,
    model::{Card, CardType, Deck, Note, Session, SessionId, User, UserId},
    scheduler,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

pub async fn get_or_create_user_by_email(
    pool: &SqlitePool,
    email: &str,
    display_name: &str,
) -> Result<User, Error> {
    if let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?
    {
        return Ok(user);
    }
    let now = Utc::now();
    let id = sqlx::query_scalar::<_, UserId>(
        "INSERT INTO users (email, display_name, is_admin, role_tag, created_at) \
         VALUES (?, ?, FALSE, 'student', ?) RETURNING id",
    )
    .bind(email)
    .bind(display_name)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_user(pool, id).await
}

pub async fn get_user(pool: &SqlitePool, user_id: UserId) -> Result<User, Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {user_id} not found")))
}

pub async fn create_deck(
    pool: &SqlitePool,
    owner_id: UserId,
    name: &str,
    description: &str,
    new_cards_per_day: i64,
) -> Result<Deck, Error> {
    let now = Utc::now();
    let weights_json = scheduler::weights_to_json(&scheduler::DEFAULT_WEIGHTS);
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO decks (owner_id, name, description, fsrs_weights, request_retention, \
         new_cards_per_day, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .bind(description)
    .bind(&weights_json)
    .bind(scheduler::DEFAULT_REQUEST_RETENTION)
    .bind(new_cards_per_day)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_deck(pool, id).await
}

pub async fn get_deck(pool: &SqlitePool, deck_id: i64) -> Result<Deck, Error> {
    sqlx::query_as::<_, Deck>("SELECT * FROM decks WHERE id = ?")
        .bind(deck_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("deck {deck_id} not found")))
}

pub async fn assert_deck_owner(
    pool: &SqlitePool,
    deck_id: i64,
    user_id: UserId,
) -> Result<Deck, Error> {
    let deck = get_deck(pool, deck_id).await?;
    if deck.owner_id != user_id {
        return Err(Error::PermissionDenied(
            "user does not own this deck".to_string(),
        ));
    }
    Ok(deck)
}

/// Creates a Note and its three Cards atomically: a Note always has
/// exactly three Cards.
pub async fn create_note(
    pool: &SqlitePool,
    deck_id: i64,
    orthographic: &str,
    phonetic: &str,
    gloss: &str,
    annotations: Option<&str>,
) -> Result<(Note, Vec<Card>), Error> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let note_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO notes (deck_id, orthographic, phonetic, gloss, annotations, \
         audio_blob_key, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, ?, ?) RETURNING id",
    )
    .bind(deck_id)
    .bind(orthographic)
    .bind(phonetic)
    .bind(gloss)
    .bind(annotations)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let mut cards = Vec::with_capacity(CardType::ALL.len());
    for card_type in CardType::ALL {
        let card_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO cards (note_id, card_type, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(note_id)
        .bind(card_type.to_string())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        cards.push(card_id);
    }
    tx.commit().await?;

    let note = get_note(pool, note_id).await?;
    let mut card_rows = Vec::with_capacity(cards.len());
    for card_id in cards {
        card_rows.push(get_card(pool, card_id).await?);
    }
    Ok((note, card_rows))
}

pub async fn get_note(pool: &SqlitePool, note_id: i64) -> Result<Note, Error> {
    sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ?")
        .bind(note_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("note {note_id} not found")))
}

pub async fn get_card(pool: &SqlitePool, card_id: i64) -> Result<Card, Error> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = ?")
        .bind(card_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("card {card_id} not found")))
}

/// Returns the deck a card belongs to, by walking card -> note -> deck.
/// Used by the Event Log and Session Selector to check that a
/// ReviewEvent's card exists and the user owns the card's deck.
pub async fn deck_for_card(pool: &SqlitePool, card_id: i64) -> Result<Deck, Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT decks.id FROM decks JOIN notes ON notes.deck_id = decks.id JOIN cards ON cards.note_id = notes.id WHERE cards.id = ?")
            .bind(card_id)
            .fetch_optional(pool)
            .await?;
    let (deck_id,) = row.ok_or_else(|| Error::NotFound(format!("card {card_id} not found")))?;
    get_deck(pool, deck_id).await
}

pub async fn create_session(
    pool: &SqlitePool,
    user_id: UserId,
    duration_days: i64,
) -> Result<Session, Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::days(duration_days);
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(Session {
        id,
        user_id,
        expires_at,
        created_at: now,
    })
}

/// Evicts the session if expired and returns it only when still valid.
pub async fn get_valid_session(
    pool: &SqlitePool,
    session_id: &SessionId,
) -> Result<Session, Error> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::Unauthenticated)?;
    if session.expires_at <= Utc::now() {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(pool)
            .await?;
        return Err(Error::Unauthenticated);
    }
    Ok(session)
}

pub async fn assert_admin(pool: &SqlitePool, user_id: UserId) -> Result<(), Error> {
    let user = get_user(pool, user_id).await?;
    if !user.is_admin {
        return Err(Error::PermissionDenied("user is not an admin".to_string()));
    }
    Ok(())
}

/// Every blob key this server has ever recorded a reference to. A best
/// effort listing for `GET /admin/orphans`: without a concrete
/// `BlobStore` the server cannot itself tell which keys are
/// unreferenced in the store, only which ones it knows about.
pub async fn list_referenced_blob_keys(pool: &SqlitePool) -> Result<Vec<String>, Error> {
    let mut keys: Vec<String> = sqlx::query_scalar("SELECT audio_blob_key FROM notes WHERE audio_blob_key IS NOT NULL")
        .fetch_all(pool)
        .await?;
    let recordings: Vec<String> = sqlx::query_scalar(
        "SELECT recording_blob_key FROM review_events WHERE recording_blob_key IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;
    keys.extend(recordings);
    Ok(keys)
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
