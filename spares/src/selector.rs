//! The Session Selector. Picks the next card to study given a deck
//! filter, daily budgets, an exclusion set, and a tiered per-queue
//! priority ordering.

use crate::{
    Error,
    helpers::utc_day_bounds,
    model::{CardId, ComputedCardState, DeckId, NoteId, Queue, UserId},
    projector,
    scheduler::{self, IntervalPreview, SchedulerParams},
    store,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub new: u32,
    pub learning: u32,
    pub review: u32,
}

#[derive(Clone, Debug)]
pub struct SelectedCard {
    pub card_id: CardId,
    pub note_id: NoteId,
    pub state: ComputedCardState,
    pub interval_previews: Vec<IntervalPreview>,
}

#[derive(Clone, Debug)]
pub struct NextCardResult {
    pub card: Option<SelectedCard>,
    pub counts: QueueCounts,
    /// Only populated when `card` is `None`.
    pub has_more_new_cards: Option<bool>,
}

struct Candidate {
    card_id: CardId,
    note_id: NoteId,
    deck_id: DeckId,
    state: ComputedCardState,
}

/// `deck_id = None` scopes the search to every deck the user owns;
/// `exclude_notes` are notes already shown this sitting.
pub async fn next_card(
    pool: &SqlitePool,
    user_id: UserId,
    deck_id: Option<DeckId>,
    exclude_notes: &[NoteId],
    ignore_daily_limit: bool,
    algorithm_version: &str,
) -> Result<NextCardResult, Error> {
    let now = Utc::now();
    let deck_ids = scope_decks(pool, user_id, deck_id).await?;
    let candidates = load_candidates(pool, &deck_ids, algorithm_version).await?;
    let candidates: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| !exclude_notes.contains(&c.note_id))
        .collect();

    let new_budget = new_card_budget(pool, user_id, &deck_ids, now, ignore_daily_limit).await?;

    let result = select(&candidates, now, &new_budget);
    let counts = queue_counts(&candidates, now, &new_budget);

    let card = match result {
        Some(candidate) => {
            let deck = store::get_deck(pool, candidate.deck_id).await?;
            let params = SchedulerParams::for_deck(&deck, algorithm_version)?;
            let previews = scheduler::preview_intervals(&candidate.state, now, &params)?;
            Some(SelectedCard {
                card_id: candidate.card_id,
                note_id: candidate.note_id,
                state: candidate.state.clone(),
                interval_previews: previews,
            })
        }
        None => None,
    };

    let has_more_new_cards = if card.is_none() {
        let unlimited_budget = HashMap::from_iter(deck_ids.iter().map(|id| (*id, u32::MAX)));
        Some(pick_new_or_review(&candidates, now, &unlimited_budget).is_some())
    } else {
        None
    };

    Ok(NextCardResult {
        card,
        counts,
        has_more_new_cards,
    })
}

/// Backs `GET /cards/queue-counts` without picking a card.
pub async fn counts_only(
    pool: &SqlitePool,
    user_id: UserId,
    deck_id: Option<DeckId>,
    algorithm_version: &str,
) -> Result<QueueCounts, Error> {
    let now = Utc::now();
    let deck_ids = scope_decks(pool, user_id, deck_id).await?;
    let candidates = load_candidates(pool, &deck_ids, algorithm_version).await?;
    let new_budget = new_card_budget(pool, user_id, &deck_ids, now, false).await?;
    Ok(queue_counts(&candidates, now, &new_budget))
}

async fn scope_decks(
    pool: &SqlitePool,
    user_id: UserId,
    deck_id: Option<DeckId>,
) -> Result<Vec<DeckId>, Error> {
    if let Some(deck_id) = deck_id {
        store::assert_deck_owner(pool, deck_id, user_id).await?;
        return Ok(vec![deck_id]);
    }
    let rows: Vec<(DeckId,)> = sqlx::query_as("SELECT id FROM decks WHERE owner_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn load_candidates(
    pool: &SqlitePool,
    deck_ids: &[DeckId],
    algorithm_version: &str,
) -> Result<Vec<Candidate>, Error> {
    if deck_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = deck_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT cards.id AS card_id, notes.id AS note_id, notes.deck_id AS deck_id \
         FROM cards JOIN notes ON cards.note_id = notes.id \
         WHERE notes.deck_id IN ({placeholders})"
    );
    let mut q = sqlx::query_as::<_, (CardId, NoteId, DeckId)>(&query);
    for id in deck_ids {
        q = q.bind(id);
    }
    let rows = q.fetch_all(pool).await?;

    let mut by_deck: HashMap<DeckId, Vec<(CardId, NoteId)>> = HashMap::new();
    for (card_id, note_id, deck_id) in rows {
        by_deck.entry(deck_id).or_default().push((card_id, note_id));
    }

    let mut candidates = Vec::new();
    for (deck_id, cards) in by_deck {
        let deck = store::get_deck(pool, deck_id).await?;
        let params = SchedulerParams::for_deck(&deck, algorithm_version)?;
        let card_ids: Vec<CardId> = cards.iter().map(|(id, _)| *id).collect();
        let states = projector::get_card_states(pool, &card_ids, &params).await?;
        for (card_id, note_id) in cards {
            if let Some(state) = states.get(&card_id) {
                candidates.push(Candidate { card_id, note_id, deck_id, state: state.clone() });
            }
        }
    }
    Ok(candidates)
}

async fn new_card_budget(
    pool: &SqlitePool,
    user_id: UserId,
    deck_ids: &[DeckId],
    now: DateTime<Utc>,
    ignore_daily_limit: bool,
) -> Result<HashMap<DeckId, u32>, Error> {
    let mut budget = HashMap::new();
    let (day_start, _) = utc_day_bounds(&now);
    for &deck_id in deck_ids {
        if ignore_daily_limit {
            budget.insert(deck_id, u32::MAX);
            continue;
        }
        let deck = store::get_deck(pool, deck_id).await?;
        let today_count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(count, 0) FROM daily_counts WHERE user_id = ? AND deck_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(deck_id)
        .bind(day_start.date_naive())
        .fetch_optional(pool)
        .await?
        .unwrap_or(0);
        let remaining = (deck.new_cards_per_day - today_count).max(0);
        budget.insert(deck_id, remaining as u32);
    }
    Ok(budget)
}

fn select<'a>(
    candidates: &'a [Candidate],
    now: DateTime<Utc>,
    new_budget: &HashMap<DeckId, u32>,
) -> Option<&'a Candidate> {
    pick_overdue_learning(candidates, now)
        .or_else(|| pick_new_or_review(candidates, now, new_budget))
        .or_else(|| pick_learning_cooldown(candidates, now))
}

/// Rule 1: LEARNING/RELEARNING due now, weighted by how overdue.
fn pick_overdue_learning(candidates: &[Candidate], now: DateTime<Utc>) -> Option<&Candidate> {
    let mut overdue: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| matches!(c.state.queue, Queue::Learning | Queue::Relearning) && c.state.due_at <= now)
        .collect();
    if overdue.is_empty() {
        return None;
    }
    overdue.sort_by_key(|c| c.state.due_at);

    // Group by identical weight, keeping the earliest-due representative
    // of each group so exact ties are broken deterministically by lowest
    // due timestamp while still doing a weighted-random pick across
    // distinct weights.
    let weight_of = |c: &Candidate| -> u64 {
        (now - c.state.due_at).num_seconds().max(1) as u64
    };
    let mut representatives: Vec<(&Candidate, u64)> = Vec::new();
    for candidate in overdue {
        let w = weight_of(candidate);
        match representatives.iter().position(|(_, rw)| *rw == w) {
            Some(_) => {}
            None => representatives.push((candidate, w)),
        }
    }
    if representatives.len() == 1 {
        return Some(representatives[0].0);
    }
    let weights: Vec<u64> = representatives.iter().map(|(_, w)| *w).collect();
    let dist = WeightedIndex::new(&weights).ok()?;
    let idx = dist.sample(&mut rand::thread_rng());
    Some(representatives[idx].0)
}

/// Rule 2: a budget-respecting mix of NEW and REVIEW.
fn pick_new_or_review<'a>(
    candidates: &'a [Candidate],
    now: DateTime<Utc>,
    new_budget: &HashMap<DeckId, u32>,
) -> Option<&'a Candidate> {
    let (_, day_end) = utc_day_bounds(&now);
    let new_pool: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            c.state.queue == Queue::New && new_budget.get(&c.deck_id).copied().unwrap_or(0) > 0
        })
        .collect();
    let review_pool: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.state.queue == Queue::Review && c.state.due_at <= day_end)
        .collect();

    if new_pool.is_empty() && review_pool.is_empty() {
        return None;
    }
    let p_new = new_pool.len() as f64 / (new_pool.len() + review_pool.len()).max(1) as f64;
    let mut rng = rand::thread_rng();
    let pick_new = if new_pool.is_empty() {
        false
    } else if review_pool.is_empty() {
        true
    } else {
        rng.gen_bool(p_new)
    };
    let pool = if pick_new { &new_pool } else { &review_pool };
    pool.get(rng.gen_range(0..pool.len())).copied()
}

/// Rule 3: LEARNING/RELEARNING not yet due but due before end of day;
/// pick the earliest.
fn pick_learning_cooldown(candidates: &[Candidate], now: DateTime<Utc>) -> Option<&Candidate> {
    let (_, day_end) = utc_day_bounds(&now);
    candidates
        .iter()
        .filter(|c| {
            matches!(c.state.queue, Queue::Learning | Queue::Relearning)
                && c.state.due_at > now
                && c.state.due_at <= day_end
        })
        .min_by_key(|c| c.state.due_at)
}

fn queue_counts(candidates: &[Candidate], now: DateTime<Utc>, new_budget: &HashMap<DeckId, u32>) -> QueueCounts {
    let (_, day_end) = utc_day_bounds(&now);
    let new = candidates
        .iter()
        .filter(|c| c.state.queue == Queue::New && new_budget.get(&c.deck_id).copied().unwrap_or(0) > 0)
        .count() as u32;
    let learning = candidates
        .iter()
        .filter(|c| matches!(c.state.queue, Queue::Learning | Queue::Relearning) && c.state.due_at <= day_end)
        .count() as u32;
    let review = candidates
        .iter()
        .filter(|c| c.state.queue == Queue::Review && c.state.due_at <= day_end)
        .count() as u32;
    QueueCounts { new, learning, review }
}

/// Called from the `/study/review` handler before the event append, so
/// a crash between the two over-reports the count by at most one rather
/// than under-reporting it. Increments exactly when the reviewed card
/// was NEW at the moment it was selected.
pub async fn record_daily_new_card(
    pool: &SqlitePool,
    user_id: UserId,
    deck_id: DeckId,
    at: DateTime<Utc>,
) -> Result<(), Error> {
    let (day_start, _) = utc_day_bounds(&at);
    sqlx::query(
        "INSERT INTO daily_counts (user_id, deck_id, date, count) VALUES (?, ?, ?, 1) \
         ON CONFLICT(user_id, deck_id, date) DO UPDATE SET count = count + 1",
    )
    .bind(user_id)
    .bind(deck_id)
    .bind(day_start.date_naive())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_log, store};
    use pretty_assertions::assert_eq;
    use sqlx::SqlitePool;

    async fn seed_card(pool: &SqlitePool, deck_id: DeckId) -> CardId {
        let (_, cards) = store::create_note(pool, deck_id, "uno", "OO-no", "one", None)
            .await
            .unwrap();
        cards[0].id
    }

    #[sqlx::test]
    async fn empty_candidate_set_returns_absent_with_has_more_new_cards(pool: SqlitePool) {
        let user = store::get_or_create_user_by_email(&pool, "a@example.com", "A").await.unwrap();
        let deck = store::create_deck(&pool, user.id, "d", "", 0).await.unwrap();
        seed_card(&pool, deck.id).await;
        // new_cards_per_day = 0 so no budget-respecting NEW candidate exists.
        let result = next_card(&pool, user.id, Some(deck.id), &[], false, "fsrs-1").await.unwrap();
        assert!(result.card.is_none());
        assert_eq!(result.has_more_new_cards, Some(true));
    }

    #[sqlx::test]
    async fn overdue_learning_card_outranks_new_and_review(pool: SqlitePool) {
        let user = store::get_or_create_user_by_email(&pool, "a@example.com", "A").await.unwrap();
        let deck = store::create_deck(&pool, user.id, "d", "", 20).await.unwrap();
        let card_id = seed_card(&pool, deck.id).await;
        let now = Utc::now();
        // Move the card into LEARNING, due 5 seconds ago.
        event_log::append_batch(
            &pool,
            user.id,
            &[event_log::NewReviewEvent {
                id: "e1".to_string(),
                card_id,
                rating: 2, // Good: NEW -> LEARNING
                reviewed_at: now - chrono::Duration::minutes(5),
                time_spent_ms: None,
                user_answer: None,
                recording_blob_key: None,
            }],
        )
        .await
        .unwrap();

        let result = next_card(&pool, user.id, Some(deck.id), &[], false, "fsrs-1").await.unwrap();
        let card = result.card.expect("expected a learning card to be due");
        assert_eq!(card.card_id, card_id);
        assert!(matches!(card.state.queue, Queue::Learning | Queue::Review));
    }

    #[sqlx::test]
    async fn excluded_notes_are_skipped(pool: SqlitePool) {
        let user = store::get_or_create_user_by_email(&pool, "a@example.com", "A").await.unwrap();
        let deck = store::create_deck(&pool, user.id, "d", "", 20).await.unwrap();
        let (note, _cards) = store::create_note(&pool, deck.id, "uno", "OO-no", "one", None)
            .await
            .unwrap();
        let result = next_card(&pool, user.id, Some(deck.id), &[note.id], false, "fsrs-1").await.unwrap();
        assert!(result.card.is_none());
    }
}
