//! Component 4.1 — the Scheduler. A pure function: (state, rating, now,
//! params) -> next state, plus interval previews. No I/O, no clock
//! access beyond the caller-supplied `now`.
//!
//! Weights are 0-indexed, 21 in number (`Rating::{Again,Hard,Good,Easy}`
//! = 0..=3).

use crate::{
    Error,
    model::{ComputedCardState, Queue, Rating},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub const NUM_WEIGHTS: usize = 21;

/// A reasonable published FSRS-family baseline. Decks may override this
/// (`Deck::fsrs_weights`); this is only the seed for newly created decks.
pub const DEFAULT_WEIGHTS: [f64; NUM_WEIGHTS] = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 0.0234, 1.616, 0.1544, 1.0824,
    1.9813, 0.0953, 0.2975, 2.2042, 0.2407, 2.9466, 0.5034, 0.6567, 0.1294, 0.1,
];

pub const DEFAULT_REQUEST_RETENTION: f64 = 0.9;
pub const MIN_REQUEST_RETENTION: f64 = 0.7;
pub const MAX_REQUEST_RETENTION: f64 = 0.97;

#[derive(Clone, Debug)]
pub struct SchedulerParams {
    pub w: [f64; NUM_WEIGHTS],
    pub request_retention: f64,
    pub algorithm_version: String,
}

impl SchedulerParams {
    pub fn validate(&self) -> Result<(), Error> {
        if !(MIN_REQUEST_RETENTION..=MAX_REQUEST_RETENTION).contains(&self.request_retention) {
            return Err(Error::InvalidArgument(format!(
                "request_retention must be between {MIN_REQUEST_RETENTION} and {MAX_REQUEST_RETENTION}, got {}",
                self.request_retention
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            w: DEFAULT_WEIGHTS,
            request_retention: DEFAULT_REQUEST_RETENTION,
            algorithm_version: "fsrs-1".to_string(),
        }
    }
}

impl SchedulerParams {
    /// Builds the parameters a deck's own cards fold under: its stored
    /// weight vector and request retention, tagged with the server's
    /// current algorithm version. Decks may override the global defaults.
    pub fn for_deck(deck: &crate::model::Deck, algorithm_version: &str) -> Result<Self, Error> {
        let w = weights_from_json(&deck.fsrs_weights)?;
        let params = Self {
            w,
            request_retention: deck.request_retention,
            algorithm_version: algorithm_version.to_string(),
        };
        params.validate()?;
        Ok(params)
    }
}

/// A computed interval shown to the learner before they pick a rating.
/// Does not mutate any state.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalPreview {
    pub rating: Rating,
    pub next_review_at: DateTime<Utc>,
    /// "10m", "3d", "2.1mo", "1y".
    pub interval_label: String,
}

pub fn initial_state(card_id: crate::model::CardId, now: DateTime<Utc>, params: &SchedulerParams) -> ComputedCardState {
    ComputedCardState {
        card_id,
        queue: Queue::New,
        stability: 0.0,
        difficulty: initial_difficulty(&params.w, Rating::Good),
        scheduled_days: 0.0,
        reps: 0,
        lapses: 0,
        last_reviewed_at: None,
        due_at: now,
        algorithm_version: params.algorithm_version.clone(),
        event_count: 0,
    }
}

fn initial_stability(w: &[f64; NUM_WEIGHTS], rating: Rating) -> f64 {
    w[rating.id() as usize].max(0.1)
}

fn initial_difficulty(w: &[f64; NUM_WEIGHTS], rating: Rating) -> f64 {
    let d = w[4] - (w[5] * f64::from(rating.id())).exp() + 1.0;
    d.clamp(1.0, 10.0)
}

fn next_difficulty(w: &[f64; NUM_WEIGHTS], difficulty: f64, rating: Rating) -> f64 {
    let delta = w[6] * (f64::from(rating.id()) - 2.0);
    let shifted = difficulty - delta;
    let mean_reverted = w[7] * initial_difficulty(w, Rating::Good) + (1.0 - w[7]) * shifted;
    mean_reverted.clamp(1.0, 10.0)
}

/// Forgetting curve: probability of recall after `elapsed_days` given
/// `stability` (days), under the classic FSRS `-1` power-law decay.
fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + elapsed_days / (9.0 * stability)).powf(-1.0)
}

fn next_stability_on_success(
    w: &[f64; NUM_WEIGHTS],
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: Rating,
) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
    let growth = (w[8]).exp()
        * (11.0 - difficulty)
        * stability.powf(-w[9])
        * ((w[10] * (1.0 - retrievability)).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    stability * (1.0 + growth)
}

fn next_stability_on_lapse(
    w: &[f64; NUM_WEIGHTS],
    difficulty: f64,
    stability: f64,
    retrievability: f64,
) -> f64 {
    let post_lapse = w[11]
        * difficulty.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * (w[14] * (1.0 - retrievability)).exp();
    post_lapse.min(stability)
}

/// Short sub-day interval for a card still in LEARNING/RELEARNING,
/// derived from `w[17]`/`w[18]`/`w[19]`/`w[20]`; first step is typically
/// 1-10 minutes.
fn learning_step_minutes(w: &[f64; NUM_WEIGHTS], rating: Rating, in_relearning: bool) -> f64 {
    let base = if in_relearning { w[19] } else { w[17] };
    let scale = if in_relearning { w[20] } else { w[18] };
    let minutes = match rating {
        Rating::Again => base.max(1.0),
        Rating::Hard => (base + scale).max(base + 1.0),
        Rating::Good => (base + 2.0 * scale).max(base + 2.0),
        Rating::Easy => 0.0, // graduates immediately, handled by caller
    };
    minutes.clamp(1.0, 10.0)
}

pub fn interval_days_for_stability(stability: f64, request_retention: f64) -> f64 {
    let days = stability * request_retention.ln() / 0.9_f64.ln();
    days.round().max(1.0)
}

pub fn format_interval(duration: ChronoDuration) -> String {
    let minutes = duration.num_minutes();
    if minutes < 60 {
        return format!("{}m", minutes.max(1));
    }
    let days = duration.num_seconds() as f64 / 86_400.0;
    if days < 1.0 {
        let hours = duration.num_hours();
        return format!("{hours}h");
    }
    if days < 30.0 {
        return format!("{}d", days.round() as i64);
    }
    if days < 365.0 {
        return format!("{:.1}mo", days / 30.0);
    }
    format!("{:.1}y", days / 365.0)
}

/// Core state-transition function. `now` is the event's `reviewed_at`
/// when folding history, or the wall clock for a live `/study/review`
/// call.
pub fn schedule(
    state: &ComputedCardState,
    rating: Rating,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Result<ComputedCardState, Error> {
    params.validate()?;
    let elapsed_days = state
        .last_reviewed_at
        .map(|last| (now - last).num_seconds() as f64 / 86_400.0)
        .unwrap_or(0.0)
        .max(0.0);
    let r = if state.queue == Queue::New {
        1.0
    } else {
        retrievability(elapsed_days, state.stability)
    };

    let mut next = state.clone();
    next.algorithm_version = params.algorithm_version.clone();

    match state.queue {
        Queue::New => {
            next.stability = initial_stability(&params.w, rating);
            next.difficulty = initial_difficulty(&params.w, rating);
            match rating {
                Rating::Easy => {
                    next.queue = Queue::Review;
                    next.reps += 1;
                    next.scheduled_days = interval_days_for_stability(
                        next.stability,
                        params.request_retention,
                    );
                    next.due_at = now + ChronoDuration::days(next.scheduled_days as i64);
                }
                _ => {
                    next.queue = Queue::Learning;
                    let minutes = learning_step_minutes(&params.w, rating, false);
                    next.scheduled_days = 0.0;
                    next.due_at = now + ChronoDuration::seconds((minutes * 60.0) as i64);
                }
            }
        }
        Queue::Learning | Queue::Relearning => {
            let in_relearning = state.queue == Queue::Relearning;
            next.difficulty = next_difficulty(&params.w, state.difficulty, rating);
            match rating {
                Rating::Again => {
                    next.stability =
                        next_stability_on_lapse(&params.w, state.difficulty, state.stability.max(0.1), r);
                    next.queue = if in_relearning { Queue::Relearning } else { Queue::Learning };
                    let minutes = learning_step_minutes(&params.w, rating, in_relearning);
                    next.scheduled_days = 0.0;
                    next.due_at = now + ChronoDuration::seconds((minutes * 60.0) as i64);
                }
                Rating::Hard => {
                    next.stability = next_stability_on_success(
                        &params.w,
                        state.difficulty,
                        state.stability.max(0.1),
                        r,
                        rating,
                    );
                    let minutes = learning_step_minutes(&params.w, rating, in_relearning);
                    next.scheduled_days = 0.0;
                    next.due_at = now + ChronoDuration::seconds((minutes * 60.0) as i64);
                }
                Rating::Good | Rating::Easy => {
                    next.stability = next_stability_on_success(
                        &params.w,
                        state.difficulty,
                        state.stability.max(0.1),
                        r,
                        rating,
                    );
                    next.reps += 1;
                    next.queue = Queue::Review;
                    next.scheduled_days = interval_days_for_stability(
                        next.stability,
                        params.request_retention,
                    );
                    next.due_at = now + ChronoDuration::days(next.scheduled_days as i64);
                }
            }
        }
        Queue::Review => match rating {
            Rating::Again => {
                next.stability =
                    next_stability_on_lapse(&params.w, state.difficulty, state.stability, r);
                next.difficulty = next_difficulty(&params.w, state.difficulty, rating);
                next.lapses += 1;
                next.queue = Queue::Relearning;
                let minutes = learning_step_minutes(&params.w, rating, true);
                next.scheduled_days = 0.0;
                next.due_at = now + ChronoDuration::seconds((minutes * 60.0) as i64);
            }
            _ => {
                next.stability = next_stability_on_success(
                    &params.w,
                    state.difficulty,
                    state.stability,
                    r,
                    rating,
                );
                next.difficulty = next_difficulty(&params.w, state.difficulty, rating);
                next.reps += 1;
                next.queue = Queue::Review;
                next.scheduled_days =
                    interval_days_for_stability(next.stability, params.request_retention);
                next.due_at = now + ChronoDuration::days(next.scheduled_days as i64);
            }
        },
    }

    next.last_reviewed_at = Some(now);
    next.event_count += 1;
    Ok(next)
}

/// Previews the outcome of each of the four ratings without mutating
/// `state`.
pub fn preview_intervals(
    state: &ComputedCardState,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Result<Vec<IntervalPreview>, Error> {
    [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy]
        .into_iter()
        .map(|rating| {
            let next = schedule(state, rating, now, params)?;
            Ok(IntervalPreview {
                rating,
                next_review_at: next.due_at,
                interval_label: format_interval(next.due_at - now),
            })
        })
        .collect()
}

pub fn weights_from_json(json: &str) -> Result<[f64; NUM_WEIGHTS], Error> {
    let values: Vec<f64> = serde_json::from_str(json)
        .map_err(|e| Error::InvalidArgument(format!("invalid fsrs_weights: {e}")))?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| Error::InvalidArgument(format!(
            "fsrs_weights must have exactly {NUM_WEIGHTS} entries, got {}",
            v.len()
        )))
}

pub fn weights_to_json(w: &[f64; NUM_WEIGHTS]) -> String {
    serde_json::to_string(w.as_slice()).expect("array of f64 always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CardId;
    use pretty_assertions::assert_eq;

    fn params() -> SchedulerParams {
        SchedulerParams::default()
    }

    fn now() -> DateTime<Utc> {
        "2026-08-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn easy_on_new_graduates_directly_to_review() {
        let state = initial_state(1 as CardId, now(), &params());
        let next = schedule(&state, Rating::Easy, now(), &params()).unwrap();
        assert_eq!(next.queue, Queue::Review);
        assert!(next.scheduled_days >= 1.0);
    }

    #[test]
    fn good_on_new_enters_learning_not_new() {
        let state = initial_state(1, now(), &params());
        let next = schedule(&state, Rating::Good, now(), &params()).unwrap();
        assert_ne!(next.queue, Queue::New);
        assert_eq!(next.queue, Queue::Learning);
    }

    #[test]
    fn no_rating_leaves_a_new_card_stuck_in_new() {
        for rating in [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy] {
            let state = initial_state(1, now(), &params());
            let next = schedule(&state, rating, now(), &params()).unwrap();
            assert_ne!(next.queue, Queue::New, "rating {rating:?} left the card in NEW");
        }
    }

    #[test]
    fn again_on_review_moves_to_relearning_and_increments_lapses_by_one() {
        let mut state = initial_state(1, now(), &params());
        state.queue = Queue::Review;
        state.stability = 10.0;
        state.difficulty = 5.0;
        state.last_reviewed_at = Some(now() - ChronoDuration::days(5));
        let next = schedule(&state, Rating::Again, now(), &params()).unwrap();
        assert_eq!(next.queue, Queue::Relearning);
        assert_eq!(next.lapses, state.lapses + 1);
    }

    #[test]
    fn scheduling_is_deterministic() {
        let state = initial_state(1, now(), &params());
        let a = schedule(&state, Rating::Good, now(), &params()).unwrap();
        let b = schedule(&state, Rating::Good, now(), &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn good_review_never_schedules_before_last_review() {
        let mut state = initial_state(1, now(), &params());
        state.queue = Queue::Review;
        state.stability = 5.0;
        state.difficulty = 5.0;
        state.last_reviewed_at = Some(now());
        let next = schedule(&state, Rating::Good, now(), &params()).unwrap();
        assert!(next.due_at >= state.last_reviewed_at.unwrap());
    }

    #[test]
    fn invalid_request_retention_is_rejected() {
        let mut p = params();
        p.request_retention = 0.5;
        let state = initial_state(1, now(), &p);
        let result = schedule(&state, Rating::Good, now(), &p);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn preview_does_not_mutate_state() {
        let state = initial_state(1, now(), &params());
        let before = state.clone();
        let _ = preview_intervals(&state, now(), &params()).unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn weights_round_trip_through_json() {
        let json = weights_to_json(&DEFAULT_WEIGHTS);
        let parsed = weights_from_json(&json).unwrap();
        assert_eq!(parsed, DEFAULT_WEIGHTS);
    }
}
