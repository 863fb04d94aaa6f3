use time::OffsetDateTime;

/// Fixed weight on the recency term of the score.
pub const RECENT_CLICK_WEIGHT: f64 = 0.7;

pub fn current_time_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Hours elapsed since the last click, clamped at zero. A document that has
/// never been clicked decays nothing.
pub fn compute_decay_hours(last_clicked_at_ms: Option<i64>, now_ms: i64) -> f64 {
    match last_clicked_at_ms {
        Some(last) => ((now_ms - last) as f64 / 3_600_000.0).max(0.0),
        None => 0.0,
    }
}

/// score = ln(clicks_total + 1) + 0.7 * recent_clicks - decay_per_hour * decay_hours
pub fn compute_ranking_score(
    clicks_total: i64,
    recent_clicks: f64,
    last_clicked_at_ms: Option<i64>,
    now_ms: i64,
    decay_per_hour: f64,
) -> f64 {
    let decay = compute_decay_hours(last_clicked_at_ms, now_ms) * decay_per_hour;
    ((clicks_total + 1) as f64).ln() + recent_clicks * RECENT_CLICK_WEIGHT - decay
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECAY_PER_HOUR: f64 = 0.05;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn score_is_deterministic() {
        let now = 1_700_000_000_000;
        let a = compute_ranking_score(7, 3.25, Some(now - 90_000), now, DECAY_PER_HOUR);
        let b = compute_ranking_score(7, 3.25, Some(now - 90_000), now, DECAY_PER_HOUR);
        assert_eq!(a, b);
    }

    #[test]
    fn never_clicked_has_no_decay() {
        assert!(close(compute_decay_hours(None, 1_700_000_000_000), 0.0));
        let score = compute_ranking_score(0, 0.0, None, 1_700_000_000_000, DECAY_PER_HOUR);
        assert!(close(score, 0.0));
    }

    #[test]
    fn future_last_click_clamps_to_zero_decay() {
        let now = 1_700_000_000_000;
        assert!(close(compute_decay_hours(Some(now + 3_600_000), now), 0.0));
    }

    #[test]
    fn two_immediate_clicks_score() {
        // Two clicks landing 0 ms apart: ln(3) + 0.7 * 2.0, no decay.
        let now = 1_700_000_000_000;
        let score = compute_ranking_score(2, 2.0, Some(now), now, DECAY_PER_HOUR);
        assert!(close(score, 3.0f64.ln() + 1.4));
        assert!((score - 2.4986).abs() < 1e-3);
    }

    #[test]
    fn decayed_sweep_score() {
        // After one 0.85 sweep of a doc clicked just now: ln(6) + 0.7 * 8.5.
        let now = 1_700_000_000_000;
        let score = compute_ranking_score(5, 8.5, Some(now), now, DECAY_PER_HOUR);
        assert!(close(score, 6.0f64.ln() + 5.95));
    }

    #[test]
    fn decay_subtracts_per_elapsed_hour() {
        let now = 1_700_000_000_000;
        let two_hours_ago = now - 2 * 3_600_000;
        let fresh = compute_ranking_score(4, 1.0, Some(now), now, DECAY_PER_HOUR);
        let stale = compute_ranking_score(4, 1.0, Some(two_hours_ago), now, DECAY_PER_HOUR);
        assert!(close(fresh - stale, 2.0 * DECAY_PER_HOUR));
    }
}
