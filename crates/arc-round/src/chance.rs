//! Win-chance arithmetic in integer basis points, rendered to two decimals.

use arc_schemas::Wei;

/// `user / pool` as a percentage rounded half-up to two decimals; `0.0` for an
/// empty pool.
pub fn win_chance_pct(user_total: Wei, pool_total: Wei) -> f64 {
    if pool_total == 0 {
        return 0.0;
    }
    // Hundredths of a percent, rounded half-up.
    let scaled = user_total
        .saturating_mul(20_000)
        .saturating_add(pool_total)
        / pool_total.saturating_mul(2);
    scaled as f64 / 100.0
}

/// Chance a fresh contribution of `amount` would carry: `amount / (pool + amount)`.
pub fn prospective_win_chance_pct(amount: Wei, pool_total: Wei) -> f64 {
    win_chance_pct(amount, pool_total.saturating_add(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_is_zero() {
        assert_eq!(win_chance_pct(0, 0), 0.0);
        assert_eq!(win_chance_pct(5, 0), 0.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(win_chance_pct(20, 120), 16.67);
        assert_eq!(win_chance_pct(10, 110), 9.09);
        assert_eq!(win_chance_pct(1, 3), 33.33);
        assert_eq!(win_chance_pct(2, 3), 66.67);
        assert_eq!(win_chance_pct(7, 7), 100.0);
    }

    #[test]
    fn prospective_includes_own_amount() {
        assert_eq!(prospective_win_chance_pct(20, 100), 16.67);
        assert_eq!(prospective_win_chance_pct(0, 100), 0.0);
        assert_eq!(prospective_win_chance_pct(5, 0), 100.0);
    }
}
