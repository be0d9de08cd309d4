//! Annualization helpers shared by every cost expression.

/// Annuity (capital recovery) factor for a depreciation period of `n` years
/// at discount rate `i`:
///
/// ```text
/// a(n, i) = (1 + i)^n · i / ((1 + i)^n - 1)
/// ```
///
/// Multiplying an overnight investment by this factor yields the equal
/// yearly payment that repays it over `n` years. A zero rate degenerates
/// to straight-line repayment `1/n`.
pub fn annuity_factor(n: f64, i: f64) -> f64 {
    if n <= 0.0 {
        return 1.0;
    }
    if i.abs() < 1e-10 {
        return 1.0 / n;
    }
    let growth = (1.0 + i).powf(n);
    growth * i / (growth - 1.0)
}

/// Hours in a (non-leap) year, the numerator of every annualization weight.
pub const HOURS_PER_YEAR: f64 = 8760.0;

/// Annualization weight for a scope spanning `steps` modelled steps of
/// length `dt` hours.
pub fn annualization_weight(steps: usize, dt: f64) -> f64 {
    if steps == 0 || dt <= 0.0 {
        return 1.0;
    }
    HOURS_PER_YEAR / (steps as f64 * dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annuity_factor_closed_form() {
        let a = annuity_factor(20.0, 0.07);
        assert!((a - 0.09439).abs() < 1e-5, "got {a}");
    }

    #[test]
    fn test_annuity_factor_zero_rate() {
        assert!((annuity_factor(25.0, 0.0) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_annuity_factor_repays_investment() {
        // Present value of the annuity stream equals the investment.
        let (n, i) = (10.0, 0.05);
        let a = annuity_factor(n, i);
        let pv: f64 = (1..=10).map(|y| a / (1.0 + i).powi(y)).sum();
        assert!((pv - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_for_full_year() {
        assert!((annualization_weight(8760, 1.0) - 1.0).abs() < 1e-12);
        assert!((annualization_weight(3, 1.0) - 2920.0).abs() < 1e-9);
    }
}
