// src/fair_round.rs
//! Rounds a list of values to a fixed step so the rounded list still adds up
//! to the rounded total, picking which values go up by the least weighted
//! squared error.

use tracing::warn;

// Floor candidates are computed in whole steps; this absorbs float noise such
// as 0.3 / 0.01 == 29.999999999999996.
const STEP_EPSILON: f64 = 1e-9;

/// Weighted squared error of representing `actual` as `rounded`.
/// Small values are penalised more heavily than large ones.
fn rounding_error(actual: f64, rounded: f64) -> f64 {
    let divisor = if actual < 1.0 { 1.0 } else { actual.sqrt() };
    (rounded - actual).powi(2) / divisor
}

/// Rounds every value to a multiple of `to_nearest` such that the sum of the
/// result equals the sum of `values` rounded to `to_nearest`.
///
/// Values are first truncated to whole steps; then the `k` values whose bump
/// by one step costs least (ties broken by position) are rounded up.
pub fn fair_round(values: &[f64], to_nearest: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let target_sum: f64 = values.iter().sum();
    let target_steps = (target_sum / to_nearest).round() as i64;
    let mut steps: Vec<i64> = values
        .iter()
        .map(|x| (x / to_nearest + STEP_EPSILON).floor() as i64)
        .collect();
    let floor_steps: i64 = steps.iter().sum();

    let mut up_count = target_steps - floor_steps;
    if up_count < 0 || up_count > values.len() as i64 {
        // Caller should guarantee the floors bracket the target
        warn!(
            "fair_round: {} values need {} bumps, clamping",
            values.len(),
            up_count
        );
        up_count = up_count.clamp(0, values.len() as i64);
    }

    let mut costs: Vec<(f64, usize)> = values
        .iter()
        .zip(&steps)
        .enumerate()
        .map(|(i, (&x, &s))| {
            let down = s as f64 * to_nearest;
            let up = down + to_nearest;
            (rounding_error(x, up) - rounding_error(x, down), i)
        })
        .collect();
    costs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    for &(_, i) in costs.iter().take(up_count as usize) {
        steps[i] += 1;
    }

    steps.into_iter().map(|s| s as f64 * to_nearest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    fn expected_total(values: &[f64], to_nearest: f64) -> f64 {
        (sum(values) / to_nearest).round() * to_nearest
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(fair_round(&[], 0.01).is_empty());
    }

    #[test]
    fn single_value_rounds_to_nearest() {
        let rounded = fair_round(&[2.466], 0.01);
        assert_eq!(rounded.len(), 1);
        assert!((rounded[0] - 2.47).abs() < 1e-9, "got {:?}", rounded);
    }

    #[test]
    fn exact_multiples_are_left_alone() {
        let values = [1.25, 3.5, 2.65];
        let rounded = fair_round(&values, 0.05);
        for (r, v) in rounded.iter().zip(values.iter()) {
            assert!((r - v).abs() < 1e-9, "{} changed to {}", v, r);
        }
    }

    #[test]
    fn sums_match_rounded_total() {
        let cases: Vec<(Vec<f64>, f64)> = vec![
            (vec![13.626332, 47.989636, 9.596008, 28.788024], 1.0),
            (vec![33.3333333, 33.3333333, 33.3333333], 1.0),
            (vec![24.25, 23.25, 27.25, 25.25], 1.0),
            (vec![1.25, 2.25, 3.25, 4.25, 89.0], 1.0),
            (vec![2.466666, 2.466666, 2.466668], 0.01),
            (vec![0.123, 4.567, 2.71], 0.01),
        ];
        for (values, to_nearest) in cases {
            let rounded = fair_round(&values, to_nearest);
            assert_eq!(rounded.len(), values.len());
            assert!(
                (sum(&rounded) - expected_total(&values, to_nearest)).abs() < 1e-6,
                "{:?} -> {:?}",
                values,
                rounded
            );
        }
    }

    #[test]
    fn every_value_can_be_bumped() {
        let values = [0.019, 0.019, 0.019];
        let rounded = fair_round(&values, 0.01);
        assert!((sum(&rounded) - 0.06).abs() < 1e-9, "got {:?}", rounded);
        assert!(rounded.iter().all(|r| (r - 0.02).abs() < 1e-9));
    }

    #[test]
    fn bumps_the_value_with_the_cheaper_error() {
        // 1.06 -> 1.1 costs less than 1.04 -> 1.1
        let rounded = fair_round(&[1.06, 1.04], 0.1);
        assert!((rounded[0] - 1.1).abs() < 1e-9, "got {:?}", rounded);
        assert!((rounded[1] - 1.0).abs() < 1e-9, "got {:?}", rounded);

        let reversed = fair_round(&[1.04, 1.06], 0.1);
        assert!((reversed[0] - 1.0).abs() < 1e-9, "got {:?}", reversed);
        assert!((reversed[1] - 1.1).abs() < 1e-9, "got {:?}", reversed);
    }

    #[test]
    fn no_value_goes_up_when_the_floors_already_match() {
        // 2.05 / 0.1 rounds to 20 steps, which the floors already give
        let rounded = fair_round(&[1.01, 1.04], 0.1);
        assert!((rounded[0] - 1.0).abs() < 1e-9, "got {:?}", rounded);
        assert!((rounded[1] - 1.0).abs() < 1e-9, "got {:?}", rounded);
        assert!((sum(&rounded) - expected_total(&[1.01, 1.04], 0.1)).abs() < 1e-9);
    }

    #[test]
    fn large_values_absorb_rounding_error() {
        // Unweighted, 0.45 would go up (remainder closer to a step); the
        // square-root weight makes bumping 100.3 cheaper.
        let rounded = fair_round(&[0.45, 100.3], 1.0);
        assert!((sum(&rounded) - 101.0).abs() < 1e-9);
        assert!((rounded[0] - 0.0).abs() < 1e-9, "got {:?}", rounded);
        assert!((rounded[1] - 101.0).abs() < 1e-9, "got {:?}", rounded);
    }

    #[test]
    fn ties_are_broken_by_position() {
        let first = fair_round(&[1.005, 1.005, 1.005, 1.005], 0.01);
        let second = fair_round(&[1.005, 1.005, 1.005, 1.005], 0.01);
        assert_eq!(first, second);
        let bumped: Vec<usize> = first
            .iter()
            .enumerate()
            .filter(|(_, r)| (*r - 1.01).abs() < 1e-9)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(bumped, vec![0, 1]);
    }
}
