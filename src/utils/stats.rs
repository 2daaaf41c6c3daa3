//! Null-safe Reductions
//!
//! Mean, sum, sample sd and quantiles over optional values. Nulls are
//! dropped; a group with no non-null value reduces to `None` rather than
//! 0 or NaN. Values are sorted before any accumulation, so results do not
//! depend on the order rows arrived in (sequential and parallel runs agree
//! bit for bit).

/// Non-null values in ascending order
pub fn ordered<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut v: Vec<f64> = values.into_iter().flatten().filter(|x| !x.is_nan()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

pub fn count(values: &[Option<f64>]) -> usize {
    values.iter().filter(|v| v.map_or(false, |x| !x.is_nan())).count()
}

pub fn sum(values: &[Option<f64>]) -> Option<f64> {
    let v = ordered(values.iter().copied());
    if v.is_empty() {
        None
    } else {
        Some(v.iter().sum())
    }
}

pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let v = ordered(values.iter().copied());
    if v.is_empty() {
        None
    } else {
        Some(v.iter().sum::<f64>() / v.len() as f64)
    }
}

/// Sample standard deviation; fewer than two values gives `None`
pub fn sd(values: &[Option<f64>]) -> Option<f64> {
    let v = ordered(values.iter().copied());
    if v.len() < 2 {
        return None;
    }
    let n = v.len() as f64;
    let m = v.iter().sum::<f64>() / n;
    let mut dev: Vec<f64> = v.iter().map(|x| (x - m) * (x - m)).collect();
    dev.sort_by(|a, b| a.total_cmp(b));
    Some((dev.iter().sum::<f64>() / (n - 1.0)).sqrt())
}

pub fn min(values: &[Option<f64>]) -> Option<f64> {
    ordered(values.iter().copied()).first().copied()
}

pub fn max(values: &[Option<f64>]) -> Option<f64> {
    ordered(values.iter().copied()).last().copied()
}

/// Quantile by the inverse-CDF-with-averaging rule ("type 2")
///
/// With `np = n·p`: a fractional `np` takes the order statistic just above
/// it; an integral `np` averages the two order statistics around it. No
/// interpolation between ranks.
pub fn quantile_type2(values: &[Option<f64>], p: f64) -> Option<f64> {
    let v = ordered(values.iter().copied());
    quantile_type2_sorted(&v, p)
}

/// [`quantile_type2`] over already sorted, non-null values
pub fn quantile_type2_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let fuzz = 4.0 * f64::EPSILON;
    let np = n as f64 * p;
    let j = (np + fuzz).floor();
    let at = |i: f64| -> f64 {
        let idx = (i.max(1.0) as usize).min(n) - 1;
        sorted[idx]
    };
    if (np - j).abs() <= fuzz {
        // integral: average ranks j and j+1 (1-based)
        Some((at(j) + at(j + 1.0)) / 2.0)
    } else {
        Some(at(j + 1.0))
    }
}

/// Null-safe sum of group values: all-null is null, not zero
pub fn null_safe_sum<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let v: Vec<Option<f64>> = values.into_iter().collect();
    sum(&v)
}
