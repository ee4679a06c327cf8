//! Numeric helpers shared by the fusion and construction stages.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation (divides by n). Zero for fewer than two points.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp to [-1, 1], mapping NaN to 0.
pub fn signed_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Bucket 24h volume into a liquidity score.
pub fn liquidity_score(volume_24h: f64) -> f64 {
    if volume_24h >= 5_000_000.0 {
        1.0
    } else if volume_24h >= 1_000_000.0 {
        0.7
    } else if volume_24h >= 100_000.0 {
        0.4
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std_dev_population() {
        assert_relative_eq!(std_dev(&[1.0, 1.0]), 0.0);
        assert_relative_eq!(std_dev(&[1.0, -1.0]), 1.0);
        assert_eq!(std_dev(&[0.7]), 0.0);
    }

    #[test]
    fn test_clamps_swallow_nan() {
        assert_eq!(unit(f64::NAN), 0.0);
        assert_eq!(unit(1.7), 1.0);
        assert_eq!(signed_unit(-3.0), -1.0);
    }

    #[test]
    fn test_liquidity_buckets() {
        assert_eq!(liquidity_score(5_000_000.0), 1.0);
        assert_eq!(liquidity_score(2_000_000.0), 0.7);
        assert_eq!(liquidity_score(100_000.0), 0.4);
        assert_eq!(liquidity_score(99_999.0), 0.1);
    }
}
