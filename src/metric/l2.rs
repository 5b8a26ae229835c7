//! Squared Euclidean distance.

use super::Metric;

/// L2 Squared (Euclidean squared) distance.
///
/// Calculates `sum((a_i - b_i)^2)`. The square root is never taken: squared
/// distances preserve nearest-neighbor ordering and are cheaper.
#[derive(Debug, Clone, Copy, Default)]
pub struct L2Squared;

impl Metric for L2Squared {
    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(
            a.len(),
            b.len(),
            "dimension mismatch: {} != {}",
            a.len(),
            b.len()
        );

        // Four independent accumulators break the dependency chain and let
        // the compiler vectorize the main loop.
        let mut sums = [0.0f32; 4];
        let chunks = a.chunks_exact(4).zip(b.chunks_exact(4));
        for (ca, cb) in chunks {
            for lane in 0..4 {
                let diff = ca[lane] - cb[lane];
                sums[lane] += diff * diff;
            }
        }

        let tail = a.len() - a.len() % 4;
        let mut sum = sums[0] + sums[1] + sums[2] + sums[3];
        for (x, y) in a[tail..].iter().zip(&b[tail..]) {
            let diff = x - y;
            sum += diff * diff;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared_basic() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 2.0, 1.0];
        // (1-4)^2 + 0 + (3-1)^2 = 9 + 4 = 13
        assert!((L2Squared::distance(&a, &b) - 13.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_squared_identical() {
        let a = [0.5; 128];
        assert_eq!(L2Squared::distance(&a, &a), 0.0);
    }

    #[test]
    fn test_l2_squared_unrolled_matches_naive() {
        // Length 131 exercises both the unrolled body and the tail.
        let a: Vec<f32> = (0..131).map(|i| i as f32 * 0.25).collect();
        let b: Vec<f32> = (0..131).map(|i| (131 - i) as f32 * 0.5).collect();
        let naive: f32 = a
            .iter()
            .zip(&b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        let got = L2Squared::distance(&a, &b);
        assert!((got - naive).abs() / naive.max(1.0) < 1e-5);
    }

    #[test]
    #[should_panic(expected = "dimension mismatch")]
    fn test_l2_squared_length_mismatch() {
        let _ = L2Squared::distance(&[1.0], &[1.0, 2.0]);
    }
}
