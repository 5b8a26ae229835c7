//! Negated inner-product distance.

use super::Metric;

/// Inner-product distance, `-(a . b)`.
///
/// Negated so that larger inner products (better matches) sort as smaller
/// distances, keeping "nearer = smaller" uniform across all metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotProduct;

/// Raw dot product over two equal-length slices.
#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sums = [0.0f32; 4];
    for (ca, cb) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
        for lane in 0..4 {
            sums[lane] += ca[lane] * cb[lane];
        }
    }

    let tail = a.len() - a.len() % 4;
    let mut sum = sums[0] + sums[1] + sums[2] + sums[3];
    for (x, y) in a[tail..].iter().zip(&b[tail..]) {
        sum += x * y;
    }
    sum
}

impl Metric for DotProduct {
    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(
            a.len(),
            b.len(),
            "dimension mismatch: {} != {}",
            a.len(),
            b.len()
        );
        -dot(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_basic() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 2.0, 1.0];
        // -(4 + 4 + 3) = -11
        assert!((DotProduct::distance(&a, &b) + 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_better_match_is_smaller() {
        let q = [1.0, 0.0];
        let close = [1.0, 0.0];
        let far = [0.1, 0.0];
        assert!(DotProduct::distance(&q, &close) < DotProduct::distance(&q, &far));
    }

    #[test]
    fn test_dot_tail_handling() {
        let a: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let b = vec![2.0f32; 9];
        let naive: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - naive).abs() < 1e-5);
    }
}
