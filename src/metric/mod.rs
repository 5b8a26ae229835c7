//! Distance metrics.
//!
//! All kernels are total functions over `(&[f32], &[f32])` and never fail.
//! Every metric is oriented so that **nearer means smaller**: L2 stays
//! squared (ordering-equivalent and cheaper), cosine is `1 - similarity`,
//! and inner product is negated.
//!
//! The kernels are written over contiguous unit-stride `f32` slices with
//! four independent accumulators so the optimizer can vectorize them; no
//! platform intrinsics are required.

use serde::{Deserialize, Serialize};

mod cosine;
mod dot;
mod l2;

pub use cosine::Cosine;
pub use dot::DotProduct;
pub use l2::L2Squared;

/// A distance function over `f32` vectors.
///
/// Implementors must be zero-sized tags; the metric is selected once per
/// index and dispatched through [`MetricKind::distance`].
pub trait Metric {
    /// Computes the distance between `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if `a` and `b` have different lengths (debug-checked at the
    /// call sites that handle untrusted input; slices read from node blocks
    /// always have the configured dimension).
    fn distance(a: &[f32], b: &[f32]) -> f32;
}

/// The distance metric an index was created with.
///
/// Immutable after creation; persisted in the index metadata and
/// sanity-checked on open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Squared Euclidean distance.
    Euclidean,
    /// Cosine distance, `1 - cos(a, b)`.
    Cosine,
    /// Negated inner product.
    Dot,
}

impl MetricKind {
    /// Parses the SQL-surface metric name (`euclidean`, `cosine`, `dot`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "euclidean" | "l2" => Some(MetricKind::Euclidean),
            "cosine" => Some(MetricKind::Cosine),
            "dot" => Some(MetricKind::Dot),
            _ => None,
        }
    }

    /// The canonical SQL-surface name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Euclidean => "euclidean",
            MetricKind::Cosine => "cosine",
            MetricKind::Dot => "dot",
        }
    }

    /// Computes the distance between `a` and `b` under this metric.
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricKind::Euclidean => L2Squared::distance(a, b),
            MetricKind::Cosine => Cosine::distance(a, b),
            MetricKind::Dot => DotProduct::distance(a, b),
        }
    }
}
