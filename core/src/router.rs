//! Confidence routing
//!
//! ```text
//! confidence >= high         -> auto
//! low <= confidence < high   -> review
//! confidence < low           -> reject
//! ```
//!
//! Boundaries belong to the upper bucket and are compared exactly. A NaN
//! confidence fails both comparisons and routes to `reject`.

use crate::classifier::ClassificationResult;
use crate::errors::{Result, RoutecatError};
use serde::{Deserialize, Serialize};

/// Where a classification goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    /// Apply the predicted category automatically
    Auto,
    /// Hold for human review
    Review,
    /// Discard the prediction and use the fallback category
    Reject,
}

impl RoutingDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Review => "review",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stateless threshold router
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceRouter {
    high: f64,
    low: f64,
}

impl ConfidenceRouter {
    /// Create a router; requires `0 <= low <= high <= 1`
    pub fn new(high: f64, low: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
            return Err(RoutecatError::config(format!(
                "router thresholds must lie in [0, 1] (high={high}, low={low})"
            )));
        }
        if low > high {
            return Err(RoutecatError::config(format!(
                "router low threshold {low} exceeds high threshold {high}"
            )));
        }
        Ok(Self { high, low })
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    /// Route a raw confidence score
    pub fn route_score(&self, confidence: f64) -> RoutingDecision {
        if confidence >= self.high {
            RoutingDecision::Auto
        } else if confidence >= self.low {
            RoutingDecision::Review
        } else {
            RoutingDecision::Reject
        }
    }

    /// Route a classification result
    pub fn route(&self, result: &ClassificationResult) -> RoutingDecision {
        self.route_score(result.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn router() -> ConfidenceRouter {
        ConfidenceRouter::new(0.85, 0.5).expect("valid thresholds")
    }

    #[test]
    fn boundaries_belong_to_upper_bucket() {
        let r = router();
        assert_eq!(r.route_score(0.85), RoutingDecision::Auto);
        assert_eq!(r.route_score(0.5), RoutingDecision::Review);
    }

    #[test]
    fn just_below_boundaries() {
        let r = router();
        assert_eq!(r.route_score(0.85 - 1e-12), RoutingDecision::Review);
        assert_eq!(r.route_score(0.5 - 1e-12), RoutingDecision::Reject);
    }

    #[test]
    fn partition_holds_over_a_grid() {
        let thresholds = [(0.0, 0.0), (0.3, 0.3), (0.9, 0.2), (1.0, 0.0), (1.0, 1.0)];
        for (high, low) in thresholds {
            let r = ConfidenceRouter::new(high, low).expect("valid");
            for step in 0..=100 {
                let c = f64::from(step) / 100.0;
                let expected = if c >= high {
                    RoutingDecision::Auto
                } else if c >= low {
                    RoutingDecision::Review
                } else {
                    RoutingDecision::Reject
                };
                assert_eq!(r.route_score(c), expected, "c={c} high={high} low={low}");
            }
        }
    }

    #[test]
    fn negative_and_nan_scores_reject() {
        let r = router();
        assert_eq!(r.route_score(-0.4), RoutingDecision::Reject);
        assert_eq!(r.route_score(f64::NAN), RoutingDecision::Reject);
    }

    #[test]
    fn zero_low_threshold_never_rejects_non_negative() {
        let r = ConfidenceRouter::new(0.7, 0.0).expect("valid");
        assert_eq!(r.route_score(0.0), RoutingDecision::Review);
        assert_eq!(r.route_score(-0.01), RoutingDecision::Reject);
    }

    #[test]
    fn routes_results() {
        let r = router();
        let result = ClassificationResult::new("bug", 0.9, "clear crash report");
        assert_eq!(r.route(&result), RoutingDecision::Auto);
    }

    #[test]
    fn rejects_invalid_thresholds() {
        assert!(ConfidenceRouter::new(0.4, 0.6).is_err());
        assert!(ConfidenceRouter::new(1.2, 0.5).is_err());
        assert!(ConfidenceRouter::new(0.8, -0.1).is_err());
        assert!(ConfidenceRouter::new(f64::NAN, 0.1).is_err());
    }

    #[test]
    fn decision_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RoutingDecision::Review).expect("serialize"),
            "\"review\""
        );
    }
}
