//! Readiness evaluation (spec §4.13): blockers feed a single
//! `promote_candidate | hold | not_ready` recommendation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    PromoteCandidate,
    Hold,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Blocker {
    SplitBrainRisk,
    ReplicationLagExceeded,
    FailoverAlreadyInFlight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub recommendation: Recommendation,
    pub blockers: Vec<Blocker>,
    pub replication_lag: Duration,
}

/// `split_brain_risk` and an in-flight run are hard blockers (`not_ready`);
/// lag over `threshold` alone only downgrades to `hold` since a candidate
/// may still catch up before the operator acts.
pub fn evaluate_readiness(replication_lag: Duration, threshold: Duration, split_brain_risk: bool, already_in_flight: bool) -> Readiness {
    let mut blockers = Vec::new();
    if split_brain_risk {
        blockers.push(Blocker::SplitBrainRisk);
    }
    if already_in_flight {
        blockers.push(Blocker::FailoverAlreadyInFlight);
    }
    if replication_lag > threshold {
        blockers.push(Blocker::ReplicationLagExceeded);
    }

    let recommendation = if split_brain_risk || already_in_flight {
        Recommendation::NotReady
    } else if replication_lag > threshold {
        Recommendation::Hold
    } else {
        Recommendation::PromoteCandidate
    };

    Readiness { recommendation, blockers, replication_lag }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_blockers_yields_promote_candidate() {
        let r = evaluate_readiness(Duration::from_millis(50), Duration::from_secs(1), false, false);
        assert_eq!(r.recommendation, Recommendation::PromoteCandidate);
        assert!(r.blockers.is_empty());
    }

    #[test]
    fn excess_lag_alone_yields_hold_not_not_ready() {
        let r = evaluate_readiness(Duration::from_secs(10), Duration::from_secs(1), false, false);
        assert_eq!(r.recommendation, Recommendation::Hold);
        assert_eq!(r.blockers, vec![Blocker::ReplicationLagExceeded]);
    }

    #[test]
    fn split_brain_risk_forces_not_ready_even_with_healthy_lag() {
        let r = evaluate_readiness(Duration::from_millis(1), Duration::from_secs(1), true, false);
        assert_eq!(r.recommendation, Recommendation::NotReady);
        assert_eq!(r.blockers, vec![Blocker::SplitBrainRisk]);
    }

    #[test]
    fn in_flight_run_forces_not_ready() {
        let r = evaluate_readiness(Duration::from_millis(1), Duration::from_secs(1), false, true);
        assert_eq!(r.recommendation, Recommendation::NotReady);
    }
}
