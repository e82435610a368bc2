use super::view::View;
use crate::common::MemberId;
use std::collections::HashSet;

/// Weight lost between two consecutive views when it crossed the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct QuorumLoss {
    /// Members of the prior view that the new view lists as crashed.
    pub crashed: HashSet<MemberId>,
    pub lost_weight: u32,
    pub total_weight: u32,
}

/// Decides whether a view change lost too much member weight.
#[derive(Debug, Clone, Copy)]
pub struct QuorumPolicy {
    /// Percentage of the prior view's weight.
    threshold: u8,
}

impl QuorumPolicy {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    /// Compare `prior` with its successor `next`.
    ///
    /// Only crashes count, members that shut down cleanly do not. Quorum is
    /// lost when the crashed weight reaches `threshold` percent of the prior
    /// view's total weight.
    pub fn check(&self, prior: &View, next: &View) -> Option<QuorumLoss> {
        let crashed = prior
            .members()
            .iter()
            .filter(|m| next.crashed_members().contains(*m))
            .cloned()
            .collect::<HashSet<_>>();

        if crashed.is_empty() {
            return None;
        }

        // Weights come from the prior view, which is where they were admitted.
        let lost_weight = crashed.iter().map(|m| u32::from(m.weight())).sum::<u32>();
        let total_weight = prior.total_weight();

        if total_weight == 0 || lost_weight * 100 < total_weight * u32::from(self.threshold) {
            return None;
        }

        Some(QuorumLoss {
            crashed,
            lost_weight,
            total_weight,
        })
    }
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{member, view_of};

    fn crash(view: &View, id: u64, ports: &[u16]) -> View {
        let mut next = view.successor(member(1), id);
        for port in ports {
            next.add_crashed(&member(*port)).unwrap();
        }
        next
    }

    #[test]
    fn losing_half_the_weight_loses_quorum() {
        // A, B, C, D all weighing 10
        let prior = view_of(5, &[1, 2, 3, 4]);
        let next = crash(&prior, 6, &[2, 3]);

        let loss = QuorumPolicy::default().check(&prior, &next).unwrap();
        assert_eq!(loss.crashed, vec![member(2), member(3)].into_iter().collect());
        assert_eq!(loss.lost_weight, 20);
        assert_eq!(loss.total_weight, 40);
    }

    #[test]
    fn minority_loss_keeps_quorum() {
        let prior = view_of(5, &[1, 2, 3, 4]);
        let next = crash(&prior, 6, &[2]);

        assert!(QuorumPolicy::default().check(&prior, &next).is_none());
    }

    #[test]
    fn weights_matter_more_than_counts() {
        let mut prior = view_of(5, &[1, 3, 4]);
        prior.add(member(2).with_weight(20)).unwrap();
        // 50 total, losing the heavy member and one more is 30
        let next = crash(&prior, 6, &[2, 3]);

        let loss = QuorumPolicy::default().check(&prior, &next).unwrap();
        assert_eq!(loss.lost_weight, 30);
        assert_eq!(loss.total_weight, 50);

        let next = crash(&prior, 6, &[3, 4]);
        assert!(QuorumPolicy::default().check(&prior, &next).is_none());
    }

    #[test]
    fn clean_shutdowns_do_not_count() {
        let prior = view_of(5, &[1, 2, 3, 4]);
        let mut next = prior.successor(member(1), 6);
        next.add_shutdown(&member(2)).unwrap();
        next.add_shutdown(&member(3)).unwrap();
        next.add_shutdown(&member(4)).unwrap();

        assert!(QuorumPolicy::default().check(&prior, &next).is_none());
    }

    #[test]
    fn threshold_is_configurable() {
        let prior = view_of(5, &[1, 2, 3, 4]);
        let next = crash(&prior, 6, &[2]);

        assert!(QuorumPolicy::new(25).check(&prior, &next).is_some());
        assert!(QuorumPolicy::new(26).check(&prior, &next).is_none());
    }
}
