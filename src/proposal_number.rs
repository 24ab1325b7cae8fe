//! Proposal numbers: the totally ordered (counter, proposer-id) pairs that drive every phase of
//! the protocol. Two proposal numbers generated anywhere in the cluster never compare equal,
//! because each proposer owns a monotonically increasing counter and embeds its own id.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::PaxosError;

/// A single (counter, proposer-id) pair, totally ordered by counter first, then by the
/// proposer-id's lexicographic order to break ties between distinct proposers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProposalNumber {
    counter: u64,
    proposer_id: String,
}

impl ProposalNumber {
    pub fn new(counter: u64, proposer_id: impl Into<String>) -> Self {
        ProposalNumber {
            counter,
            proposer_id: proposer_id.into(),
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn proposer_id(&self) -> &str {
        &self.proposer_id
    }

    /// Parses the `"<counter>.<id>"` text form. The separator is the first `.` in the string, so
    /// proposer ids are free to contain anything except a leading digit-only prefix that would be
    /// ambiguous with the counter -- in practice member-ids never contain a dot.
    pub fn parse(s: &str) -> Result<Self, PaxosError> {
        let dot = s
            .find('.')
            .ok_or_else(|| PaxosError::MalformedProposalNumber(s.to_string()))?;

        let (counter_part, rest) = s.split_at(dot);
        let proposer_id = &rest[1..];

        if proposer_id.is_empty() {
            return Err(PaxosError::MalformedProposalNumber(s.to_string()));
        }

        let counter: u64 = counter_part
            .parse()
            .map_err(|_| PaxosError::MalformedProposalNumber(s.to_string()))?;

        Ok(ProposalNumber::new(counter, proposer_id))
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.counter, self.proposer_id)
    }
}

impl FromStr for ProposalNumber {
    type Err = PaxosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalNumber::parse(s)
    }
}

impl PartialOrd for ProposalNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProposalNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.proposer_id.cmp(&other.proposer_id))
    }
}

/// Mints fresh, strictly increasing proposal numbers for one proposer-id. The counter increment
/// is the only mutual exclusion this type needs; it is safe to share across worker threads.
pub struct ProposalNumberGenerator {
    proposer_id: String,
    counter: AtomicU64,
}

impl ProposalNumberGenerator {
    pub fn new(proposer_id: impl Into<String>) -> Self {
        ProposalNumberGenerator {
            proposer_id: proposer_id.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the next proposal number for this proposer, strictly greater than every one this
    /// generator has returned before.
    pub fn next(&self) -> ProposalNumber {
        let counter = self.counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        ProposalNumber::new(counter, self.proposer_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let pn = ProposalNumber::new(7, "M4");
        assert_eq!(ProposalNumber::parse(&pn.to_string()).unwrap(), pn);
    }

    #[test]
    fn format_matches_spec_example() {
        let pn = ProposalNumber::new(7, "M4");
        assert_eq!(pn.to_string(), "7.M4");
    }

    #[test]
    fn parse_rejects_missing_dot() {
        assert!(ProposalNumber::parse("7M4").is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_counter() {
        assert!(ProposalNumber::parse("abc.M4").is_err());
    }

    #[test]
    fn parse_rejects_empty_proposer_id() {
        assert!(ProposalNumber::parse("7.").is_err());
    }

    #[test]
    fn parse_rejects_negative_counter() {
        assert!(ProposalNumber::parse("-1.M4").is_err());
    }

    #[test]
    fn compare_orders_by_counter_then_proposer_id() {
        assert!(ProposalNumber::new(1, "M9") < ProposalNumber::new(2, "M1"));
        assert!(ProposalNumber::new(5, "M1") < ProposalNumber::new(5, "M2"));
        assert_eq!(
            ProposalNumber::new(5, "M1").cmp(&ProposalNumber::new(5, "M1")),
            Ordering::Equal
        );
    }

    #[test]
    fn generator_produces_strictly_increasing_numbers() {
        let gen = ProposalNumberGenerator::new("M1");
        let a = gen.next();
        let b = gen.next();
        assert!(a < b);
        assert_eq!(a.proposer_id(), "M1");
    }

    #[test]
    fn distinct_proposers_never_collide() {
        let a = ProposalNumberGenerator::new("M1");
        let b = ProposalNumberGenerator::new("M2");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(a.next()));
            assert!(seen.insert(b.next()));
        }
    }
}
