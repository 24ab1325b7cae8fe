//! The learner role: watches ACCEPTED and DECIDE traffic and announces consensus exactly once.
//! A learner does not need to be the proposer that drove the winning round -- DECIDE alone is
//! enough for it to announce, and ACCEPTED tallies let the proposer's own learner announce even
//! sooner, without waiting for the DECIDE it is about to broadcast to itself.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use log::info;

use crate::message::Message;
use crate::proposal_number::ProposalNumber;

pub struct Learner {
    id: String,
    quorum: usize,
    decided: AtomicBool,
    votes: Mutex<HashMap<ProposalNumber, HashMap<String, HashSet<String>>>>,
    decided_value: Mutex<Option<String>>,
    announcements: AtomicUsize,
}

impl Learner {
    pub fn new(id: impl Into<String>, quorum: usize) -> Self {
        Learner {
            id: id.into(),
            quorum,
            decided: AtomicBool::new(false),
            votes: Mutex::new(HashMap::new()),
            decided_value: Mutex::new(None),
            announcements: AtomicUsize::new(0),
        }
    }

    pub fn has_decided(&self) -> bool {
        self.decided.load(Ordering::SeqCst)
    }

    pub fn decided_value(&self) -> Option<String> {
        self.decided_value.lock().unwrap().clone()
    }

    /// How many times this learner has actually printed the consensus line. Exposed so tests can
    /// check at-most-once announcement under real concurrent/duplicate delivery, rather than
    /// trusting the `AtomicBool` latch by inspection alone.
    pub fn announcement_count(&self) -> usize {
        self.announcements.load(Ordering::SeqCst)
    }

    /// Tallies one ACCEPTED vote. Returns `Some(value)` exactly once, the moment a quorum of
    /// acceptor ids agree on the same (proposal number, value) pair.
    pub fn on_accepted(&self, msg: &Message) -> Option<String> {
        if self.has_decided() {
            return None;
        }

        let pn = msg.proposal.clone()?;
        let value = msg.value.clone()?;

        let reached_quorum = {
            let mut votes = self.votes.lock().unwrap();
            let voters = votes.entry(pn).or_default().entry(value.clone()).or_default();
            voters.insert(msg.sender_id.clone());
            voters.len() >= self.quorum
        };

        if !reached_quorum {
            return None;
        }

        self.announce(value)
    }

    /// Handles a DECIDE. Idempotent: announces once, then ignores every further DECIDE.
    pub fn on_decide(&self, msg: &Message) -> Option<String> {
        if self.has_decided() {
            return None;
        }

        let value = msg.value.clone()?;
        self.announce(value)
    }

    fn announce(&self, value: String) -> Option<String> {
        if self.decided.swap(true, Ordering::SeqCst) {
            return None;
        }

        *self.decided_value.lock().unwrap() = Some(value.clone());
        self.announcements.fetch_add(1, Ordering::SeqCst);
        info!("[{}] consensus reached on {}", self.id, value);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn accepted(pn: &str, value: &str, from: &str) -> Message {
        Message::new(MessageType::Accepted, from)
            .with_proposal(ProposalNumber::parse(pn).unwrap())
            .with_value(value)
    }

    fn decide(pn: &str, value: &str, from: &str) -> Message {
        Message::new(MessageType::Decide, from)
            .with_proposal(ProposalNumber::parse(pn).unwrap())
            .with_value(value)
    }

    #[test]
    fn announces_once_quorum_of_accepted_reached() {
        let learner = Learner::new("L1", 3);
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A1")).is_none());
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A2")).is_none());
        let value = learner.on_accepted(&accepted("1.M1", "M5", "A3")).unwrap();
        assert_eq!(value, "M5");
        assert!(learner.has_decided());
    }

    #[test]
    fn duplicate_voter_does_not_double_count() {
        let learner = Learner::new("L1", 3);
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A1")).is_none());
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A1")).is_none());
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A2")).is_none());
    }

    #[test]
    fn decide_is_idempotent() {
        let learner = Learner::new("L1", 3);
        assert!(learner.on_decide(&decide("1.M1", "M5", "P1")).is_some());
        assert!(learner.on_decide(&decide("1.M1", "M5", "P1")).is_none());
        assert!(learner.on_decide(&decide("2.M2", "M9", "P2")).is_none());
    }

    #[test]
    fn accepted_after_decide_is_ignored() {
        let learner = Learner::new("L1", 3);
        learner.on_decide(&decide("1.M1", "M5", "P1"));
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A1")).is_none());
        assert_eq!(learner.decided_value(), Some("M5".to_string()));
    }

    #[test]
    fn votes_for_different_values_at_the_same_round_do_not_mix() {
        let learner = Learner::new("L1", 2);
        assert!(learner.on_accepted(&accepted("1.M1", "M5", "A1")).is_none());
        assert!(learner.on_accepted(&accepted("1.M1", "M9", "A2")).is_none());
        let value = learner.on_accepted(&accepted("1.M1", "M5", "A3")).unwrap();
        assert_eq!(value, "M5");
    }
}
