//! The acceptor role: the half of the protocol that votes on proposals. All state mutation
//! happens inside a single mutual-exclusion region per node; the handlers never hold that lock
//! across a network call.

use std::sync::Mutex;

use log::{debug, info};

use crate::message::{Message, MessageType};
use crate::proposal_number::ProposalNumber;

#[derive(Debug, Default)]
struct AcceptorState {
    highest_promised: Option<ProposalNumber>,
    accepted_number: Option<ProposalNumber>,
    accepted_value: Option<String>,
}

/// Per-node durable-in-memory acceptor record. `highest_promised` is monotonic non-decreasing
/// (invariant A2); `accepted_value` is set iff `accepted_number` is (A3); whenever
/// `accepted_number` is set, `highest_promised` is set and at least as high (A1).
pub struct Acceptor {
    id: String,
    state: Mutex<AcceptorState>,
}

impl Acceptor {
    pub fn new(id: impl Into<String>) -> Self {
        Acceptor {
            id: id.into(),
            state: Mutex::new(AcceptorState::default()),
        }
    }

    /// Handles a PREPARE. Promises `n` (and bumps `highest_promised` to it) iff no strictly
    /// higher promise has already been made; returns the PROMISE reply to send back, or `None` if
    /// the request is silently rejected. A rejected PREPARE never produces a NACK.
    pub fn on_prepare(&self, msg: &Message) -> Option<Message> {
        let n = msg.proposal.clone()?;

        let snapshot = {
            let mut state = self.state.lock().unwrap();

            let should_promise = match &state.highest_promised {
                None => true,
                Some(highest) => n >= *highest,
            };

            if !should_promise {
                debug!(
                    "[{}] rejecting PREPARE({}) from {}: already promised {:?}",
                    self.id, n, msg.sender_id, state.highest_promised
                );
                None
            } else {
                state.highest_promised = Some(n.clone());
                Some((state.accepted_number.clone(), state.accepted_value.clone()))
            }
        };

        let (accepted_number, accepted_value) = snapshot?;

        info!("[{}] promising {} to {}", self.id, n, msg.sender_id);

        let mut reply = Message::new(MessageType::Promise, self.id.clone()).with_proposal(n);
        if let (Some(acc_n), Some(acc_v)) = (accepted_number, accepted_value) {
            reply = reply
                .with_extra("accNum", acc_n.to_string())
                .with_extra("accVal", acc_v);
        }
        Some(reply)
    }

    /// Handles an ACCEPT_REQUEST. Accepts `(n, v)` iff no strictly higher promise is outstanding;
    /// equality with `highest_promised` is accepted, since the only way to reach `n ==
    /// highest_promised` is a PREPARE this acceptor already promised for the same `n`.
    pub fn on_accept_request(&self, msg: &Message) -> Option<Message> {
        let n = msg.proposal.clone()?;
        let value = msg.value.clone()?;

        let accepted = {
            let mut state = self.state.lock().unwrap();

            let ok = match &state.highest_promised {
                None => true,
                Some(highest) => n >= *highest,
            };

            if ok {
                state.highest_promised = Some(n.clone());
                state.accepted_number = Some(n.clone());
                state.accepted_value = Some(value.clone());
            } else {
                debug!(
                    "[{}] rejecting ACCEPT_REQUEST({}) from {}: already promised {:?}",
                    self.id, n, msg.sender_id, state.highest_promised
                );
            }

            ok
        };

        if !accepted {
            return None;
        }

        info!("[{}] accepting ({}, {}) from {}", self.id, n, value, msg.sender_id);
        Some(Message::new(MessageType::Accepted, self.id.clone()).with_proposal(n).with_value(value))
    }

    /// The current `highest_promised`, for callers that need to observe the monotonic sequence
    /// from outside (tests, diagnostics). Not part of the protocol surface.
    pub fn highest_promised(&self) -> Option<ProposalNumber> {
        self.state.lock().unwrap().highest_promised.clone()
    }

    #[cfg(test)]
    fn accepted(&self) -> Option<(ProposalNumber, String)> {
        let state = self.state.lock().unwrap();
        match (&state.accepted_number, &state.accepted_value) {
            (Some(n), Some(v)) => Some((n.clone(), v.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(n: &str, from: &str) -> Message {
        Message::new(MessageType::Prepare, from).with_proposal(ProposalNumber::parse(n).unwrap())
    }

    fn accept_request(n: &str, value: &str, from: &str) -> Message {
        Message::new(MessageType::AcceptRequest, from)
            .with_proposal(ProposalNumber::parse(n).unwrap())
            .with_value(value)
    }

    #[test]
    fn first_prepare_is_always_promised() {
        let acceptor = Acceptor::new("A1");
        let reply = acceptor.on_prepare(&prepare("1.M1", "M1")).unwrap();
        assert_eq!(reply.msg_type, MessageType::Promise);
        assert_eq!(reply.proposal, Some(ProposalNumber::parse("1.M1").unwrap()));
        assert!(reply.extra.is_empty());
    }

    #[test]
    fn duplicate_prepare_for_same_number_is_idempotent() {
        let acceptor = Acceptor::new("A1");
        assert!(acceptor.on_prepare(&prepare("5.M1", "M1")).is_some());
        assert!(acceptor.on_prepare(&prepare("5.M1", "M1")).is_some());
        assert_eq!(acceptor.highest_promised(), Some(ProposalNumber::parse("5.M1").unwrap()));
    }

    #[test]
    fn prepare_with_lower_number_is_rejected() {
        let acceptor = Acceptor::new("A1");
        acceptor.on_prepare(&prepare("5.M2", "M2"));
        assert!(acceptor.on_prepare(&prepare("3.M1", "M1")).is_none());
        assert_eq!(acceptor.highest_promised(), Some(ProposalNumber::parse("5.M2").unwrap()));
    }

    #[test]
    fn promise_carries_prior_acceptance() {
        let acceptor = Acceptor::new("A1");
        acceptor.on_accept_request(&accept_request("2.M1", "M5", "M1"));
        let reply = acceptor.on_prepare(&prepare("9.M2", "M2")).unwrap();
        assert_eq!(reply.extra.get("accNum"), Some(&"2.M1".to_string()));
        assert_eq!(reply.extra.get("accVal"), Some(&"M5".to_string()));
    }

    #[test]
    fn accept_request_equal_to_highest_promised_is_accepted() {
        let acceptor = Acceptor::new("A1");
        acceptor.on_prepare(&prepare("4.M1", "M1"));
        assert!(acceptor.on_accept_request(&accept_request("4.M1", "M5", "M1")).is_some());
        assert_eq!(acceptor.accepted(), Some((ProposalNumber::parse("4.M1").unwrap(), "M5".to_string())));
    }

    #[test]
    fn accept_request_below_highest_promised_is_rejected() {
        let acceptor = Acceptor::new("A1");
        acceptor.on_prepare(&prepare("9.M2", "M2"));
        assert!(acceptor.on_accept_request(&accept_request("4.M1", "M5", "M1")).is_none());
        assert_eq!(acceptor.accepted(), None);
    }

    #[test]
    fn highest_promised_is_monotonic_non_decreasing() {
        let acceptor = Acceptor::new("A1");
        let numbers = ["1.M1", "3.M2", "3.M3", "7.M1"];
        let mut last = None;
        for n in numbers {
            acceptor.on_prepare(&prepare(n, "X"));
            let current = acceptor.highest_promised().unwrap();
            if let Some(prev) = last {
                assert!(current >= prev);
            }
            last = Some(current);
        }
    }

    #[test]
    fn invariants_hold_after_accept() {
        let acceptor = Acceptor::new("A1");
        acceptor.on_accept_request(&accept_request("2.M1", "M5", "M1"));
        let state = acceptor.state.lock().unwrap();
        assert!(state.highest_promised.is_some());
        assert!(state.highest_promised >= state.accepted_number);
        assert_eq!(state.accepted_number.is_some(), state.accepted_value.is_some());
    }
}
