//! The proposer role: drives the two-phase protocol for proposal numbers this node has minted.
//! Per-round state lives in a map keyed by proposal number; the quorum-reached latches
//! (`phase2_started`, `decided`) are flipped under the round's own lock, so the broadcast that
//! follows a latch flip happens exactly once even under concurrent inbound messages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::info;

use crate::message::{Message, MessageType};
use crate::proposal_number::{ProposalNumber, ProposalNumberGenerator};

struct RoundState {
    original_value: String,
    promises: HashSet<String>,
    prior_accepted: HashMap<String, (ProposalNumber, String)>,
    phase2_started: bool,
    accepteds: HashSet<String>,
    decided: bool,
}

impl RoundState {
    fn new(original_value: String) -> Self {
        RoundState {
            original_value,
            promises: HashSet::new(),
            prior_accepted: HashMap::new(),
            phase2_started: false,
            accepteds: HashSet::new(),
            decided: false,
        }
    }
}

/// Drives phase 1 (PREPARE/PROMISE) and phase 2 (ACCEPT_REQUEST/ACCEPTED) for every proposal
/// number this node mints. Quorum is the cluster's majority, fixed at construction.
pub struct Proposer {
    id: String,
    quorum: usize,
    generator: ProposalNumberGenerator,
    rounds: Mutex<HashMap<ProposalNumber, Arc<Mutex<RoundState>>>>,
}

impl Proposer {
    pub fn new(id: impl Into<String>, quorum: usize) -> Self {
        let id = id.into();
        Proposer {
            generator: ProposalNumberGenerator::new(id.clone()),
            id,
            quorum,
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a fresh proposal number, records `candidate` as this round's original value, and
    /// returns the PREPARE to broadcast.
    pub fn start_prepare(&self, candidate: impl Into<String>) -> Message {
        let candidate = candidate.into();
        let pn = self.generator.next();

        {
            let mut rounds = self.rounds.lock().unwrap();
            rounds.insert(pn.clone(), Arc::new(Mutex::new(RoundState::new(candidate))));
        }

        info!("[{}] starting phase 1 for {}", self.id, pn);
        Message::new(MessageType::Prepare, self.id.clone()).with_proposal(pn)
    }

    /// Handles a PROMISE. Returns the ACCEPT_REQUEST to broadcast the first (and only) time a
    /// quorum of promises is reached for this round.
    pub fn on_promise(&self, msg: &Message) -> Option<Message> {
        let pn = msg.proposal.clone()?;
        let round = self.round_for(&pn)?;
        let mut state = round.lock().unwrap();

        state.promises.insert(msg.sender_id.clone());

        if let (Some(acc_n_raw), Some(acc_v)) = (msg.extra.get("accNum"), msg.extra.get("accVal")) {
            if let Ok(acc_n) = ProposalNumber::parse(acc_n_raw) {
                state
                    .prior_accepted
                    .insert(msg.sender_id.clone(), (acc_n, acc_v.clone()));
            }
        }

        if state.promises.len() < self.quorum || state.phase2_started {
            return None;
        }
        state.phase2_started = true;

        // Value-choice rule: adopt the value of the highest-numbered prior acceptance reported
        // by the quorum, or our own candidate if nobody reported one. Evaluated on this exact
        // snapshot; promises arriving later never change the phase-2 value.
        let value = state
            .prior_accepted
            .values()
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| state.original_value.clone());

        info!("[{}] quorum of promises for {}, proposing {}", self.id, pn, value);
        Some(
            Message::new(MessageType::AcceptRequest, self.id.clone())
                .with_proposal(pn)
                .with_value(value),
        )
    }

    /// Handles an ACCEPTED. Returns the DECIDE to broadcast the first (and only) time a quorum of
    /// acceptances is reached for this round.
    pub fn on_accepted(&self, msg: &Message) -> Option<Message> {
        let pn = msg.proposal.clone()?;
        let value = msg.value.clone()?;
        let round = self.round_for(&pn)?;
        let mut state = round.lock().unwrap();

        state.accepteds.insert(msg.sender_id.clone());

        if state.accepteds.len() < self.quorum || state.decided {
            return None;
        }
        state.decided = true;

        info!("[{}] quorum of accepteds for {}, deciding {}", self.id, pn, value);
        Some(Message::new(MessageType::Decide, self.id.clone()).with_proposal(pn).with_value(value))
    }

    fn round_for(&self, pn: &ProposalNumber) -> Option<Arc<Mutex<RoundState>>> {
        self.rounds.lock().unwrap().get(pn).cloned()
    }
}
