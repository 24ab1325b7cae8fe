//! Node wiring: constructs the acceptor, proposer and learner for one node, routes inbound
//! messages to them by type, and exposes the single entry point ("propose a candidate") that the
//! CLI and the interactive input loop both drive.

use std::sync::Arc;

use log::warn;

use crate::acceptor::Acceptor;
use crate::config::ClusterConfig;
use crate::error::PaxosError;
use crate::learner::Learner;
use crate::message::{Message, MessageType};
use crate::proposer::Proposer;
use crate::transport::{Handler, Transport};

pub struct Node {
    id: String,
    config: ClusterConfig,
    acceptor: Acceptor,
    proposer: Proposer,
    learner: Learner,
    transport: Arc<dyn Transport>,
}

impl Node {
    pub fn new(id: impl Into<String>, config: ClusterConfig, transport: Arc<dyn Transport>) -> Self {
        let id = id.into();
        let quorum = config.quorum();
        Node {
            acceptor: Acceptor::new(id.clone()),
            proposer: Proposer::new(id.clone(), quorum),
            learner: Learner::new(id.clone(), quorum),
            id,
            config,
            transport,
        }
    }

    /// Begins listening and prints the required startup line. `self` must be wrapped in an `Arc`
    /// because the dispatch closure handed to the transport needs to outlive this call.
    pub fn start(self: &Arc<Self>) -> Result<(), PaxosError> {
        let dispatch_target = self.clone();
        let handler: Handler = Arc::new(move |msg| dispatch_target.dispatch(msg));
        self.transport.start(handler)?;

        let port = self
            .config
            .addr_of(&self.id)
            .map(|a| a.port())
            .unwrap_or_default();
        println!("[{}] listening on {}", self.id, port);
        Ok(())
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn has_decided(&self) -> bool {
        self.learner.has_decided()
    }

    pub fn decided_value(&self) -> Option<String> {
        self.learner.decided_value()
    }

    /// How many times this node has printed the consensus line. Used to check at-most-once
    /// announcement (property 4) under real concurrent delivery.
    pub fn announcement_count(&self) -> usize {
        self.learner.announcement_count()
    }

    /// This node's acceptor's current `highest_promised`, for checking acceptor monotonicity
    /// (property 3) by polling over the course of a run.
    pub fn highest_promised(&self) -> Option<crate::proposal_number::ProposalNumber> {
        self.acceptor.highest_promised()
    }

    /// Starts phase 1 for `candidate`. Rejects candidates outside the configured membership with
    /// `UnknownCandidate`, as required of interactive/CLI callers; the proposer role itself does
    /// not validate.
    pub fn propose(&self, candidate: &str) -> Result<(), PaxosError> {
        if !self.config.contains(candidate) {
            return Err(PaxosError::UnknownCandidate(candidate.to_string()));
        }

        let prepare = self.proposer.start_prepare(candidate);
        self.transport.broadcast(&prepare);
        Ok(())
    }

    /// The single fan-out point: routes one inbound message to the role(s) that handle its type.
    /// ACCEPTED goes to both the proposer and the learner, in that order, matching §4.7.
    fn dispatch(&self, msg: Message) {
        match msg.msg_type {
            MessageType::Prepare => {
                if let Some(reply) = self.acceptor.on_prepare(&msg) {
                    self.reply_to(&msg.sender_id, &reply);
                }
            }
            MessageType::AcceptRequest => {
                if let Some(reply) = self.acceptor.on_accept_request(&msg) {
                    self.reply_to(&msg.sender_id, &reply);
                }
            }
            MessageType::Promise => {
                if let Some(accept_request) = self.proposer.on_promise(&msg) {
                    self.transport.broadcast(&accept_request);
                }
            }
            MessageType::Accepted => {
                if let Some(decide) = self.proposer.on_accepted(&msg) {
                    self.transport.broadcast(&decide);
                }
                if let Some(value) = self.learner.on_accepted(&msg) {
                    self.announce(&value);
                }
            }
            MessageType::Decide => {
                if let Some(value) = self.learner.on_decide(&msg) {
                    self.announce(&value);
                }
            }
        }
    }

    fn reply_to(&self, peer_id: &str, reply: &Message) {
        if let Err(e) = self.transport.send(peer_id, reply) {
            warn!("[{}] could not reply to {}: {}", self.id, peer_id, e);
        }
    }

    fn announce(&self, value: &str) {
        println!("CONSENSUS: {} has been elected Council President!", value);
    }
}
