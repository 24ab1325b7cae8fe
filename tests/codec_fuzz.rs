//! Property test: arbitrary well-formed messages survive an encode/decode round trip.

use paxos_council::message::{Message, MessageType};
use paxos_council::proposal_number::ProposalNumber;
use rand::Rng;

const MSG_TYPES: [MessageType; 5] = [
    MessageType::Prepare,
    MessageType::Promise,
    MessageType::AcceptRequest,
    MessageType::Accepted,
    MessageType::Decide,
];

/// Random ASCII token with no `;` or `=`, the only characters the wire codec treats specially.
fn random_token(rng: &mut impl Rng, max_len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-.";
    let len = rng.gen_range(1..=max_len);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn random_message(rng: &mut impl Rng) -> Message {
    let msg_type = MSG_TYPES[rng.gen_range(0..MSG_TYPES.len())];
    let mut msg = Message::new(msg_type, random_token(rng, 6));

    if rng.gen_bool(0.8) {
        let counter = rng.gen_range(0..1_000_000u64);
        msg = msg.with_proposal(ProposalNumber::new(counter, random_token(rng, 6)));
    }

    if rng.gen_bool(0.6) {
        msg = msg.with_value(random_token(rng, 8));
    }

    for _ in 0..rng.gen_range(0..4) {
        msg = msg.with_extra(random_token(rng, 5), random_token(rng, 10));
    }

    msg
}

#[test]
fn random_messages_round_trip_through_the_wire_codec() {
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        let msg = random_message(&mut rng);
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).unwrap_or_else(|e| {
            panic!("failed to decode {:?} (from {:?}): {}", encoded, msg, e)
        });
        assert_eq!(msg, decoded, "round trip mismatch for {:?}", encoded);
    }
}

#[test]
fn encoding_never_produces_a_field_with_an_unescaped_separator() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let msg = random_message(&mut rng);
        let encoded = msg.encode();
        // Every field must still split cleanly on the first '=' -- this is the property the
        // "no ';' or '=' in tokens" generator constraint is protecting.
        for field in encoded.split(';') {
            assert!(field.find('=').is_some(), "field without '=' in {:?}", encoded);
        }
    }
}
