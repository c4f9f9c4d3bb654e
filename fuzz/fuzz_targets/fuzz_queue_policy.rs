//! Fuzz target for event buffer policy.
//!
//! Drives a buffer with arbitrary policies, clock steps, and events, and
//! checks that every accepted event leaves exactly once and in order.

#![no_main]

use std::sync::{Arc, Mutex};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use sift_common::{Event, ManualClock};
use sift_queue::{AppendOutcome, EventBuffer, QueueConfig};

#[derive(Debug, Arbitrary)]
enum Op {
    Append { advance: u16, kind: u8 },
    Flush,
}

#[derive(Debug, Arbitrary)]
struct Input {
    dedup_window: u16,
    more_than: i8,
    older_than: i16,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let uploaded: Arc<Mutex<Vec<Event>>> = Arc::default();
    let sink = Arc::clone(&uploaded);
    let config = QueueConfig::new()
        .with_accept_same_event_after(u64::from(input.dedup_window))
        .with_upload_when_more_than(i64::from(input.more_than))
        .with_upload_when_older_than(i64::from(input.older_than));
    let mut buffer = EventBuffer::new(
        config,
        clock.clone(),
        Arc::new(move |batch: Vec<Event>| sink.lock().unwrap().extend(batch)),
    );

    let mut accepted = Vec::new();
    let mut drained = Vec::new();
    for (seq, op) in input.ops.into_iter().enumerate() {
        match op {
            Op::Append { advance, kind } => {
                clock.advance(u64::from(advance));
                let event = Event::new(1_000_000 + seq as u64, Default::default())
                    .with_field("kind", json!(kind % 4));
                if buffer.append(event.clone()) != AppendOutcome::Duplicate {
                    accepted.push(event);
                }
            }
            Op::Flush => drained.extend(buffer.flush()),
        }
    }

    // Triggered batches and explicit flushes interleave, so compare the
    // multiset by sequence number.
    let mut delivered: Vec<Event> = uploaded.lock().unwrap().clone();
    delivered.extend(drained);
    delivered.extend(buffer.pending_events());
    let key = |e: &Event| e.time;
    delivered.sort_by_key(key);
    accepted.sort_by_key(key);
    assert_eq!(delivered, accepted);
});
