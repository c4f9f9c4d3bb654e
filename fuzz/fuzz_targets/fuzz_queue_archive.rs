//! Fuzz target for persisted queue archives.
//!
//! Archives are read back from disk and may be truncated or hand-edited;
//! parsing must report an error rather than panic, and anything that parses
//! must serialize again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_queue::QueueArchive;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(archive) = QueueArchive::parse(text) {
        let json = archive.to_json().expect("parsed archive serializes");
        let reparsed = QueueArchive::parse(&json).expect("serialized archive parses");
        assert_eq!(reparsed.queue.len(), archive.queue.len());
    }
});
