//! Fuzz target for persisted session configuration.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_config::{validate_session_config, SessionConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = SessionConfig::from_json(text) {
        let _ = validate_session_config(&config);
        let _ = config.destinations();
    }
});
