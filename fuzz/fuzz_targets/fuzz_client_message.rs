#![no_main]

use libfuzzer_sys::fuzz_target;
use pvp_chess_client::protocol::{ClientMessage, MoveIntent};

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ClientMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        // A parsed UCI token prints back to itself, modulo promotion case.
        if let Ok(intent) = MoveIntent::parse_uci(s) {
            assert_eq!(intent.uci(), s.to_ascii_lowercase());
        }
    }
});
