#![no_main]

use libfuzzer_sys::fuzz_target;
use pvp_chess_client::protocol::ServerEvent;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything that decodes must encode again and decode to the same event.
        if let Ok(event) = ServerEvent::decode(s) {
            if let Ok(text) = event.encode() {
                assert_eq!(ServerEvent::decode(&text).ok(), Some(event));
            }
        }
    }
});
