#![no_main]
use libfuzzer_sys::fuzz_target;
use proxyshake::http::codec::{decode_reply, has_end_marker};

fuzz_target!(|data: &[u8]| {
    let _ = has_end_marker(data);
    let _ = decode_reply(data, false);
    let _ = decode_reply(data, true);
});
