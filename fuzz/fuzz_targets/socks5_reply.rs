#![no_main]
use libfuzzer_sys::fuzz_target;
use proxyshake::socks5::codec::{
    decode_auth_reply, decode_bound_address, decode_connect_header, decode_greeting_reply,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_greeting_reply(data, true);
    let _ = decode_greeting_reply(data, false);
    let _ = decode_auth_reply(data);

    // Header first, then whatever follows as the bound address.
    if let Ok(reply) = decode_connect_header(data) {
        let tail = data.get(4..).unwrap_or_default();
        let _ = decode_bound_address(reply.address_type, tail);
    }
});
