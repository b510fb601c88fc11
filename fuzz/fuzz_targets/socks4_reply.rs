#![no_main]
use libfuzzer_sys::fuzz_target;
use proxyshake::socks4::codec::decode_reply;

fuzz_target!(|data: &[u8]| {
    let _ = decode_reply(data);
});
