#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use packet_bridge::core::framing::EnvelopeCodec;
use packet_bridge::core::packet::SessionId;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = EnvelopeCodec::with_limit(SessionId(1), 64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_packet)) = codec.decode(&mut buf) {}
});
