#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // Bounded so each run stays fast.
    let expected_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize % (1 << 20);
    let src = &data[4..];

    let _ = ts_stream::compress::decompress(src, expected_len);
});
