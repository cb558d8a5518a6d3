#![no_main]

use libfuzzer_sys::fuzz_target;
use ts_stream::{Schema, VariablesFile};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(schema) = Schema::parse(text) {
        let _ = ts_stream::BufferSet::declare(&schema);
    }
    let _ = VariablesFile::from_listing(text, &Default::default());
});
