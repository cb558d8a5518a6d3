#![no_main]

use libfuzzer_sys::fuzz_target;
use ts_stream::{BufferSet, ColumnSource, FileSource, Schema, VariablesFile};

fuzz_target!(|data: &[u8]| {
    let Ok(mut source) = FileSource::from_bytes(data.to_vec()) else {
        return;
    };
    let Ok(vars) = VariablesFile::from_listing(&source.ls(), &Default::default()) else {
        return;
    };
    let Ok(schema) = Schema::parse(&vars.render()) else {
        return;
    };
    let mut buffers = BufferSet::declare(&schema);
    for field in schema.fields() {
        if let Ok(id) = buffers.id(&field.field_name) {
            let _ = source.select(&field.branch_name, id);
        }
    }
    for entry in 0..source.entries().min(64) {
        let _ = source.read(entry, &mut buffers);
    }
});
