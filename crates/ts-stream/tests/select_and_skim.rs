mod common;

use common::{delphes_schema, fill, jet_pt, n_jets};
use ts_stream::{
    ColumnSource, EventBuffer, MemoryStore, RecordSink, Schema, StreamConfig, StreamError, Value,
};

fn delphes_store(entries: u64) -> MemoryStore {
    let store = MemoryStore::new("Delphes");
    let mut out = EventBuffer::writer(delphes_schema(), store.sink()).unwrap();
    for entry in 0..entries {
        fill(out.buffers_mut(), entry);
        out.commit().unwrap();
    }
    out.close().unwrap();
    store
}

#[test]
fn activation_reads_only_matching_fields_and_their_counters() {
    let store = delphes_store(6);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "Jet.").unwrap();
    assert!(input.is_active("Jet.PT"));
    assert!(input.is_active("Jet_size"));
    assert!(!input.is_active("Muon.PT"));

    input.read(4).unwrap();
    let buffers = input.buffers();
    assert_eq!(buffers.array::<f32>("Jet_PT").unwrap(), jet_pt(4).as_slice());
    assert_eq!(buffers.scalar::<i32>("Jet_size").unwrap(), 4);
    assert_eq!(buffers.len("Muon_PT").unwrap(), 0);
    assert_eq!(buffers.scalar::<f64>("HT").unwrap(), 0.0);
}

#[test]
fn counters_are_read_when_only_scalars_are_active() {
    let store = delphes_store(6);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "HT").unwrap();
    assert!(input.is_active("Jet_size"));
    assert!(!input.is_active("Jet.PT"));

    for entry in 0..input.size() {
        input.read(entry).unwrap();
        let buffers = input.buffers();
        assert_eq!(buffers.scalar::<i32>("Jet_size").unwrap() as usize, n_jets(entry));
        assert_eq!(buffers.len("Jet_PT").unwrap(), 0);
    }
}

#[test]
fn strict_activation_rejects_unmatched_prefixes() {
    let store = delphes_store(1);
    let mut stream =
        EventBuffer::with_config(delphes_schema(), StreamConfig { strict_activation: true });
    let err = stream.open_read(store.source(), "Jet. Electron.").unwrap_err();
    assert!(matches!(err, StreamError::UnknownField(p) if p == "Electron."));

    // Lenient by default: the stream opens and reads what matched.
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "Jet. Electron.").unwrap();
    input.read(0).unwrap();
}

#[test]
fn fields_missing_from_the_store_fail_to_bind() {
    let store = delphes_store(1);
    let schema =
        Schema::parse("Tree Delphes\n\ndouble\tHT\tHT 1\nfloat\tElectron.PT\tElectron_PT 4 nEle\n")
            .unwrap();
    let err = EventBuffer::reader(schema.clone(), store.source(), "").err().unwrap();
    assert!(matches!(err, StreamError::UnknownField(name) if name == "Electron.PT"));

    // Leaving the missing field inactive is fine.
    let mut input = EventBuffer::reader(schema, store.source(), "HT").unwrap();
    input.read(0).unwrap();
}

#[test]
fn save_objects_skims_selected_jets() {
    let store = delphes_store(6);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "").unwrap();
    let skimmed = MemoryStore::new("Delphes");
    let mut skim = RecordSink::open(skimmed.sink(), input.buffers()).unwrap();

    let jet = input.select("Jet").unwrap();
    for entry in 0..input.size() {
        input.read(entry).unwrap();
        if n_jets(entry) >= 3 {
            input.select_index(jet, 2).unwrap();
            input.select_index(jet, 0).unwrap();
        }
        input.save_objects().unwrap();
        skim.commit(input.buffers_mut()).unwrap();
    }
    skim.close().unwrap();

    let mut check = EventBuffer::reader(delphes_schema(), skimmed.source(), "").unwrap();
    assert_eq!(check.size(), 6);
    for entry in 0..6 {
        check.read(entry).unwrap();
        let pts = check.buffers().array::<f32>("Jet_PT").unwrap().to_vec();
        let njet = check.buffers().scalar::<i32>("Jet_size").unwrap();
        if n_jets(entry) >= 3 {
            let all = jet_pt(entry);
            assert_eq!(pts, vec![all[2], all[0]]);
            assert_eq!(njet, 2);
            assert_eq!(check.buffers().len("Jet_BTag").unwrap(), 2);
        } else {
            // Declared but nothing pushed: keep nothing.
            assert!(pts.is_empty());
            assert_eq!(njet, 0);
        }
        // Muons were never declared and pass through.
        assert_eq!(check.buffers().len("Muon_PT").unwrap(), (entry % 3) as usize);
    }
}

#[test]
fn objects_expose_members_by_name() {
    let store = delphes_store(6);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "Jet. Muon.").unwrap();
    input.read(5).unwrap();

    let jets = input.objects("Jet").unwrap();
    assert_eq!(jets.len(), 5);
    assert_eq!(jets[1].get_f64("PT"), Some(f64::from(jet_pt(5)[1])));
    assert_eq!(jets[1].get("BTag"), Some(&Value::Int(1)));
    assert!(jets[0].to_string().contains("Eta"));

    let all = input.fill_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].1.len(), 2);
    assert!(matches!(input.objects("Electron"), Err(StreamError::UnknownField(_))));
}

#[test]
fn selection_requires_declaration_and_valid_indices() {
    let store = delphes_store(6);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "").unwrap();
    input.read(2).unwrap();

    let muon = input.schema().group("Muon").unwrap().id;
    assert!(matches!(
        input.select_index(muon, 0),
        Err(StreamError::SelectionNotDeclared(name)) if name == "Muon"
    ));

    let jet = input.select("Jet").unwrap();
    input.select_index(jet, 9).unwrap();
    assert!(matches!(
        input.save_objects(),
        Err(StreamError::IndexOutOfRange { index: 9, len: 2, .. })
    ));

    // Reading the next entry clears pushed indices but keeps the declaration.
    input.read(3).unwrap();
    input.save_objects().unwrap();
    assert_eq!(input.buffers().len("Jet_PT").unwrap(), 0);
    input.select_index(jet, 0).unwrap();
}

#[test]
fn close_is_idempotent_and_final() {
    let store = delphes_store(2);
    let mut input = EventBuffer::reader(delphes_schema(), store.source(), "").unwrap();
    input.close().unwrap();
    input.close().unwrap();
    assert_eq!(input.size(), 0);
    assert!(matches!(input.read(0), Err(StreamError::ClosedStream)));
    assert!(matches!(input.select("Jet"), Err(StreamError::ClosedStream)));
    assert!(matches!(input.save_objects(), Err(StreamError::ClosedStream)));

    let source = store.source();
    assert!(source.good());
}
