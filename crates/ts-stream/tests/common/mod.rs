#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use ts_stream::{BufferSet, Schema};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn delphes_schema() -> Schema {
    let text = std::fs::read_to_string(fixture("delphes_variables.txt")).unwrap();
    Schema::parse(&text).unwrap()
}

pub fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("treestream_{}_{}_{}.tstr", std::process::id(), nanos, name));
    p
}

pub fn n_jets(entry: u64) -> usize {
    (entry % 6) as usize
}

pub fn n_muons(entry: u64) -> usize {
    (entry % 3) as usize
}

pub fn n_towers(entry: u64) -> usize {
    match entry {
        3 => 1000,
        4 => 1200,
        e => (e % 2) as usize,
    }
}

pub fn jet_pt(entry: u64) -> Vec<f32> {
    (0..n_jets(entry)).map(|j| 100.0 - 10.0 * j as f32 + entry as f32).collect()
}

/// Fill every field with values derived from `entry`.
pub fn fill(buffers: &mut BufferSet, entry: u64) {
    let e = entry as f64;
    buffers.set_scalar("Event_Number", entry as i64 * 1000 + 7).unwrap();
    buffers.set_scalar("HT", e * 1.5).unwrap();
    buffers.set_scalar("Event_Label", format!("evt{entry}")).unwrap();
    let weights: Vec<f64> = (0..entry % 3).map(|k| k as f64 * 0.25).collect();
    buffers.set_array("weights", &weights).unwrap();

    let nj = n_jets(entry);
    buffers.set_array("Jet_PT", &jet_pt(entry)).unwrap();
    let eta: Vec<f32> = (0..nj).map(|j| j as f32 * 0.5 - 1.0).collect();
    buffers.set_array("Jet_Eta", &eta).unwrap();
    let phi: Vec<f32> = (0..nj).map(|j| j as f32 * 0.1).collect();
    buffers.set_array("Jet_Phi", &phi).unwrap();
    let btag: Vec<i32> = (0..nj).map(|j| (j % 2) as i32).collect();
    buffers.set_array("Jet_BTag", &btag).unwrap();

    let nm = n_muons(entry);
    let mpt: Vec<f32> = (0..nm).map(|j| 20.0 + j as f32).collect();
    buffers.set_array("Muon_PT", &mpt).unwrap();
    let meta: Vec<f32> = (0..nm).map(|j| -(j as f32)).collect();
    buffers.set_array("Muon_Eta", &meta).unwrap();
    let charge: Vec<i32> = (0..nm).map(|j| if j % 2 == 0 { 1 } else { -1 }).collect();
    buffers.set_array("Muon_Charge", &charge).unwrap();

    let towers: Vec<f64> = (0..n_towers(entry)).map(|t| t as f64 + e).collect();
    buffers.set_array("Tower_E", &towers).unwrap();
}

/// Assert that the buffers hold what [`fill`] wrote for `entry`.
pub fn check(buffers: &BufferSet, entry: u64) {
    let e = entry as f64;
    assert_eq!(buffers.scalar::<i64>("Event_Number").unwrap(), entry as i64 * 1000 + 7);
    assert_eq!(buffers.scalar::<f64>("HT").unwrap(), e * 1.5);
    assert_eq!(buffers.scalar::<String>("Event_Label").unwrap(), format!("evt{entry}"));
    assert_eq!(buffers.len("weights").unwrap(), (entry % 3) as usize);

    assert_eq!(buffers.scalar::<i32>("Jet_size").unwrap() as usize, n_jets(entry));
    assert_eq!(buffers.array::<f32>("Jet_PT").unwrap(), jet_pt(entry).as_slice());
    assert_eq!(buffers.len("Jet_BTag").unwrap(), n_jets(entry));
    assert_eq!(buffers.scalar::<i32>("Muon_size").unwrap() as usize, n_muons(entry));
    assert_eq!(buffers.len("Muon_Charge").unwrap(), n_muons(entry));

    let towers = buffers.array::<f64>("Tower_E").unwrap();
    assert_eq!(towers.len(), n_towers(entry));
    if let Some(last) = towers.last() {
        assert_eq!(*last, (towers.len() - 1) as f64 + e);
    }
}
