use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use ts_stream::{EventBuffer, FileSink, Schema, StoreConfig};

const SCHEMA: &str = "Tree Delphes\n\n\
    int\tJet_size\tJet_size 1\n\
    float\tJet.PT\tJet_PT 4 Jet_size\n\
    float\tJet.Eta\tJet_Eta 4 Jet_size\n\
    double\tHT\tHT 1\n";

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_treestream"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("treestream_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn write_sample(path: &Path, entries: u64) {
    let schema = Schema::parse(SCHEMA).unwrap();
    let sink = FileSink::create(path, "Delphes", &StoreConfig::default()).unwrap();
    let mut out = EventBuffer::writer(schema, sink).unwrap();
    for e in 0..entries {
        let n = (e % 4) as usize;
        let pts: Vec<f32> = (0..n).map(|j| 50.0 + j as f32 + e as f32).collect();
        let etas: Vec<f32> = (0..n).map(|j| j as f32 * 0.5).collect();
        out.buffers_mut().set_array("Jet_PT", &pts).unwrap();
        out.buffers_mut().set_array("Jet_Eta", &etas).unwrap();
        out.buffers_mut().set_scalar("HT", e as f64 * 10.0).unwrap();
        out.commit().unwrap();
    }
    out.close().unwrap();
}

#[test]
fn ls_prints_the_listing_of_a_chain() {
    let dir = tmp_dir("ls_chain");
    let a = dir.join("a.tstr");
    let b = dir.join("b.tstr");
    write_sample(&a, 5);
    write_sample(&b, 3);

    let out = run(&["ls", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("Tree    Delphes\nEntries 8\n"), "stdout={stdout}");
    assert!(stdout.contains(": int *"));
    assert!(stdout.contains(": float [15] <- Jet_size"));
    assert!(stdout.contains("HT"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ls_json_lists_columns() {
    let dir = tmp_dir("ls_json");
    let a = dir.join("a.tstr");
    write_sample(&a, 4);

    let out = run(&["ls", "--json", a.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["tree"], "Delphes");
    assert_eq!(v["entries"], 4);
    let names: Vec<&str> =
        v["columns"].as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Jet_size", "Jet.PT", "Jet.Eta", "HT"]);
    assert_eq!(v["columns"][0]["is_counter"], true);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ls_rejects_missing_and_foreign_files() {
    let dir = tmp_dir("ls_bad");
    let missing = dir.join("missing.tstr");
    let out = run(&["ls", missing.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("opening"));

    let foreign = dir.join("foreign.tstr");
    std::fs::write(&foreign, b"definitely not a tree file").unwrap();
    let out = run(&["ls", foreign.to_str().unwrap()]);
    assert!(!out.status.success());

    let _ = std::fs::remove_dir_all(&dir);
}
