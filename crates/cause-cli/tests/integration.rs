//! Integration tests for the cause-train binary.
//!
//! Each test writes a tiny synthetic dataset and config into a temp dir and
//! runs the real binary against it.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_split(path: &Path, rows: u32) {
    let mut f = std::fs::File::create(path).unwrap();
    writeln!(f, "user_id,product_id,label").unwrap();
    for i in 0..rows {
        let user = i % 3;
        let product = (i / 3) % 4;
        let label = if (user + product) % 2 == 0 { 1 } else { 0 };
        writeln!(f, "{user},{product},{label}").unwrap();
    }
}

/// Lay out data/ and a config with small sizes; return the config path.
fn setup(tmp: &TempDir) -> std::path::PathBuf {
    let data = tmp.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    for (split, rows) in [("train", 36), ("valid", 12), ("test", 12)] {
        write_split(&data.join(format!("toy.{split}.adapt_2i.csv")), rows);
    }

    let config = tmp.path().join("train.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[data]
data_dir = "{data}"
data_set = "toy."
num_products = 4
num_users = 3

[model]
embedding_size = 3

[training]
logging_dir = "{logs}"
learning_rate = 0.2
num_epochs = 2
batch_size = 6
report_interval = 3
prefetch_batches = 0

[eval]
bootstrap_trials = 3
bootstrap_sample_size = 20
"#,
            data = data.display(),
            logs = tmp.path().join("logs").display(),
        ),
    )
    .unwrap();
    config
}

fn cause_train(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cause-train"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to launch cause-train")
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "cause-train failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn test_inspect_reports_splits() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp);
    let out = cause_train(&["inspect", "--config", config.to_str().unwrap()]);
    assert_success(&out);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("8 after doubling"), "stdout: {stdout}");
    assert!(stdout.contains("train: 36 records"), "stdout: {stdout}");
    assert!(stdout.contains("treatment 0.0%"), "stdout: {stdout}");
}

#[test]
fn test_train_then_evaluate_latest_checkpoint() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp);
    let logs = tmp.path().join("logs");

    let out = cause_train(&["train", "--config", config.to_str().unwrap(), "--seed", "5"]);
    assert_success(&out);

    // 2 epochs x 36/6 batches
    let checkpoint = logs.join("cp2v-12");
    assert!(checkpoint.join("model.mpk").exists(), "missing model payload");
    assert!(checkpoint.join("meta.json").exists(), "missing meta.json");
    assert!(logs.join("metrics.csv").exists());

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(logs.join("results.json")).unwrap()).unwrap();
    assert_eq!(results["training"]["steps"], 12);
    assert_eq!(results["training"]["termination"], "epochs_exhausted");
    assert_eq!(results["config"]["seed"], 5);
    assert_eq!(results["trials"]["original"].as_array().unwrap().len(), 3);
    assert_eq!(results["trials"]["shifted"].as_array().unwrap().len(), 3);

    let out = cause_train(&["evaluate", "--config", config.to_str().unwrap()]);
    assert_success(&out);
    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(logs.join("results.json")).unwrap()).unwrap();
    assert!(results["training"].is_null(), "evaluate has no training section");
    assert!(results["checkpoint"].as_str().unwrap().ends_with("cp2v-12"));
}

#[test]
fn test_bad_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp);
    let out = cause_train(&[
        "train",
        "--config",
        config.to_str().unwrap(),
        "--batch-size",
        "0",
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("batch_size"), "stderr: {stderr}");
}

#[test]
fn test_treatment_half_test_split_rejected_before_training() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp);
    std::fs::write(
        tmp.path().join("data").join("toy.test.adapt_2i.csv"),
        "user_id,product_id,label\n0,2,1\n1,5,0\n",
    )
    .unwrap();

    let out = cause_train(&["train", "--config", config.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("treatment half"), "stderr: {stderr}");

    let logs = tmp.path().join("logs");
    assert!(!logs.join("checkpoint").exists(), "training ran before the check");
    assert!(!logs.join("metrics.csv").exists());
}
