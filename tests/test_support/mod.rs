#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FILES_HEADER: &str =
    "db_no,status,pi_name,sponsor_name,cayuse,date_received,date_status_change,notes,to_set_up,external_link";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Writes the three import batches into `dir` and returns their paths as
/// `(pis, sponsors, files)`.
pub fn write_batches(dir: &Path, pis: &str, sponsors: &str, file_rows: &[&str]) -> (PathBuf, PathBuf, PathBuf) {
    let pis_path = dir.join("pis.csv");
    let sponsors_path = dir.join("sponsors.csv");
    let files_path = dir.join("files.csv");
    std::fs::write(&pis_path, pis).expect("write pis");
    std::fs::write(&sponsors_path, sponsors).expect("write sponsors");
    let mut files = String::from(FILES_HEADER);
    files.push('\n');
    for row in file_rows {
        files.push_str(row);
        files.push('\n');
    }
    std::fs::write(&files_path, files).expect("write files");
    (pis_path, sponsors_path, files_path)
}

fn base_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_proposald"));
    // Isolate from any developer .env or shell configuration.
    cmd.env_remove("PROPOSALD_STORE")
        .env_remove("POCKETBASE_ADMIN_EMAIL")
        .env_remove("POCKETBASE_ADMIN_PASSWORD")
        .env_remove("RUST_LOG")
        .current_dir(std::env::temp_dir());
    cmd
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut child = base_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn proposald");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn run_cli(args: &[&str]) -> Output {
    base_command()
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("run proposald")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Error code of a failed response; panics if the call succeeded.
pub fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}
