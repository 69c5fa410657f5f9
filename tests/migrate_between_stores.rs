mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, run_cli, spawn_sidecar, temp_dir};

fn write_legacy_export(path: &std::path::Path) {
    let export = json!({
        "pis": [
            { "id": "11111111-aaaa", "name": "Smith, J.", "created_at": "2024-01-01T00:00:00+00:00" },
            { "id": "22222222-bbbb", "name": "SMITH, J." },
            { "id": "33333333-cccc", "name": "Doe" }
        ],
        "sponsors": [
            { "id": "44444444-dddd", "name": "NSF" }
        ],
        "files": [
            { "id": "f1", "db_no": "100", "status": "Pending Signature", "pi_id": "22222222-bbbb",
              "sponsor_id": "44444444-dddd", "date_status_change": "2025-11-03 03:29:55.285Z" },
            { "id": "f2", "db_no": "101", "status": "Done", "pi_id": "33333333-cccc",
              "sponsor_id": "44444444-dddd", "notes": "closed out" },
            { "id": "f3", "db_no": "102", "pi_id": "missing", "sponsor_id": "44444444-dddd" }
        ]
    });
    std::fs::write(path, serde_json::to_string_pretty(&export).expect("json")).expect("write export");
}

#[test]
fn legacy_export_migrates_into_sqlite_over_ipc() {
    let workspace = temp_dir("proposald-migrate-ipc");
    let export = workspace.join("supabase-export.json");
    write_legacy_export(&export);
    let db_path = workspace.join("dest.sqlite3");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "store.select",
        json!({ "kind": "sqlite", "path": db_path.to_string_lossy() }),
    );
    let outcome = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "migrate.run",
        json!({ "source": { "kind": "memory", "path": export.to_string_lossy() } }),
    );
    assert_eq!(outcome["policy"], json!("fresh"));
    assert_eq!(outcome["pis"]["found"], json!(3));
    assert_eq!(outcome["pis"]["created"], json!(2));
    assert_eq!(outcome["files"]["created"], json!(2));
    assert_eq!(outcome["files"]["failed"], json!(1));
    assert_eq!(outcome["errors"][0]["code"], json!("reference_resolution"));

    let pis = request_ok(&mut stdin, &mut reader, "3", "records.list", json!({ "collection": "pis" }));
    let smith_id = pis["records"]
        .as_array()
        .and_then(|a| a.iter().find(|r| r["name"] == json!("Smith, J.")))
        .and_then(|r| r["id"].as_str())
        .expect("smith")
        .to_string();
    assert_ne!(smith_id, "11111111-aaaa");

    let files = request_ok(&mut stdin, &mut reader, "4", "records.list", json!({ "collection": "files" }));
    let f100 = files["records"]
        .as_array()
        .and_then(|a| a.iter().find(|r| r["db_no"] == json!("100")))
        .expect("file 100");
    assert_eq!(f100["pi_id"], json!(smith_id));
    assert_eq!(f100["status"], json!("Pending Signatures"));
    assert_eq!(f100["date_status_change"], json!("2025-11-03T03:29:55.285Z"));

    // Reconcile against the now-populated destination adds nothing.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "migrate.run",
        json!({
            "source": { "kind": "memory", "path": export.to_string_lossy() },
            "policy": "reconcile"
        }),
    );
    assert_eq!(again["pis"]["created"], json!(0));
    assert_eq!(again["files"]["created"], json!(0));
    assert_eq!(again["files"]["updated"], json!(2));

    let snapshot_path = workspace.join("out/snapshot.json");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "snapshot.export",
        json!({ "outPath": snapshot_path.to_string_lossy() }),
    );
    assert_eq!(exported["counts"], json!({ "pis": 2, "sponsors": 1, "files": 2 }));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).expect("snapshot")).expect("json");
    assert_eq!(written["files"].as_array().map(|a| a.len()), Some(2));
}

#[test]
fn cli_migrate_honours_status_filter() {
    let workspace = temp_dir("proposald-migrate-cli");
    let export = workspace.join("export.json");
    write_legacy_export(&export);
    let dest = workspace.join("dest.json");

    let out = run_cli(&[
        "migrate",
        "--source",
        &format!("memory:{}", export.to_string_lossy()),
        "--store",
        &format!("memory:{}", dest.to_string_lossy()),
        "--status",
        "Done",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let outcome: serde_json::Value = serde_json::from_slice(&out.stdout).expect("outcome json");
    assert_eq!(outcome["files"]["created"], json!(1));
    assert_eq!(outcome["files"]["filtered"], json!(2));

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&dest).expect("dest snapshot")).expect("json");
    assert_eq!(persisted["files"][0]["db_no"], json!("101"));
    assert_eq!(persisted["files"][0]["notes"], json!("closed out"));

    let bad = run_cli(&[
        "migrate",
        "--source",
        &format!("memory:{}", export.to_string_lossy()),
        "--status",
        "Archived",
    ]);
    assert!(!bad.status.success());
}

#[test]
fn missing_source_snapshot_fails_instead_of_migrating_nothing() {
    let workspace = temp_dir("proposald-migrate-missing");
    let missing = workspace.join("typo-export.json");
    let dest = workspace.join("dest.json");

    let out = run_cli(&[
        "migrate",
        "--source",
        &format!("memory:{}", missing.to_string_lossy()),
        "--store",
        &format!("memory:{}", dest.to_string_lossy()),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("typo-export.json"));
    assert!(!dest.exists());

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(&mut stdin, &mut reader, "1", "store.select", json!({ "kind": "memory" }));
    assert_eq!(
        request_err_code(
            &mut stdin,
            &mut reader,
            "2",
            "migrate.run",
            json!({ "source": { "kind": "memory", "path": missing.to_string_lossy() } }),
        ),
        "snapshot_failed"
    );
}
