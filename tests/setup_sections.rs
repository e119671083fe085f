mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_and_validated_updates() {
    let ws = temp_dir("fichas-setup");
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let all = sc.request_ok("1", "setup.get", json!({}));
    assert_eq!(all["import"]["defaultFormat"], "auto");
    assert_eq!(all["import"]["dayFirst"], true);
    assert_eq!(all["uploads"]["maxBytes"], 10 * 1024 * 1024);
    assert_eq!(all["reports"]["maxColumnWidth"], 50);
    assert_eq!(all["reports"]["sheetName"], "Fichas");

    let updated = sc.request_ok(
        "2",
        "setup.update",
        json!({ "section": "reports", "patch": { "maxColumnWidth": 80, "defaultFormat": "CSV" } }),
    );
    assert_eq!(updated["maxColumnWidth"], 80);
    assert_eq!(updated["defaultFormat"], "csv");

    assert_eq!(
        sc.request_err(
            "3",
            "setup.update",
            json!({ "section": "reports", "patch": { "maxColumnWidth": 5 } })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err(
            "4",
            "setup.update",
            json!({ "section": "import", "patch": { "delimiter": ";" } })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.request_err("5", "setup.update", json!({ "section": "email", "patch": {} })),
        "bad_params"
    );

    let all = sc.request_ok("6", "setup.get", json!({}));
    assert_eq!(all["reports"]["maxColumnWidth"], 80);
    assert_eq!(all["reports"]["defaultFormat"], "csv");
}

#[test]
fn month_first_setting_changes_import_dates() {
    let ws = temp_dir("fichas-setup-dates");
    let csv = ws.path().join("datas.csv");
    std::fs::write(&csv, "id,data_final\n1,03/04/2021\n").unwrap();
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let _ = sc.request_ok(
        "1",
        "setup.update",
        json!({ "section": "import", "patch": { "dayFirst": false } }),
    );
    let _ = sc.request_ok(
        "2",
        "fichas.import",
        json!({ "inPath": csv.to_string_lossy() }),
    );
    let got = sc.request_ok("3", "fichas.get", json!({ "numeroFicha": "1" }));
    assert_eq!(got["ficha"]["dataPreenchimento"], "2021-03-04");
}

#[test]
fn upload_size_limit_rejects_large_photos() {
    let ws = temp_dir("fichas-setup-uploads");
    let src = temp_dir("fichas-setup-photo");
    let photo = src.path().join("grande.png");
    std::fs::write(&photo, vec![0u8; 2048]).unwrap();
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let _ = sc.request_ok(
        "1",
        "setup.update",
        json!({ "section": "uploads", "patch": { "maxBytes": 1024 } }),
    );
    let saved = sc.request_ok(
        "2",
        "fichas.save",
        json!({ "form": { "numero_ficha": "5" }, "photoPath": photo.to_string_lossy() }),
    );
    assert!(saved["image"].is_null());
}
