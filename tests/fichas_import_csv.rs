mod test_support;

use chrono::Local;
use rust_xlsxwriter::Workbook;
use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn duplicate_key_in_one_sheet_keeps_the_first_row() {
    let ws = temp_dir("fichas-import-dup");
    let csv = ws.path().join("acervo.csv");
    std::fs::write(&csv, "id,espec_livro\n001,sim\n001,nao\n").unwrap();
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let summary = sc.request_ok(
        "1",
        "fichas.import",
        json!({ "inPath": csv.to_string_lossy() }),
    );
    assert_eq!(summary["rows"], 2);
    assert_eq!(summary["inserted"], 1);
    assert_eq!(summary["skippedDuplicate"], 1);
    assert_eq!(summary["skippedMissingKey"], 0);

    let got = sc.request_ok("2", "fichas.get", json!({ "numeroFicha": "001" }));
    assert_eq!(got["ficha"]["groups"]["especificacao_material"]["livro"], true);
    let list = sc.request_ok("3", "fichas.list", json!({}));
    assert_eq!(list["fichas"].as_array().unwrap().len(), 1);

    // Re-importing the same sheet skips every row.
    let again = sc.request_ok(
        "4",
        "fichas.import",
        json!({ "inPath": csv.to_string_lossy() }),
    );
    assert_eq!(again["inserted"], 0);
    assert_eq!(again["skippedDuplicate"], 2);
}

#[test]
fn malformed_rows_do_not_abort_the_batch() {
    let ws = temp_dir("fichas-import-messy");
    let csv = ws.path().join("antigo.csv");
    std::fs::write(
        &csv,
        concat!(
            "numero_ficha;data_preenchimento;avaliacao;titulo;det_mancha_encadernacao;det_mancha_miolo;tipo_encadernacao\n",
            "10.0;ontem;Bom;Atlas;nao;x;Meia com cantos\n",
            ";01/02/2020;3;Sem chave;;;\n",
            "11;01/02/2020;ruim;Mapas;;;\n",
        ),
    )
    .unwrap();
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let summary = sc.request_ok(
        "1",
        "fichas.import",
        json!({ "inPath": csv.to_string_lossy(), "format": "csv" }),
    );
    assert_eq!(summary["rows"], 3);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["skippedMissingKey"], 1);

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    let a = sc.request_ok("2", "fichas.get", json!({ "numeroFicha": "10" }));
    let a = &a["ficha"];
    assert_eq!(a["dataPreenchimento"], today.as_str());
    assert_eq!(a["avaliacao"], 1);
    assert_eq!(a["groups"]["deterioracoes"]["mancha"], true);
    assert_eq!(a["groups"]["estado_conservacao"]["encadernada"], true);
    assert_eq!(a["groups"]["estado_conservacao"]["meia_com_cantos"], true);

    let b = sc.request_ok("3", "fichas.get", json!({ "numeroFicha": "11" }));
    assert_eq!(b["ficha"]["dataPreenchimento"], "2020-02-01");
    assert_eq!(b["ficha"]["avaliacao"], 3);
}

#[test]
fn workbook_import_reads_typed_cells() {
    let ws = temp_dir("fichas-import-xlsx");
    let path = ws.path().join("acervo.xlsx");
    {
        let mut wb = Workbook::new();
        let sheet = wb.add_worksheet();
        for (c, h) in ["ID", "Data_Final", "Estado_Geral", "Suporte_Jornal", "Foto"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, c as u16, *h).unwrap();
        }
        sheet.write_number(1, 0, 123.0).unwrap();
        sheet.write_string(1, 1, "2021-03-04").unwrap();
        sheet.write_number(1, 2, 1.0).unwrap();
        sheet.write_boolean(1, 3, true).unwrap();
        sheet.write_string(1, 4, "uploads/antiga.jpg").unwrap();
        wb.save(&path).unwrap();
    }
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let summary = sc.request_ok(
        "1",
        "fichas.import",
        json!({ "inPath": path.to_string_lossy() }),
    );
    assert_eq!(summary["inserted"], 1);

    let got = sc.request_ok("2", "fichas.get", json!({ "numeroFicha": "123" }));
    let f = &got["ficha"];
    assert_eq!(f["dataPreenchimento"], "2021-03-04");
    assert_eq!(f["avaliacao"], 1);
    assert_eq!(f["groups"]["tipo_suporte"]["jornal"], true);
    assert_eq!(f["images"][0]["caminho"], "uploads/antiga.jpg");
}

#[test]
fn unreadable_or_missing_sheets_fail_cleanly() {
    let ws = temp_dir("fichas-import-bad");
    let mut sc = spawn_sidecar();
    sc.open_workspace(ws.path());

    let missing = ws.path().join("nada.csv");
    assert_eq!(
        sc.request_err("1", "fichas.import", json!({ "inPath": missing.to_string_lossy() })),
        "not_found"
    );

    let odd = ws.path().join("notas.pdf");
    std::fs::write(&odd, b"%PDF").unwrap();
    assert_eq!(
        sc.request_err("2", "fichas.import", json!({ "inPath": odd.to_string_lossy() })),
        "parse_failed"
    );
    assert_eq!(
        sc.request_err("3", "fichas.import", json!({ "inPath": odd.to_string_lossy(), "format": "pdf" })),
        "bad_params"
    );
    let list = sc.request_ok("4", "fichas.list", json!({}));
    assert_eq!(list["fichas"], json!([]));
}
