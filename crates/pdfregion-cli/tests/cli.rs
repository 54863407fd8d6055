use std::fs;
use std::path::Path;

use assert_cmd::Command;
use lopdf::{Document, Object, Stream, dictionary};
use predicates::prelude::*;
use tempfile::TempDir;

const ADDRESS: &str = "소재지=103,141,325,163";

/// Write a US Letter PDF with one page per content stream.
fn write_pdf(path: &Path, contents: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let kids: Vec<Object> = contents
        .iter()
        .map(|content| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn write_address_pdf(path: &Path) {
    write_pdf(
        path,
        &[
            "BT /F1 12 Tf 110 635 Td (Seoul) Tj ET",
            "BT /F1 12 Tf 110 100 Td (Footer) Tj ET",
        ],
    );
}

/// A `pdfregion` command that ignores any user-level config file.
fn pdfregion(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pdfregion").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path()).env("HOME", home.path());
    cmd
}

#[test]
fn test_extract_writes_csv_next_to_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "--region", ADDRESS])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 rows"));

    let csv = fs::read_to_string(dir.path().join("deed.csv")).unwrap();
    assert_eq!(csv, "key,value\n소재지,Seoul\n소재지,\n");
}

#[test]
fn test_extract_to_stdout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "-o", "-", "-r", ADDRESS])
        .args(["-r", "footer=100,680,300,700"])
        .assert()
        .success()
        .stdout("소재지,footer\nSeoul,\n,Footer\n");
}

#[test]
fn test_extract_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    let output = dir.path().join("rows.json");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "--format", "json"])
        .args(["-o", output.to_str().unwrap(), "--region", ADDRESS])
        .assert()
        .success();

    let rows: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(rows[0]["page_index"], 0);
    assert_eq!(rows[0]["cells"]["소재지"], "Seoul");
    assert_eq!(rows[1]["cells"]["소재지"], "");
}

#[test]
fn test_out_of_bounds_region_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "--region", "wide=0,0,900,10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid region"));

    assert!(!dir.path().join("deed.csv").exists());
}

#[test]
fn test_malformed_region_argument() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "--region", "a=10,0,5,20"])
        .assert()
        .failure();
}

#[test]
fn test_extract_requires_regions() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    write_address_pdf(&input);

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No regions given"));
}

#[test]
fn test_unreadable_document() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.pdf");
    fs::write(&input, b"not a pdf at all").unwrap();

    pdfregion(&dir)
        .args(["extract", input.to_str().unwrap(), "--region", ADDRESS])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open document"));

    assert!(!dir.path().join("broken.csv").exists());
}

#[test]
fn test_regions_from_config_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deed.pdf");
    let config = dir.path().join("regions.json");
    write_address_pdf(&input);
    fs::write(
        &config,
        r#"{"regions": [{"label": "소재지", "rect": [103.0, 141.0, 325.0, 163.0], "strategy": "text_layer"}]}"#,
    )
    .unwrap();

    pdfregion(&dir)
        .args(["--config", config.to_str().unwrap()])
        .args(["extract", input.to_str().unwrap(), "-o", "-"])
        .assert()
        .success()
        .stdout("key,value\n소재지,Seoul\n소재지,\n");
}

#[test]
fn test_batch_with_summary() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    write_address_pdf(&dir.path().join("a.pdf"));
    write_pdf(&dir.path().join("b.pdf"), &["BT /F1 12 Tf 110 635 Td (Busan) Tj ET"]);
    fs::write(dir.path().join("c.pdf"), b"broken").unwrap();

    let pattern = dir.path().join("*.pdf");
    pdfregion(&dir)
        .args(["batch", pattern.to_str().unwrap(), "--region", ADDRESS])
        .args(["--output-dir", out.to_str().unwrap(), "--summary", "--continue-on-error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 successful"));

    assert_eq!(
        fs::read_to_string(out.join("a.csv")).unwrap(),
        "key,value\n소재지,Seoul\n소재지,\n"
    );
    assert_eq!(fs::read_to_string(out.join("b.csv")).unwrap(), "key,value\n소재지,Busan\n");
    assert!(!out.join("c.csv").exists());

    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.starts_with("filename,status,rows,output,processing_time_ms,error\n"));
    assert!(summary.contains("a.pdf,success,2,"));
    assert!(summary.contains("c.pdf,failed,0,"));
}

#[test]
fn test_batch_stops_on_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.pdf"), b"broken").unwrap();

    let pattern = dir.path().join("*.pdf");
    pdfregion(&dir)
        .args(["batch", pattern.to_str().unwrap(), "--region", ADDRESS])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a.pdf"));
}

#[test]
fn test_region_from_pixels() {
    let dir = TempDir::new().unwrap();

    pdfregion(&dir)
        .args(["region", "--label", "소재지", "--pixels", "206,282,650,326", "--dpi", "144"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"label\": \"소재지\""))
        .stdout(predicate::str::contains("103.0"))
        .stdout(predicate::str::contains("325.0"))
        .stdout(predicate::str::contains("\"strategy\": \"text_layer\""));
}

#[test]
fn test_region_prints_argument_and_leaves_config_alone() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");

    pdfregion(&dir)
        .args(["--config", config.to_str().unwrap()])
        .args(["region", "-l", "scan", "-p", "0,0,612,792", "--strategy", "ocr"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"strategy\": \"image_ocr\""))
        .stderr(predicate::str::contains("--region scan=0,0,612,792@ocr"));

    assert!(!config.exists());

    pdfregion(&dir)
        .args(["region", "-l", "scan", "-p", "0,0,612,792", "--save"])
        .assert()
        .failure();
}

#[test]
fn test_config_init_and_set() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    let config_arg = config.to_str().unwrap();

    pdfregion(&dir)
        .args(["--config", config_arg, "config", "init"])
        .assert()
        .success();
    assert!(config.exists());

    pdfregion(&dir)
        .args(["--config", config_arg, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    pdfregion(&dir)
        .args(["--config", config_arg, "config", "set", "extraction.ocr_timeout_ms", "5000"])
        .assert()
        .success();

    pdfregion(&dir)
        .args(["--config", config_arg, "config", "get", "extraction.ocr_timeout_ms"])
        .assert()
        .success()
        .stdout("5000\n");

    pdfregion(&dir)
        .args(["--config", config_arg, "config", "set", "extraction.no_such_key", "1"])
        .assert()
        .failure();
}
