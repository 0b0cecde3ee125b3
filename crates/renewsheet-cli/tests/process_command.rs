//! End-to-end tests for the `renewsheet` binary
//!
//! Each test runs in its own scratch directory so the default config lookup
//! and the default log file stay isolated.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

const EXPORT_HEADER: [&str; 9] = [
    "Expiration Date",
    "Insured First Name",
    "Insured Last Name",
    "Carrier",
    "Lines Of Business",
    "Status",
    "Premium",
    "Renewal Premium",
    "Percentage Change",
];

fn renewsheet(dir: &Path, args: &[&str]) -> Output {
    renewsheet_with(dir, args, None, "")
}

fn renewsheet_with(dir: &Path, args: &[&str], password_env: Option<&str>, stdin: &str) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_renewsheet"));
    command
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    match password_env {
        Some(password) => command.env("RENEWSHEET_PASSWORD", password),
        None => command.env_remove("RENEWSHEET_PASSWORD"),
    };

    let mut child = command.spawn().expect("failed to execute renewsheet");
    let mut input = child.stdin.take().unwrap();
    input.write_all(stdin.as_bytes()).unwrap();
    drop(input);
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_workbook(path: &Path, header: &[&str], rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, name) in header.iter().enumerate() {
        sheet.write_string(0, c as u16, *name).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            sheet.write_string(r as u32 + 1, c as u16, *value).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

fn write_export(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    write_workbook(
        &path,
        &EXPORT_HEADER,
        &[&[
            "2026-07-01", "Dana", "Ruiz", "Acme", "Home", "Active", "1000", "1100", "10%",
        ]],
    );
    path
}

fn outputs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn processes_export_with_default_config() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    write_export(dir.path(), "Export_RenewalCenter.xlsx");

    let output = renewsheet(
        dir.path(),
        &["process", "Export_RenewalCenter.xlsx", "-o", "out"],
    );

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).starts_with("Files processed: 1\n"));

    let written = outputs(&dir.path().join("out"));
    assert_eq!(written.len(), 1);
    assert!(written[0].starts_with("Export_RenewalCenter_"));
    assert!(written[0].ends_with(".xlsx"));
}

#[test]
fn failing_file_is_logged_and_batch_continues() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    write_export(dir.path(), "good.xlsx");
    write_workbook(&dir.path().join("bad.xlsx"), &["ID", "DueDate"], &[&["P-1", "2026-07-01"]]);

    let output = renewsheet(
        dir.path(),
        &["process", "bad.xlsx", "good.xlsx", "-o", "out"],
    );

    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.starts_with("Files processed: 1\n"));
    assert!(text.contains("bad.xlsx: SchemaError: Missing required columns"));
    assert_eq!(outputs(&dir.path().join("out")).len(), 1);

    let log = fs::read_to_string(dir.path().join("renewsheet.log")).unwrap();
    assert!(log.contains("ERROR"));
    assert!(log.contains("SchemaError"));
    assert!(log.contains("bad.xlsx"));
}

#[test]
fn json_report_lists_every_file() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    write_export(dir.path(), "good.xlsx");

    let output = renewsheet(
        dir.path(),
        &[
            "process",
            "good.xlsx",
            "missing.xlsx",
            "-o",
            "out",
            "--format",
            "json",
            "--no-log-file",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["files"][0]["status"], "processed");
    assert_eq!(report["files"][1]["kind"], "FileNotFoundError");
    assert!(!dir.path().join("renewsheet.log").exists());
}

#[test]
fn protected_file_without_password_is_decryption_error() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.extend_from_slice(&[0u8; 512]);
    fs::write(dir.path().join("protected.xlsx"), bytes).unwrap();

    let output = renewsheet(dir.path(), &["process", "protected.xlsx", "-o", "out"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("DecryptionError"));
    assert!(outputs(&dir.path().join("out")).is_empty());
}

/// A protected file plus its plaintext, unlocked by a shell stand-in that
/// only copies when stdin carries the right password
#[cfg(unix)]
fn protected_fixture(dir: &Path) {
    fs::create_dir(dir.join("out")).unwrap();
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.extend_from_slice(&[0u8; 512]);
    fs::write(dir.join("protected.xlsx"), bytes).unwrap();
    write_workbook(&dir.join("protected.xlsx.plain"), &["ID", "DueDate"], &[&["P-1", "2026-07-01"]]);
    fs::write(
        dir.join("renewsheet.toml"),
        r#"[schema]
required = ["ID"]
columns = []
sort_by = ""

[decryption]
program = "sh"
args = ["-c", 'read pw; [ "$pw" = secret ] && cp "$0.plain" "$1"']
"#,
    )
    .unwrap();
}

#[cfg(unix)]
#[test]
fn password_from_environment_unlocks_protected_file() {
    let dir = TempDir::new().unwrap();
    protected_fixture(dir.path());

    let output = renewsheet_with(
        dir.path(),
        &["process", "protected.xlsx", "-o", "out"],
        Some("secret"),
        "",
    );

    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout(&output));
    assert_eq!(outputs(&dir.path().join("out")).len(), 1);
}

#[cfg(unix)]
#[test]
fn password_from_stdin_unlocks_protected_file() {
    let dir = TempDir::new().unwrap();
    protected_fixture(dir.path());

    let output = renewsheet_with(
        dir.path(),
        &["process", "protected.xlsx", "-o", "out", "--password-stdin"],
        None,
        "secret\n",
    );

    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout(&output));
    assert_eq!(outputs(&dir.path().join("out")).len(), 1);
}

#[cfg(unix)]
#[test]
fn wrong_password_is_decryption_error() {
    let dir = TempDir::new().unwrap();
    protected_fixture(dir.path());

    let output = renewsheet_with(
        dir.path(),
        &["process", "protected.xlsx", "-o", "out"],
        Some("guess"),
        "",
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("DecryptionError"));
    assert!(outputs(&dir.path().join("out")).is_empty());
}

#[test]
fn password_flag_is_rejected() {
    let dir = TempDir::new().unwrap();
    let output = renewsheet(dir.path(), &["process", "a.xlsx", "-o", "out", "-p", "secret"]);
    assert!(!output.status.success());
}

#[test]
fn missing_output_directory_fails_every_file() {
    let dir = TempDir::new().unwrap();
    write_export(dir.path(), "good.xlsx");

    let output = renewsheet(dir.path(), &["process", "good.xlsx", "-o", "nowhere"]);

    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.starts_with("Files processed: 0\n"));
    assert!(text.contains("WriteError"));
}

#[test]
fn local_config_file_is_picked_up() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    fs::write(
        dir.path().join("renewsheet.toml"),
        "[schema]\nrequired = [\"ID\"]\ncolumns = []\nsort_by = \"\"\n\n[output]\nfile_stem = \"Updated_Renewals\"\n",
    )
    .unwrap();
    write_workbook(&dir.path().join("plain.xlsx"), &["ID", "DueDate"], &[&["P-1", "2026-07-01"]]);

    let output = renewsheet(dir.path(), &["process", "plain.xlsx", "-o", "out"]);

    assert_eq!(output.status.code(), Some(0));
    let written = outputs(&dir.path().join("out"));
    assert!(written[0].starts_with("Updated_Renewals_"));
}

#[test]
fn invalid_config_stops_before_processing() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("out")).unwrap();
    fs::write(dir.path().join("bad.toml"), "[[states]]\nname = \"X\"\ncolor = \"teal\"\n").unwrap();
    write_export(dir.path(), "good.xlsx");

    let output = renewsheet(
        dir.path(),
        &["process", "good.xlsx", "-o", "out", "-c", "bad.toml"],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad.toml"));
    assert!(outputs(&dir.path().join("out")).is_empty());
}

#[test]
fn config_command_prints_and_writes_defaults() {
    let dir = TempDir::new().unwrap();

    let printed = renewsheet(dir.path(), &["config"]);
    assert_eq!(printed.status.code(), Some(0));
    let text = stdout(&printed);
    assert!(text.contains("[[states]]"));
    assert!(text.contains("#808080"));

    let written = renewsheet(dir.path(), &["config", "-o", "renewsheet.toml"]);
    assert_eq!(written.status.code(), Some(0));
    assert_eq!(fs::read_to_string(dir.path().join("renewsheet.toml")).unwrap(), text);

    let again = renewsheet(dir.path(), &["config", "-o", "renewsheet.toml"]);
    assert_eq!(again.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&again.stderr).contains("refusing to overwrite"));
}

#[test]
fn states_command_lists_colors() {
    let dir = TempDir::new().unwrap();
    let output = renewsheet(dir.path(), &["states"]);

    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.starts_with("States (State column):\n"));
    assert!(text.contains("Canceled"));
    assert!(text.contains("#808080"));
    assert!(text.contains("#90EE90"));
}
