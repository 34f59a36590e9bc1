use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn weft() -> Command {
    Command::cargo_bin("weft").unwrap()
}

/// The image hw.asm should assemble to: origin, LEA, PUTs, HALT, then the
/// NUL-terminated greeting, all big-endian.
fn hw_image() -> Vec<u8> {
    let mut words: Vec<u16> = vec![0x3000, 0xE002, 0xF022, 0xF025];
    words.extend("Hello, world!".chars().map(|c| c as u16));
    words.push(0);
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(name)
}

#[test]
fn runs_without_arguments() {
    weft()
        .assert()
        .success()
        .stdout(predicate::str::contains("--help"));
}

#[test]
fn runs_assembly_source() {
    weft()
        .args(["run", "tests/files/hw.asm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, world!").and(predicate::str::contains("Halted")));
}

#[test]
fn bare_path_runs_too() {
    weft()
        .arg("tests/files/hw.asm")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, world!"));
}

#[test]
fn assembles_expected_image() {
    let out = temp_path("weft_it_hw.obj");
    weft()
        .args(["asm", "tests/files/hw.asm"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Finished"));
    let bytes = fs::read(&out).unwrap();
    fs::remove_file(&out).ok();
    assert_eq!(bytes, hw_image());
}

#[test]
fn runs_binary_images() {
    let out = temp_path("weft_it_hw_run.obj");
    weft()
        .args(["asm", "tests/files/hw.asm"])
        .arg(&out)
        .assert()
        .success();
    weft()
        .args(["run"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, world!"));
    fs::remove_file(&out).ok();
}

#[test]
fn echoes_piped_input() {
    weft()
        .args(["run", "tests/files/echo.asm"])
        .write_stdin("A")
        .assert()
        .success()
        .stdout(predicate::str::contains("A"));
}

#[test]
fn keyboard_registers_serve_piped_input() {
    // Reading the data register latches the byte and the status bit
    weft()
        .args(["run", "tests/files/kbd.asm"])
        .write_stdin("Z")
        .assert()
        .success()
        .stdout(predicate::str::contains("Z!"));
}

#[test]
fn packed_output_stops_at_a_zero_byte() {
    weft()
        .args(["run", "tests/files/pack.asm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc").and(predicate::str::contains("abcd").not()));
}

#[test]
fn check_reports_success() {
    weft()
        .args(["check", "tests/files/hw.asm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assembles cleanly"));
}

#[test]
fn check_rejects_undefined_labels() {
    weft()
        .args(["check", "tests/files/bad.asm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined"));
}

#[test]
fn run_rejects_missing_files() {
    weft().args(["run", "tests/files/absent.asm"]).assert().failure();
}
