use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn module_name(stem: &str) -> String {
    format!("{}.{}", stem, std::env::consts::DLL_EXTENSION)
}

fn elf_header(machine: u16) -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[..4].copy_from_slice(b"\x7FELF");
    bytes[4] = 2;
    bytes[5] = 1;
    bytes[18..20].copy_from_slice(&machine.to_le_bytes());
    bytes
}

#[test]
fn test_ping_command() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("--ping");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("pong"));
    Ok(())
}

#[test]
fn test_no_command_prints_hint() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--help"))
        .stdout(predicate::str::contains("pong").not());
    Ok(())
}

#[test]
fn test_parts_in_empty_directory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("parts").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No parts discovered."));
    Ok(())
}

#[test]
fn test_parts_reports_skipped_modules() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join(module_name("corrupt")), "not a library")?;
    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("parts").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Skipped"))
        .stdout(predicate::str::contains("not a recognizable module binary"))
        .stdout(predicate::str::contains("No parts discovered."));
    Ok(())
}

#[test]
fn test_parts_with_missing_directory_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("parts").arg(dir.path().join("absent"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("could not be scanned"));
    Ok(())
}

#[test]
fn test_modules_reports_headers() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join(module_name("riscv")), elf_header(0xF3))?;
    fs::write(dir.path().join(module_name("text")), "hello")?;
    fs::write(dir.path().join("ignored.txt"), "hello")?;

    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("modules").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ELF [riscv64]"))
        .stdout(predicate::str::contains("not a recognizable module binary"))
        .stdout(predicate::str::contains("ignored.txt").not());
    Ok(())
}

#[test]
fn test_config_controls_module_extensions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("gallery.mod"), elf_header(0x3E))?;
    let config = dir.path().join("mosaic.json");
    fs::write(&config, r#"{ "module_extensions": ["mod"] }"#)?;

    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("--config").arg(&config).arg("modules").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("gallery.mod"))
        .stdout(predicate::str::contains("x86_64"));
    Ok(())
}

#[test]
fn test_unsupported_config_format_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("mosaic.ini");
    fs::write(&config, "validate = true")?;

    let mut cmd = Command::cargo_bin("mosaic")?;
    cmd.arg("--config").arg(&config).arg("modules").arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported configuration format"));
    Ok(())
}
