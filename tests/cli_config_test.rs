use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = Command::new(env!("CARGO_BIN_EXE_tabview"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join(".tabview/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[server]"));
    assert!(content.contains("[watch]"));

    // A second init without --force refuses to overwrite
    let output = Command::new(env!("CARGO_BIN_EXE_tabview"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(!output.status.success());

    let output = Command::new(env!("CARGO_BIN_EXE_tabview"))
        .args(["init", "--force"])
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".tabview");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2
[server]
bind = "127.0.0.1:4545"
"#;
    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tabview"))
        .arg("config")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("127.0.0.1:4545"));
    assert!(stdout.contains("debounce_ms = 100"));
}

#[test]
fn test_explicit_config_path() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[tabs]\nundo_capacity = 3\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tabview"))
        .arg("config")
        .arg("--config")
        .arg(&custom)
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("undo_capacity = 3"));
}
