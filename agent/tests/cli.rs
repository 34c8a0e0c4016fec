//! Integration tests of the exporter binary.
mod common;

use common::run_exporter;
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn help() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let output = run_exporter(&["--help"], tmp_dir.path())?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("--instance-tags"));
    assert!(stdout.contains("--fetch-timeout"));
    Ok(())
}

#[test]
fn regen_config() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let conf = tmp_dir.path().join("config.toml");
    assert!(!conf.try_exists()?, "config file should not exist: {conf:?}");

    let conf_path_str = conf.to_str().unwrap();
    let output = run_exporter(&["--config", conf_path_str, "config", "regen"], tmp_dir.path())?;
    assert!(output.status.success(), "command should succeed");

    let config_content = std::fs::read_to_string(conf)?;
    let expected = indoc! { r#"
        region = "eu-west-1"
        instance_tags = ""
        poll_interval = "4m"
        listen_address = "0.0.0.0:9190"
    "# };
    assert_eq!(config_content, expected);
    Ok(())
}

#[test]
fn bad_config_file() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let conf = tmp_dir.path().join("bad.toml");
    std::fs::write(&conf, "instance_tag = 'Team'")?;

    let conf_path_str = conf.to_str().unwrap();
    let output = run_exporter(&["--config", conf_path_str], tmp_dir.path())?;
    assert!(!output.status.success(), "should fail because of the unknown field");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains(conf_path_str), "unexpected stderr: {stderr}");
    assert!(stderr.contains("instance_tag"), "unexpected stderr: {stderr}");
    Ok(())
}

#[test]
fn bad_cli_value() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let output = run_exporter(&["--poll-interval", "often"], tmp_dir.path())?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("--poll-interval"), "unexpected stderr: {stderr}");
    Ok(())
}

#[test]
fn zero_poll_interval() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let output = run_exporter(&["--poll-interval", "0s"], tmp_dir.path())?;
    assert!(!output.status.success(), "should fail because the interval is zero");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("poll_interval must be greater than zero"), "unexpected stderr: {stderr}");
    assert!(!stderr.contains("panicked"), "unexpected stderr: {stderr}");
    Ok(())
}

#[test]
fn listen_address_in_use() -> anyhow::Result<()> {
    let tmp_dir = tempfile::tempdir()?;
    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = taken.local_addr()?.to_string();

    let output = run_exporter(&["--listen-address", &addr], tmp_dir.path())?;
    assert!(!output.status.success(), "should fail because the address is in use");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("failed to listen on"), "unexpected stderr: {stderr}");
    Ok(())
}
