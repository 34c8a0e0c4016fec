use std::{
    path::Path,
    process::{Command, Output},
};

use anyhow::Context;
use assert_cmd::cargo::CommandCargoExt;

pub const EXPORTER_BIN: &str = "ec2-cost-exporter";

/// Executes the exporter binary with the given arguments and waits for it to stop.
///
/// This does NOT call `cargo run`, see [`assert_cmd::Command::cargo_bin`].
pub fn run_exporter(bin_args: &[&str], workdir: &Path) -> anyhow::Result<Output> {
    let mut cmd = Command::cargo_bin(EXPORTER_BIN)?;
    cmd.args(bin_args)
        .current_dir(workdir)
        .env_remove("EC2_COST_EXPORTER_CONFIG")
        .output()
        .with_context(|| format!("could not run process {cmd:?}"))
}
