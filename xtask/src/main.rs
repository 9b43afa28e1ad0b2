// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Makefile replacement, using `cargo xtask` pattern.

use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
/// `callchain` task runner
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run default CI checks
    Ci {
        #[arg(short, long)]
        package: Option<String>,

        /// Also run the test suite with internal consistency checks enabled
        #[arg(long)]
        debug_checks: bool,
    },
    /// Run linter
    Lint {
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run tests
    Test {
        #[arg(short, long)]
        package: Option<String>,

        /// Enable internal consistency checks (`CALLCHAIN_DEBUG_CHECKS`)
        #[arg(long)]
        debug_checks: bool,

        filter: Option<String>,
    },
}

#[test]
fn verify_cli() {
    use clap::CommandFactory as _;
    Cli::command().debug_assert();
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let sh = Shell::new()?;
    let _guard = sh.push_dir(std::env::var("CARGO_WORKSPACE_DIR")?);
    match cli.command {
        Commands::Ci {
            package,
            debug_checks,
        } => run_ci(&sh, &package.unwrap_or_default(), debug_checks),
        Commands::Lint { package } => run_lint(&sh, &package.unwrap_or_default()),
        Commands::Test {
            package,
            debug_checks,
            filter,
        } => run_test(
            &sh,
            &package.unwrap_or_default(),
            debug_checks,
            &filter.unwrap_or_default(),
        ),
    }
}

fn package_args(package: &str) -> &[&str] {
    if package.is_empty() {
        &[]
    } else {
        &["--package"]
    }
}

fn run_ci(sh: &Shell, package: &str, debug_checks: bool) -> Result<()> {
    run_lint(sh, package)?;
    run_test(sh, package, false, "")?;
    if debug_checks {
        run_test(sh, package, true, "")?;
    }

    Ok(())
}

fn run_lint(sh: &Shell, package: &str) -> Result<()> {
    let flag = package_args(package);
    let package = (!package.is_empty()).then_some(package);
    log::info!("linting {}", package.unwrap_or("workspace"));
    cmd!(sh, "cargo fmt --check {flag...} {package...}").run()?;
    cmd!(
        sh,
        "cargo check --all-targets --quiet {flag...} {package...}"
    )
    .run()?;
    cmd!(
        sh,
        "cargo clippy --all-targets --quiet {flag...} {package...} -- -D warnings"
    )
    .run()?;
    Ok(())
}

fn run_test(sh: &Shell, package: &str, debug_checks: bool, filter: &str) -> Result<()> {
    let flag = package_args(package);
    let package = (!package.is_empty()).then_some(package);
    let filter_args = if filter.is_empty() {
        &[][..]
    } else {
        &["--", filter][..]
    };
    let _env = debug_checks.then(|| sh.push_env("CALLCHAIN_DEBUG_CHECKS", "1"));
    log::info!(
        "testing {} (debug checks: {debug_checks})",
        package.unwrap_or("workspace")
    );
    cmd!(sh, "cargo test --quiet {flag...} {package...} {filter_args...}").run()?;
    Ok(())
}
