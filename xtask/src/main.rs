use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CRATES: [&str; 2] = ["fanout_core", "fanout_lambda"];
const LAMBDA_PACKAGE: &str = "fanout_lambda";
const LAMBDA_BINARY: &str = "fanout_runtime";
const DIST_DIR: &str = "infra/aws_sms_fanout/dist";

#[derive(Parser)]
#[command(name = "xtask", about = "Tests, CI checks and Lambda packaging for the SMS fan-out")]
struct Cli {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Run the unit and end-to-end tests
    Test,
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build fanout_runtime and zip it as a Lambda `bootstrap`
    ServerlessPackage {
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// fmt and clippy
    Lint,
    /// fmt, clippy and tests
    Check,
}

fn run_cargo(args: &[&str]) {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo");
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn lint() {
    run_cargo(&["fmt", "--all", "--", "--check"]);
    run_cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]);
}

fn test() {
    for package in CRATES {
        run_cargo(&["test", "-p", package]);
    }
}

fn package_lambda(target: &str, debug: bool) -> PathBuf {
    let mut args = vec![
        "build",
        "-p",
        LAMBDA_PACKAGE,
        "--bin",
        LAMBDA_BINARY,
        "--target",
        target,
    ];
    if !debug {
        args.push("--release");
    }
    run_cargo(&args);

    let profile = if debug { "debug" } else { "release" };
    let binary_path = Path::new("target")
        .join(target)
        .join(profile)
        .join(LAMBDA_BINARY);
    let binary = fs::read(&binary_path)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", binary_path.display()));

    fs::create_dir_all(DIST_DIR).expect("failed to create dist directory");
    let zip_path = Path::new(DIST_DIR).join(format!("{LAMBDA_BINARY}.zip"));
    let mut zip = ZipWriter::new(fs::File::create(&zip_path).expect("failed to create zip"));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .expect("failed to start bootstrap entry");
    zip.write_all(&binary).expect("failed to write bootstrap entry");
    zip.finish().expect("failed to finish zip");
    zip_path
}

fn main() {
    match Cli::parse().command {
        Task::Test => test(),
        Task::Ci { job } => {
            lint();
            if matches!(job, CiJob::Check) {
                test();
            }
            eprintln!("CI job passed.");
        }
        Task::ServerlessPackage { target, debug } => {
            let zip_path = package_lambda(&target, debug);
            eprintln!("packaged {}", zip_path.display());
        }
    }
}
