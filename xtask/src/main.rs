use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_PACKAGE: &str = "cfn_invalidate_lambda";
const LAMBDA_BINARY: &str = "cloudfront_invalidate";
const LAMBDA_TARGET: &str = "x86_64-unknown-linux-gnu";
const ARTIFACT_DIR: &str = "infra/cloudfront_invalidate/dist";
const ARTIFACT_NAME: &str = "cloudfront-invalidate.zip";

#[derive(Parser)]
#[command(name = "xtask", about = "Build tasks for the CloudFront invalidation resource")]
struct Cli {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// fmt --check, clippy with warnings denied, then every crate's tests
    Ci,
    /// Release-build the handler and zip it as the Lambda `bootstrap`
    Bundle {
        #[arg(long, default_value = LAMBDA_TARGET)]
        target: String,
        #[arg(long, default_value = ARTIFACT_DIR)]
        out_dir: PathBuf,
    },
}

fn cargo(args: &[&str]) {
    eprintln!("$ cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => exit(status.code().unwrap_or(1)),
        Err(error) => {
            eprintln!("could not start cargo: {error}");
            exit(1);
        }
    }
}

fn ci() {
    cargo(&["fmt", "--all", "--", "--check"]);
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]);
    cargo(&["test", "-p", "cfn_invalidate_core"]);
    cargo(&["test", "-p", LAMBDA_PACKAGE]);
}

fn bundle(target: &str, out_dir: &Path) -> io::Result<PathBuf> {
    cargo(&[
        "build",
        "--release",
        "-p",
        LAMBDA_PACKAGE,
        "--bin",
        LAMBDA_BINARY,
        "--target",
        target,
    ]);

    let binary = Path::new("target")
        .join(target)
        .join("release")
        .join(LAMBDA_BINARY);
    fs::create_dir_all(out_dir)?;
    let artifact = out_dir.join(ARTIFACT_NAME);
    write_bootstrap_zip(&fs::read(&binary)?, &artifact)?;
    Ok(artifact)
}

/// The provided.al2 runtime executes the archive's `bootstrap` entry.
fn write_bootstrap_zip(binary: &[u8], artifact: &Path) -> io::Result<()> {
    let mut archive = ZipWriter::new(File::create(artifact)?);
    archive.start_file(
        "bootstrap",
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o755),
    )?;
    archive.write_all(binary)?;
    archive.finish()?;
    Ok(())
}

fn main() {
    match Cli::parse().command {
        Task::Ci => ci(),
        Task::Bundle { target, out_dir } => match bundle(&target, &out_dir) {
            Ok(artifact) => eprintln!("wrote {}", artifact.display()),
            Err(error) => {
                eprintln!("bundle failed: {error}");
                exit(1);
            }
        },
    }
}
