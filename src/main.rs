//! debfab CLI
//!
//! Entry point for the `debfab` image build driver.

use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::Parser;
use serde_json::{json, Value};

use debfab::config::{self, LayerStore};
use debfab::version::scm::GitProbe;
use debfab::version::{self, BranchMap};
use debfab::{artifact, BuildError};

#[derive(Parser)]
#[command(name = "debfab")]
#[command(about = "Build a Debian-based OS image from layered build profiles")]
struct Cli {
    /// Flavor to build (image variant)
    flavor: Option<String>,

    /// Target CPU architecture
    #[arg(long)]
    architecture: Option<String>,

    /// Build type: release or development
    #[arg(long)]
    build_type: Option<String>,

    /// Image version (release builds only)
    #[arg(long)]
    version: Option<String>,

    /// Builder identity recorded in the image metadata
    #[arg(long)]
    build_by: Option<String>,

    /// Free-form comment recorded in the image metadata
    #[arg(long)]
    build_comment: Option<String>,

    /// Debian package mirror for bootstrap and chroot stages
    #[arg(long)]
    debian_mirror: Option<String>,

    /// Debian security mirror
    #[arg(long)]
    debian_security_mirror: Option<String>,

    /// Debian mirror used by the pbuilder bootstrap
    #[arg(long)]
    pbuilder_debian_mirror: Option<String>,

    /// Debian distribution codename
    #[arg(long)]
    debian_distribution: Option<String>,

    /// Release train the image belongs to
    #[arg(long)]
    release_train: Option<String>,

    /// Additional APT source entry (repeatable)
    #[arg(long)]
    custom_apt_entry: Vec<String>,

    /// Path to an additional APT key file (repeatable)
    #[arg(long)]
    custom_apt_key: Vec<String>,

    /// Additional package (repeatable)
    #[arg(long)]
    custom_package: Vec<String>,

    /// Directory holding the build profiles
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the build runs in
    #[arg(long, default_value = "build")]
    build_dir: PathBuf,

    /// Print the resolved configuration before building
    #[arg(long)]
    dump_config: bool,

    /// Resolve and write artifacts but skip the image build
    #[arg(long)]
    dry_build: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), BuildError> {
    let mut store = LayerStore::new(&cli.data_dir);
    let overrides = cli_overrides(cli);

    let resolved = config::resolve(&mut store, cli.flavor.as_deref(), &overrides)?;

    if cli.dump_config {
        println!("{}", resolved.dump()?);
    }

    let branch_map = BranchMap::load(&cli.data_dir.join("versions.toml"));
    let probe = GitProbe::new(".");
    let record = version::synthesize(&resolved, chrono::Utc::now(), &probe, &branch_map)?;

    println!("Building version {}", record.version);

    let plan = artifact::compile(&resolved, &record)?;

    if cli.dry_build {
        println!("Configure command:\n{}", plan.configure_command);
        println!("Dry build requested; stopping before artifact writes.");
        return Ok(());
    }

    // Everything from here on mutates the build directory
    check_privileges()?;

    std::fs::create_dir_all(&cli.build_dir)?;
    artifact::write_plan(&plan, &cli.build_dir)?;

    run_build_tool(&plan.configure_command, &cli.build_dir)?;
    run_build_tool("lb build", &cli.build_dir)?;

    println!("Image build finished: version {}", record.version);
    Ok(())
}

/// Collect only the options the user explicitly supplied. Sequence
/// options with append semantics are always initialized to sequences,
/// so their concatenation with lower layers is an identity when empty.
fn cli_overrides(cli: &Cli) -> Value {
    let mut overrides = serde_json::Map::new();

    for (key, value) in [
        ("architecture", &cli.architecture),
        ("build_type", &cli.build_type),
        ("version", &cli.version),
        ("build_by", &cli.build_by),
        ("build_comment", &cli.build_comment),
        ("debian_mirror", &cli.debian_mirror),
        ("debian_security_mirror", &cli.debian_security_mirror),
        ("pbuilder_debian_mirror", &cli.pbuilder_debian_mirror),
        ("debian_distribution", &cli.debian_distribution),
        ("release_train", &cli.release_train),
    ] {
        if let Some(value) = value {
            overrides.insert(key.to_string(), json!(value));
        }
    }

    for (key, values) in [
        ("custom_apt_entry", &cli.custom_apt_entry),
        ("custom_apt_key", &cli.custom_apt_key),
        ("custom_package", &cli.custom_package),
    ] {
        if !values.is_empty() {
            overrides.insert(key.to_string(), json!(values));
        }
    }

    Value::Object(overrides)
}

#[cfg(unix)]
fn check_privileges() -> Result<(), BuildError> {
    if nix::unistd::Uid::effective().is_root() {
        Ok(())
    } else {
        Err(BuildError::NotPrivileged)
    }
}

#[cfg(not(unix))]
fn check_privileges() -> Result<(), BuildError> {
    Ok(())
}

/// Run one external build-tool command in the build directory.
///
/// The build is a blocking, non-cancelable foreign call; a non-zero
/// exit is propagated as-is.
fn run_build_tool(command: &str, build_dir: &Path) -> Result<(), BuildError> {
    println!("Running: {}", command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(build_dir)
        .status()?;

    if !status.success() {
        return Err(BuildError::ExternalTool {
            status: status.code().unwrap_or(1),
        });
    }
    Ok(())
}
