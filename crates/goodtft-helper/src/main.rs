use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::{
    execute,
    terminal::{Clear, ClearType},
};
use goodtft_catalog::Catalog;

use goodtft_helper::context::{SystemPaths, DEFAULT_BOOT_DIR};
use goodtft_helper::env;
use goodtft_helper::error::HelperError;
use goodtft_helper::finalize::RebootDecision;
use goodtft_helper::installer::{self, InstallType, Options, RunOutcome};
use goodtft_helper::prompt::TerminalPrompter;
use goodtft_helper::shell::SystemRunner;

const BANNER: &str = "\
This script downloads and installs
GoodTFT Support using userspace touch
controls and a DTO for display drawing.
Run time of up to 5 minutes. Reboot required!
";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InstallTypeArg {
    Fbcp,
    Uninstall,
}

impl From<InstallTypeArg> for InstallType {
    fn from(arg: InstallTypeArg) -> Self {
        match arg {
            InstallTypeArg::Fbcp => InstallType::Fbcp,
            InstallTypeArg::Uninstall => InstallType::Uninstall,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RebootArg {
    Yes,
    No,
}

#[derive(Parser)]
#[command(name = "goodtft-helper", disable_version_flag = true)]
#[command(about = "Install the GoodTFT 3.5\" display driver, touch calibration and HDMI mirroring")]
struct Cli {
    /// Print version information and exit
    #[arg(short = 'v', long)]
    version: bool,

    /// Home directory of the desktop user
    #[arg(short, long, value_name = "PATH")]
    user: Option<PathBuf>,

    /// Display by menu number or type id
    #[arg(long)]
    display: Option<String>,

    /// Rotation by menu number (1-4) or degrees (0, 90, 180, 270)
    #[arg(long)]
    rotation: Option<String>,

    /// Install HDMI mirroring without asking, or uninstall everything
    #[arg(long, value_enum)]
    install_type: Option<InstallTypeArg>,

    /// Reboot when done instead of asking
    #[arg(long, value_enum)]
    reboot: Option<RebootArg>,

    /// Boot partition mount point
    #[arg(long, default_value = DEFAULT_BOOT_DIR)]
    boot: PathBuf,

    /// Extra display profiles (TOML, [[display]] tables)
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// Debug output
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            display: self.display.clone(),
            rotation: self.rotation.clone(),
            install_type: self.install_type.map(Into::into),
            reboot: match self.reboot {
                Some(RebootArg::Yes) => RebootDecision::Yes,
                Some(RebootArg::No) => RebootDecision::No,
                None => RebootDecision::Ask,
            },
            home_override: self.user.clone(),
            boot_override: (self.boot != Path::new(DEFAULT_BOOT_DIR))
                .then(|| self.boot.clone()),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn load_catalog(extra: Option<&PathBuf>) -> Result<Catalog> {
    let catalog = Catalog::builtin();
    match extra {
        Some(path) => {
            let extra = Catalog::load(path)
                .with_context(|| format!("loading display catalog {}", path.display()))?;
            Ok(catalog.extend(extra)?)
        }
        None => Ok(catalog),
    }
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    let catalog = load_catalog(cli.catalog.as_ref())?;

    if io::stdout().is_terminal() {
        execute!(io::stdout(), Clear(ClearType::All)).ok();
    }
    if let Some(user) = &cli.user {
        println!("Homedir = {}", user.display());
    }
    println!("{BANNER}");

    if !env::is_root() {
        return Err(HelperError::NotRoot.into());
    }

    let mut runner = SystemRunner::new().quiet(!io::stdout().is_terminal());
    let mut prompter = TerminalPrompter;
    let outcome = installer::run(
        &cli.options(),
        &catalog,
        &SystemPaths::system(),
        &mut runner,
        &mut prompter,
    )?;
    Ok(outcome)
}

/// Quitting at a menu, declining to continue and any error all exit 1.
fn exit_status(result: &Result<RunOutcome>) -> u8 {
    match result {
        Ok(RunOutcome::Quit) | Err(_) => 1,
        Ok(_) => 0,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("GoodTFT 3.5 Helper v{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::from(1);
    }
    init_logging(cli.verbose);

    let result = run(&cli);
    if let Err(err) = &result {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  -> {cause}");
        }
    }
    ExitCode::from(exit_status(&result))
}
