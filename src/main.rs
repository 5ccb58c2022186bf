use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use upkg::commands::{self, PackageRequest};
use upkg::config::ConfigOptions;
use upkg::error::kind_of;

/// upkg - package manager for npm-style registries
///
/// Installs packages (and their dependencies) from a registry into a local
/// install root.
///
/// If UPKG_USERNAME and UPKG_PASSWORD are set, they are sent to the registry
/// as HTTP Basic credentials.
///
/// Examples:
///   upkg install com.example.core          # latest version
///   upkg install com.example.core@^1.2.0   # best match for a range
///   upkg resolve "~1.2" 1.2.0 1.2.7 1.3.0  # offline range check
#[derive(Parser, Debug)]
#[command(author, version = env!("UPKG_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via UPKG_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "UPKG_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Registry URL (defaults to http://localhost:4873)
    #[arg(long = "registry", env = "UPKG_REGISTRY", value_name = "URL", global = true)]
    pub registry_url: Option<String>,

    /// Maximum number of concurrent downloads and installs
    #[arg(long, short = 'j', env = "UPKG_JOBS", value_name = "N", global = true)]
    pub jobs: Option<usize>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Fail on version strings that are not valid SemVer instead of
    /// comparing them as text
    #[arg(long, global = true)]
    pub strict_versions: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List packages available on the registry
    Available,

    /// Show versions and dependencies of a package
    Info(NameArgs),

    /// List installed packages
    List,

    /// Install a package and its dependencies
    Install(InstallArgs),

    /// Remove an installed package
    Uninstall(NameArgs),

    /// Upgrade installed packages to their latest versions
    Upgrade,

    /// Print the best version satisfying a range (offline)
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug)]
pub struct NameArgs {
    /// Package name
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package to install, optionally with a version range
    #[arg(value_name = "NAME[@RANGE]")]
    pub package: PackageRequest,

    /// Install only the named package, not its dependencies
    #[arg(long)]
    pub no_deps: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Version range, e.g. "^1.2.0"
    #[arg(value_name = "RANGE")]
    pub range: String,

    /// Candidate versions
    #[arg(value_name = "VERSION", required = true)]
    pub versions: Vec<String>,
}

impl Cli {
    fn options(&self) -> ConfigOptions {
        ConfigOptions {
            install_root: self.install_root.clone(),
            registry_url: self.registry_url.clone(),
            jobs: self.jobs,
            timeout: self.timeout.map(Duration::from_secs),
            strict_versions: self.strict_versions,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error ({}): {:#}", kind_of(&e), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let runtime = upkg::runtime::RealRuntime;
    let options = cli.options();

    match cli.command {
        Commands::Available => commands::available(runtime, options).await,
        Commands::Info(args) => commands::info(runtime, &args.name, options).await,
        Commands::List => commands::list(runtime, options),
        Commands::Install(args) => {
            commands::install(runtime, args.package, args.no_deps, options).await
        }
        Commands::Uninstall(args) => commands::uninstall(runtime, &args.name, options).await,
        Commands::Upgrade => commands::upgrade(runtime, options).await,
        Commands::Resolve(args) => commands::resolve(&args.range, &args.versions),
    }
}
