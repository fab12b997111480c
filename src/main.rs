use clap::Parser;
use tracing_subscriber::EnvFilter;

use visioniq::cli::{self, Args, CliError, Command};
use visioniq::config::Config;
use visioniq::identify::IDENTIFY_API_KEY_ENV;

fn load_env() {
    // Load .env file, don't override existing env vars
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

/// Route `log` records through a tracing fmt subscriber on stderr.
/// `RUST_LOG` wins unless `--verbose` is given.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new().map_err(CliError::Runtime)
}

fn run(args: Args) -> Result<(), CliError> {
    if let Command::Config { action } = &args.command {
        return cli::handle_config_action(action.clone(), args.config.as_deref());
    }

    let config = Config::load_from(args.config.as_deref())?;
    match args.command {
        Command::ListDevices => cli::list_devices(&config, args.json),
        Command::Identify { file } => {
            runtime()?.block_on(cli::identify_file(&config, &file, args.json))
        }
        Command::Capture {
            device,
            save,
            timeout,
        } => runtime()?.block_on(cli::capture(&config, device, save, timeout, args.json)),
        Command::Config { .. } => Ok(()),
    }
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(args.verbose);
    log::debug!(
        "{} is {}",
        IDENTIFY_API_KEY_ENV,
        if std::env::var(IDENTIFY_API_KEY_ENV).is_ok() {
            "set"
        } else {
            "not set"
        }
    );

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
