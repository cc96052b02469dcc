use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use registrar::{directory, Config, Database, Notifier, WebServer, Workflow};

/// Config file used when none is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REGISTRAR_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = registrar::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        registrar::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Registrar stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> registrar::Result<()> {
    config.validate()?;

    info!("Registrar - account registration service");

    let db = Database::open(&config.database.path).await?;
    info!(path = %config.database.path, "Database ready");

    let directory = directory::from_config(&config.directory)?;
    info!(
        backend = directory.backend_name(),
        url = %config.directory.url(),
        "Directory client configured"
    );

    let notifier = Arc::new(Notifier::from_config(&config.mail)?);
    let workflow = Arc::new(Workflow::new(
        db.clone(),
        directory,
        notifier,
        config.web.page_size,
    ));

    let server = WebServer::new(&config.web, workflow)?;
    info!(addr = %server.addr(), "Starting web server");
    let result = server.run().await;

    db.close().await;
    result
}
