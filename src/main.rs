/*!
Here we go!

Usage: `aula [ config.toml ]`
*/
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use aula::{config, inter};

static DEFAULT_CONFIG: &str = "config.toml";

async fn run() -> Result<(), String> {
    let cfg_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    log::info!("Reading configuration from {:?}.", &cfg_path);

    let (cfg, glob) = config::load_configuration(&cfg_path).await?;
    inter::init(&cfg.templates_dir)?;

    let addr = glob.addr;
    let app = inter::router(Arc::new(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| format!("Server error: {}", &e))
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("aula")
        .build();
    if let Err(e) = TermLogger::init(
        aula::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    if let Err(e) = run().await {
        log::error!("{}", &e);
        eprintln!("{}", &e);
        std::process::exit(1);
    }
}
