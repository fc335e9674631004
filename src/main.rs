mod cli;

use segmentd::{
    config,
    server::{self, auth},
    transcoding::ProcessEncoderControl,
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting segmentd server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config, Arc::new(ProcessEncoderControl)).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "segmentd=trace,tower_http=debug".to_string()
        } else {
            "segmentd=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("segmentd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::GenerateApiKey => {
            println!("{}", auth::generate_api_key());
            Ok(())
        }
    }
}

fn validate_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    config::validate_config(&config)?;

    println!("Configuration is valid");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!(
        "  Auth: {}",
        if config.server.auth.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Output directory: {}", config.transcoding.output_dir.display());
    println!(
        "  Idle timeouts: hls {}s, progressive {}s",
        config.transcoding.hls_idle_timeout_secs, config.transcoding.progressive_idle_timeout_secs
    );

    Ok(())
}
