use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use clipserve::clip::ClipModel;
use clipserve::config::Config;
use clipserve::fetch::HttpFetcher;
use clipserve::{logging, server, SearchService};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    log_dir: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("clipserve {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            flag @ ("--config" | "-c" | "--host" | "--port" | "-p" | "--log-dir") => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: {} requires an argument", flag);
                    std::process::exit(1);
                };
                match flag {
                    "--config" | "-c" => parsed.config_path = Some(PathBuf::from(value)),
                    "--host" => parsed.host = Some(value.clone()),
                    "--log-dir" => parsed.log_dir = Some(PathBuf::from(value)),
                    _ => match value.parse() {
                        Ok(port) => parsed.port = Some(port),
                        Err(_) => {
                            eprintln!("Error: invalid port {:?}", value);
                            std::process::exit(1);
                        }
                    },
                }
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"clipserve - CLIP-based visual search service

USAGE:
    clipserve [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --host HOST         Address to bind (overrides config)
    --port, -p PORT     Port to listen on (overrides config and PORT)
    --log-dir DIR       Write logs to daily files in DIR
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    CLIPSERVE_CONFIG    Path to config file (overrides default location)
    CLIPSERVE_LOG       Log filter (trace, debug, info, warn, error)
    PORT                Port to listen on

Config file location: $XDG_CONFIG_HOME/clipserve/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if let Err(e) = logging::init(args.log_dir.clone()) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // The model must be ready before the first request is accepted
    let model = Arc::new(ClipModel::new(&config.model));
    {
        let model = Arc::clone(&model);
        tokio::task::spawn_blocking(move || model.init())
            .await
            .context("Model initialization task failed")?
            .context("Failed to load CLIP model")?;
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch));
    let service = Arc::new(SearchService::new(model, fetcher, config.search.default_top_k));

    server::serve(&config.server, service).await
}
