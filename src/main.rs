use chat_gw_lite::config::AppConfig;
use chat_gw_lite::{observability, server};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(message) = run().await {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => AppConfig::load_from_file(&path)
            .map_err(|err| format!("failed to load config `{path}`: {err}"))?,
        None => AppConfig::from_env().map_err(|err| format!("invalid environment: {err}"))?,
    };

    observability::init_tracing(&config.logging())?;
    server::run_server(Arc::new(config)).await
}

fn parse_config_path(args: &[String]) -> Result<Option<String>, String> {
    match args {
        [] => Ok(None),
        [flag, path] if flag == "--config" => Ok(Some(path.clone())),
        _ => Err(format!("invalid arguments.\n{}", usage_line())),
    }
}

fn print_usage() {
    println!("{}", usage_line());
}

fn usage_line() -> &'static str {
    "Usage: chat-gw-lite [--config <path-to-config.yaml>]"
}
