use std::env;

use dotenvy::dotenv;
use game_control_server::{config::ServerConfig, server::run_server};
use log::{error, info};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        std::process::exit(1);
    }

    info!("🚀️ Starting the game control server on {}:{}", config.host, config.ws_port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    if env::var("GIG_SKIP_PREFLIGHT").ok() == Some("Yes".to_string()) {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if config.object_store.bucket.is_empty() && config.local_bucket_dir.is_none() {
        error!("🚦️ Neither GIG_BUCKET nor GIG_LOCAL_BUCKET_DIR is set. The polling engine has nothing to scan.");
        result = false;
    }
    if let Err(e) = std::fs::create_dir_all(&config.storage_dir) {
        error!(
            "🚦️ The invoice storage directory {} cannot be created: {e}. Processed invoices have nowhere to go.",
            config.storage_dir.display()
        );
        result = false;
    }
    for (name, url) in
        [("GIG_GAME_OVER_URL", &config.sinks.game_over_url), ("GIG_PROCESS_ORDER_URL", &config.sinks.process_order_url)]
    {
        if reqwest::Url::parse(url).is_err() {
            error!("🚦️ {name} ('{url}') is not a valid URL.");
            result = false;
        }
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!(
            "🚦️ If you really know what you're doing and want to skip the preflight check, set `GIG_SKIP_PREFLIGHT` \
             to `Yes` in your environment variables"
        );
    }
    result
}
