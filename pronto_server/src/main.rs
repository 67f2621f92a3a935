use dotenvy::dotenv;
use log::info;
use pronto_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting Pronto server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(()) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
