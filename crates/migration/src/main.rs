use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins; otherwise read database_url from the service config file.
    if env::var("DATABASE_URL").is_err() {
        let path = env::var("TIKI_TAKA_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let settings = Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .build();
        match settings.map(|s| s.get_string("database_url")) {
            Ok(Ok(url)) => env::set_var("DATABASE_URL", url),
            Ok(Err(_)) => {}
            Err(e) => eprintln!("Could not read {path}: {e}"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
