use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{HttpServer, middleware::Logger};
use api::create_app;
use api::state::{AppState, Settings};
use db::{MemStore, Store};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let s = Settings::from_env().map_err(std::io::Error::other)?;

    let store: Arc<dyn Store> = match &s.database_url {
        Some(url) => {
            let pg = db::connect(url, s.db_max_connections)
                .await
                .map_err(std::io::Error::other)?;
            db::migrate(&pg).await.map_err(std::io::Error::other)?;
            info!("using postgres store");
            Arc::new(pg)
        }
        None => {
            info!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemStore::new())
        }
    };

    let state = AppState::new(store.clone(), &s).map_err(std::io::Error::other)?;

    tokio::spawn(
        state
            .scheduler
            .clone()
            .run_reminders(std::time::Duration::from_secs(s.reminder_poll_seconds.max(1))),
    );
    if let Some(backups) = state.backups.clone() {
        tokio::spawn(backups.run(store));
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond((1000 / s.rate_limit_per_second.max(1)).max(1))
        .burst_size(s.rate_limit_burst.max(1))
        .finish()
        .ok_or_else(|| std::io::Error::other("invalid rate limit settings"))?;

    info!(addr = %s.bind_addr, port = s.port, enforce_auth = s.enforce_auth, "starting server");
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();
        create_app(state.clone())
            .wrap(Governor::new(&governor_conf))
            .wrap(cors)
            .wrap(Logger::default())
    })
    .bind((s.bind_addr.as_str(), s.port))?
    .run()
    .await
}
