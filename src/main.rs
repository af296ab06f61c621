use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

use placement_attendance::clock::SystemClock;
use placement_attendance::config::Config;
use placement_attendance::db::init_db;
use placement_attendance::docs::ApiDoc;
use placement_attendance::routes;
use placement_attendance::service::AttendanceEngine;
use placement_attendance::service::reconciliation::ReconciliationRunner;
use placement_attendance::store::{MySqlHolidays, MySqlStore};
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Placement attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;
    let clock = SystemClock::new(config.civil_offset()?);

    let engine = Arc::new(AttendanceEngine::new(
        Arc::new(MySqlStore::new(pool.clone())),
        Arc::new(MySqlHolidays::new(pool)),
        Arc::new(clock),
        config.policy(),
    ));
    let runner = Arc::new(ReconciliationRunner::new(Arc::clone(&engine)));

    actix_web::rt::spawn(Arc::clone(&runner).run_daily());

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::from(Arc::clone(&engine)))
            .app_data(Data::from(Arc::clone(&runner)))
            .app_data(Data::new(config.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
