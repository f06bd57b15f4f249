use actix_web::{web, App, HttpServer};
use log::info;

use chess_session::config::ServerConfig;
use chess_session::models::AppState;
use chess_session::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env();
    let bind = config.bind.clone();
    info!("Starting chess session server at http://{}", bind);

    let app_state = web::Data::new(AppState::new(config));

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(bind)?
    .run()
    .await
}
