#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use ::axum::Server;
use dotenvy::dotenv;
use std::{env, net::SocketAddr, process};
use tracing::{error, info};

use crate::{axum::app, utils::logger};

mod axum;
mod http;
mod utils;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let _guard = logger::setup();

    let app = match app::create().await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start: {e:#}");
            process::exit(1);
        }
    };

    let port = match env::var("PORT").map(|p| p.parse::<u16>()) {
        Err(_) => 8000,
        Ok(Ok(port)) => port,
        Ok(Err(e)) => {
            error!("Invalid $PORT: {e}");
            process::exit(1);
        }
    };
    let address = SocketAddr::from(([0, 0, 0, 0], port));

    info!("⚡ docchat API started on http://{address}");
    Server::bind(&address)
        .serve(app.into_make_service())
        .await
        .expect("Failed to start server");
}
