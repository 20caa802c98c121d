//! HTTP server setup

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};

use crate::{api::route::routes, model::AppState};

/// Creates and binds the HTTP server.
///
/// OS signals are left to the caller, which stops the server through its
/// handle.
pub fn main_server(
    app_state: Arc<AppState>,
    context_path: String,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::from(app_state.clone()))
            .service(routes(&context_path))
    })
    .disable_signals()
    .bind((address, port))?
    .run())
}
