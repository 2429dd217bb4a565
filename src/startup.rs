use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::{IpAddr, TcpListener};

use crate::auth::{CookieTransport, TokenManager};
use crate::configuration::CookieSettings;
use crate::middleware::AuthorizationMiddleware;
use crate::routes::{current_session, health_check};

pub fn run(
    listener: TcpListener,
    manager: TokenManager,
    cookie: CookieSettings,
    subject_header: String,
    trusted_peers: Vec<IpAddr>,
) -> Result<Server, std::io::Error> {
    let transport = CookieTransport::new(cookie, manager.access_ttl());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .route("/health_check", web::get().to(health_check))
            // Routes below need an authorized subject
            .service(
                web::scope("/api")
                    .wrap(AuthorizationMiddleware::new(
                        manager.clone(),
                        transport.clone(),
                        &subject_header,
                        &trusted_peers,
                    ))
                    .route("/session", web::get().to(current_session)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
