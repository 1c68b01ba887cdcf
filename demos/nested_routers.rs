//! Routers mounted inside routers, with errors caught at two levels.
//!
//! ```text
//! curl localhost:8080/api/v1/users/7
//! curl localhost:8080/api/v1/users/x      # 400 from the api error handler
//! curl localhost:8080/api/v1/boom         # 500 page with the error chain
//! ```

use ferrule::{
    limits::ServerLimits,
    router::{error_handler, handler, PathMatcher},
    Router, Server, StatusCode,
};
use std::num::ParseIntError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Sees paths with `/api/v1` removed
    let users = Router::new()
        .get(PathMatcher::pattern(r"/[^/]+")?, handler(|req, res| {
            let id: u32 = req.path()[1..].parse()?;
            res.set_status(StatusCode::Ok).set_text(format!("user #{id}"));
            Ok(true)
        }))
        .catch(error_handler(|_, res, err| {
            if !err.is::<ParseIntError>() {
                return false;
            }
            res.send(StatusCode::BadRequest).set_text("user ids are numbers");
            true
        }));

    let v1 = Router::new()
        .mount("/users", users)
        .get("/boom", handler(|_, _| Err("something broke".into())));

    let router = Router::new()
        .mount("/api", Router::new().mount("/v1", v1))
        .get(["/", "/index.html"], handler(|_, res| {
            res.set_status(StatusCode::Ok)
                .set_html("<a href=\"/api/v1/users/1\">user 1</a>");
            Ok(true)
        }));

    let server = Server::builder()
        .router(router)
        .server_limits(ServerLimits {
            expose_errors: true,
            ..ServerLimits::default()
        })
        .log_requests(true)
        .build();

    server.listen("127.0.0.1:8080").await?.join().await;
    Ok(())
}
