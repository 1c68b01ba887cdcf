//! Serves a directory (browsable under `/home`) next to a debug page and a
//! few inline routes.
//!
//! ```text
//! cargo run --example file_server -- ./public
//! FERRULE_CERT=cert.pem FERRULE_KEY=key.pem cargo run --example file_server
//! ```

use ferrule::{
    router::{handler, PathMatcher},
    routes::{DebugPage, IndexDir, ServeDir},
    server::tls,
    Router, Server, StatusCode,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferrule=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = std::env::args().nth(1).unwrap_or_else(|| ".".to_owned());

    let router = Router::new()
        .get("/debug", DebugPage)
        .get("/hello", handler(|_, res| {
            res.set_status(StatusCode::Ok).set_text("Well, hello.");
            Ok(true)
        }))
        .get(PathMatcher::pattern(r"(?i)/page[0-9]+")?, handler(|req, res| {
            res.set_status(StatusCode::Ok)
                .set_text(format!("You found {}", req.full_path()));
            Ok(true)
        }))
        .post("/form", handler(|req, res| {
            res.set_status(StatusCode::Ok)
                .set_text(String::from_utf8_lossy(req.body_bytes()).into_owned());
            Ok(true)
        }))
        .get("/home", IndexDir::new(root.clone()))
        .get("/", ServeDir::new(root));

    let server = Server::builder().router(router).log_requests(true).build();

    let mut handles = vec![server.listen("127.0.0.1:8080").await?];
    tracing::info!("HTTP server running at {}", handles[0].local_addr());

    if let (Ok(cert), Ok(key)) = (std::env::var("FERRULE_CERT"), std::env::var("FERRULE_KEY")) {
        let handle = server
            .listen_secure("127.0.0.1:8443", tls::load_pem(cert, key)?)
            .await?;
        tracing::info!("HTTPS server running at {}", handle.local_addr());
        handles.push(handle);
    }

    tokio::signal::ctrl_c().await?;
    for handle in handles {
        handle.close();
        handle.join().await;
    }
    Ok(())
}
