//! Serves a few routes over persistent connections.
//!
//! ```shell
//! cargo run --example keep_alive_server                    # plain http on 127.0.0.1:8080
//! cargo run --example keep_alive_server -- cert.pem key.pem # https on 127.0.0.1:8443
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::{Method, Response, StatusCode};
use http_body_util::BodyExt;
use micro_keepalive::handler::{ServerRequest, make_handler};
use micro_keepalive::protocol::body::{BoxError, ResponseBody};
use micro_keepalive::server::{SessionOptions, TlsConfig, listen_and_serve, listen_and_serve_tls};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

async fn route(mut request: ServerRequest) -> Result<Response<ResponseBody>, BoxError> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, "/") => Response::builder()
            .header("keep-alive", "timeout=30, max=1000")
            .body(ResponseBody::from("Hello World!\r\n"))?,
        (&Method::POST, "/echo") => Response::new(ResponseBody::stream(request.into_body())),
        (&Method::POST, "/count") => {
            let body = request.body_mut().collect().await?.to_bytes();
            info!(size = body.len(), "counted request body");
            Response::new(ResponseBody::from(format!("{}\r\n", body.len())))
        }
        _ => Response::builder().status(StatusCode::NOT_FOUND).body(ResponseBody::empty())?,
    };
    Ok(response)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = SessionOptions::new().with_keep_alive_timeout(Duration::from_secs(30)).with_read_timeout(Duration::from_secs(10));
    let handler = Arc::new(make_handler(route));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let server = match args.as_slice() {
        [cert, key] => {
            let tls_config = match TlsConfig::from_pem_files(cert, key) {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    error!(cause = %e, "load tls config error");
                    return;
                }
            };
            listen_and_serve_tls("127.0.0.1:8443", tls_config, handler, options).await
        }
        _ => listen_and_serve("127.0.0.1:8080", handler, options).await,
    };

    let server = match server {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };
    info!(local_addr = %server.local_addr(), "serving, press ctrl-c to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(cause = %e, "failed to listen for ctrl-c");
    }
    server.close();
    server.closed().await;
}
