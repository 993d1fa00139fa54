//! Socket-level tests: binding, a real HTTP/1.1 exchange and graceful shutdown.

use std::time::Duration;

use restwell::{Config, Error, RequestContext, Server, health};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

#[tokio::test]
async fn zero_port_is_rejected_before_binding() {
    let err = Server::new(Config::new(0))
        .serve_with_shutdown(async {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPort));
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = Server::new(Config::new(port))
        .serve_with_shutdown(std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Bind { port: p, .. } if p == port));
}

#[tokio::test]
async fn serves_http_and_drains_on_shutdown() {
    async fn hello(ctx: RequestContext) {
        ctx.send_text(format!("hello {}", ctx.param("name")));
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn(
        Server::new(Config::new(addr.port()))
            .get("/ping", health::ping)
            .get("/hello/{name}", hello)
            .serve_on(listener, async {
                let _ = stopped.await;
            }),
    );

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello/world HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
    assert!(raw.contains(r#""Message":"hello world""#), "{raw}");

    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert!(result.is_ok());
}
