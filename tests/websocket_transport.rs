//! End-to-end tests against a local tokio-tungstenite server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

use wamp_websocket::{
    JsonSerializer, Serializer, Transport, TransportHandler, TransportOptions, WebSocketTransport,
};

// ============================================================================
// Fixtures
// ============================================================================

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, PartialEq, Eq)]
enum Call {
    Connect(String),
    Message(Vec<u8>, bool),
    Disconnect(bool),
}

/// Records callbacks and optionally greets the peer on connect.
struct Recorder {
    calls: mpsc::UnboundedSender<Call>,
    greeting: Option<&'static str>,
}

impl TransportHandler for Recorder {
    fn on_connect(
        &self,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn Serializer>,
    ) -> wamp_websocket::Result<()> {
        let _ = self
            .calls
            .send(Call::Connect(serializer.subprotocol().to_owned()));
        if let Some(greeting) = self.greeting {
            transport.send(greeting.as_bytes(), false)?;
        }
        Ok(())
    }

    fn on_message(&self, payload: Vec<u8>, is_binary: bool) -> wamp_websocket::Result<()> {
        let _ = self.calls.send(Call::Message(payload, is_binary));
        Ok(())
    }

    fn on_disconnect(&self, was_clean: bool) {
        let _ = self.calls.send(Call::Disconnect(was_clean));
    }
}

fn recorder(greeting: Option<&'static str>) -> (Arc<dyn TransportHandler>, mpsc::UnboundedReceiver<Call>) {
    let (calls, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { calls, greeting }), rx)
}

async fn next_call(calls: &mut mpsc::UnboundedReceiver<Call>) -> Result<Call> {
    timeout(CALL_TIMEOUT, calls.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("handler channel closed"))
}

/// Answers the WAMP JSON subprotocol if the client offered it.
fn negotiate_wamp(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|p| p.trim() == JsonSerializer::SUBPROTOCOL));

    if offered {
        response.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(JsonSerializer::SUBPROTOCOL),
        );
    }
    Ok(response)
}

/// Accepts one connection and hands the socket to `behavior`.
async fn spawn_server<F, Fut>(behavior: F) -> Result<String>
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        if let Ok(ws) = accept_hdr_async(stream, negotiate_wamp).await {
            behavior(ws).await;
        }
    });

    Ok(format!("ws://127.0.0.1:{port}/ws"))
}

async fn echo(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(message)) = ws.next().await {
        if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
            break;
        }
    }
}

/// Holds the socket open without ever reading from it.
async fn silent(ws: WebSocketStream<TcpStream>) {
    sleep(Duration::from_secs(10)).await;
    drop(ws);
}

fn quiet_options() -> TransportOptions {
    TransportOptions::new().without_auto_ping()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_echo_and_clean_close() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(echo).await?;

    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(Some("hello"));

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(
        next_call(&mut calls).await?,
        Call::Message(b"hello".to_vec(), false)
    );
    assert!(transport.is_open());

    transport.send(&[0x00, 0xff, 0x10], true)?;
    assert_eq!(
        next_call(&mut calls).await?,
        Call::Message(vec![0x00, 0xff, 0x10], true)
    );

    transport.close();
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(true));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_server_initiated_close_is_clean() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(|mut ws| async move {
        let _ = ws.send(Message::Text("bye".into())).await;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "shutting down".into(),
            }))
            .await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(
        next_call(&mut calls).await?,
        Call::Message(b"bye".to_vec(), false)
    );
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(true));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_server_close_with_error_code_is_unclean() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(|mut ws| async move {
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "internal error".into(),
            }))
            .await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_abrupt_drop_is_unclean() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(|ws| async move { drop(ws) }).await?;

    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_handshake_rejection_is_unclean() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                let mut response = ErrorResponse::new(Some("unsupported subprotocol".into()));
                *response.status_mut() = StatusCode::BAD_REQUEST;
                Err(response)
            };
            let _ = accept_hdr_async(stream, reject).await;
        }
    });

    let transport = WebSocketTransport::new(&format!("ws://127.0.0.1:{port}/ws"))?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_abort_is_unclean() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(echo).await?;

    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);
    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));

    transport.abort();
    assert!(!transport.is_open());
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));

    Ok(())
}

#[tokio::test]
async fn test_missing_pong_fails_connection() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(silent).await?;

    let options = TransportOptions::new()
        .with_auto_ping_interval(Duration::from_millis(100))
        .with_auto_ping_timeout(Duration::from_millis(200));
    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(options)
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));

    Ok(())
}

#[tokio::test]
async fn test_unanswered_close_times_out() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(silent).await?;

    let options = quiet_options().with_close_timeout(Duration::from_millis(200));
    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(options)
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);
    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));

    transport.close();
    assert!(transport.is_open());
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));
    assert!(!transport.is_open());

    Ok(())
}

#[tokio::test]
async fn test_oversized_frame_fails_connection() -> Result<()> {
    init_tracing();
    let endpoint = spawn_server(|mut ws| async move {
        let _ = ws.send(Message::Binary(vec![7u8; 4096].into())).await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let options = quiet_options().with_max_frame_payload_size(1024);
    let transport = WebSocketTransport::builder()
        .endpoint(endpoint)
        .options(options)
        .build()?;
    let (handler, mut calls) = recorder(None);

    transport.connect(handler);

    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));

    Ok(())
}

#[tokio::test]
async fn test_reconnect_after_disconnect() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    // First connection is dropped, second one echoes
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await
            && let Ok(ws) = accept_hdr_async(stream, negotiate_wamp).await
        {
            drop(ws);
        }
        if let Ok((stream, _)) = listener.accept().await
            && let Ok(ws) = accept_hdr_async(stream, negotiate_wamp).await
        {
            echo(ws).await;
        }
    });

    let transport = WebSocketTransport::builder()
        .endpoint(format!("ws://127.0.0.1:{port}/ws"))
        .options(quiet_options())
        .build()?;
    let (handler, mut calls) = recorder(Some("again"));

    transport.connect(Arc::clone(&handler));
    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(false));

    transport.connect(handler);
    assert_eq!(next_call(&mut calls).await?, Call::Connect("wamp.2.json".into()));
    assert_eq!(
        next_call(&mut calls).await?,
        Call::Message(b"again".to_vec(), false)
    );

    transport.close();
    assert_eq!(next_call(&mut calls).await?, Call::Disconnect(true));

    Ok(())
}
