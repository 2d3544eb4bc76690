//! End-to-end tests over loopback sockets
//!
//! Two applications talk to each other through real UDP and TCP transports.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use sipline_dialog_core::prelude::*;
use sipline_sip_transport::{TcpTransport, UdpTransport};

use common::{init_tracing, resolve};

async fn udp_app(app: Application) -> (Application, Arc<dyn Transport>, SocketAddr) {
    let (transport, events) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None)
        .await
        .unwrap();
    let addr = transport.local_addr().unwrap();
    let transport: Arc<dyn Transport> = Arc::new(transport);

    tokio::spawn({
        let app = app.clone();
        let transport = transport.clone();
        async move { app.run(transport, events).await }
    });
    (app, transport, addr)
}

/// Server whose dialplan answers SUBSCRIBE for `presence` with a NOTIFY
fn presence_server() -> Application {
    let router = Router::new();
    router.add_user(
        "presence",
        Callback::from_async(|dialog: Dialog, request: Request| async move {
            let mut headers = Headers::new();
            headers.insert("Event", request.headers.get("Event").unwrap_or("presence"));
            headers.insert("Subscription-State", "active;expires=600");
            let handle = dialog.notify(Some(headers), "open").await?;
            handle.await?;
            Ok(())
        }),
    );
    Application::new(DialogConfig::default()).with_dialplan(router)
}

#[tokio::test]
async fn test_routed_subscribe_over_udp() {
    init_tracing();
    let (_server, _server_transport, server_addr) = udp_app(presence_server()).await;
    let (client, client_transport, _) = udp_app(Application::new(DialogConfig::default())).await;

    let connection = client.connect(client_transport, server_addr).unwrap();
    let dialog = connection
        .create_dialog(
            "sip:watcher@127.0.0.1",
            &format!("sip:presence@{}", server_addr),
            DialogOptions::default(),
        )
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    dialog.register_callback(
        "NOTIFY",
        Callback::from_fn(move |_, request| {
            let _ = tx.send(request);
            Ok(())
        }),
    );

    let mut headers = Headers::new();
    headers.insert("Event", "presence");
    let response = resolve(dialog.subscribe(Some(headers), 600).await.unwrap()).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert!(response.to.tag().is_some());

    let notify = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notify.payload, "open");
    assert_eq!(notify.call_id(), Some(dialog.call_id()));
    assert_eq!(notify.headers.get("Subscription-State"), Some("active;expires=600"));
    // The server continues the subscriber's CSeq space
    assert_eq!(notify.cseq, 2);
    assert_eq!(notify.from.tag(), response.to.tag());
}

#[tokio::test]
async fn test_unrouted_request_is_rejected_over_udp() {
    let (server, _server_transport, server_addr) = udp_app(presence_server()).await;
    let (client, client_transport, _) = udp_app(Application::new(DialogConfig::default())).await;

    let dialog = client
        .connect(client_transport, server_addr)
        .unwrap()
        .create_dialog(
            "sip:watcher@127.0.0.1",
            &format!("sip:nobody@{}", server_addr),
            DialogOptions::default(),
        )
        .unwrap();

    let handle = dialog.send(Method::Options.into()).await.unwrap().unwrap();
    let response = resolve(handle).await.unwrap();
    assert_eq!(response.status_code, 501);
    assert!(response.to.tag().is_some());

    // Nothing on the server side outlives the rejected request
    let watcher = client.connection(server_addr).unwrap().local_addr();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.connection(watcher).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("idle server connection was never dropped");
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_tcp_connection_loss_fails_pending_transactions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let (client_transport, client_events) = TcpTransport::connect(server_addr, None).await.unwrap();
    // The server side never answers
    let (server_transport, _server_events) = TcpTransport::accept(&listener, None).await.unwrap();

    let client = Application::new(DialogConfig::default());
    let client_transport: Arc<dyn Transport> = Arc::new(client_transport);
    tokio::spawn({
        let client = client.clone();
        let transport = client_transport.clone();
        async move { client.run(transport, client_events).await }
    });

    let connection = client.connect(client_transport, server_addr).unwrap();
    let dialog = connection
        .create_dialog("sip:alice@127.0.0.1", "sip:bob@127.0.0.1", DialogOptions::default())
        .unwrap();
    let handle = dialog.send(Method::Options.into()).await.unwrap().unwrap();

    server_transport.close().await.unwrap();

    assert_eq!(resolve(handle).await.unwrap_err(), DialogError::ConnectionLost);
    assert!(dialog.is_closed());
    assert!(connection.is_closed());
    assert!(client.connection(server_addr).is_none());
}

#[tokio::test]
async fn test_tcp_unframeable_peer_data_fails_pending_transactions() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let (client_transport, client_events) = TcpTransport::connect(server_addr, None).await.unwrap();
    let (mut peer, _) = listener.accept().await.unwrap();

    let client = Application::new(DialogConfig::default());
    let client_transport: Arc<dyn Transport> = Arc::new(client_transport);
    tokio::spawn({
        let client = client.clone();
        let transport = client_transport.clone();
        async move { client.run(transport, client_events).await }
    });

    let connection = client.connect(client_transport, server_addr).unwrap();
    let dialog = connection
        .create_dialog("sip:alice@127.0.0.1", "sip:bob@127.0.0.1", DialogOptions::default())
        .unwrap();
    let handle = dialog.send(Method::Options.into()).await.unwrap().unwrap();

    // A Content-Length no buffer could ever satisfy
    let garbage = format!(
        "SIP/2.0 200 OK\r\nCall-ID: {}\r\nContent-Length: {}\r\n\r\n",
        dialog.call_id(),
        u64::MAX
    );
    peer.write_all(garbage.as_bytes()).await.unwrap();

    assert_eq!(resolve(handle).await.unwrap_err(), DialogError::ConnectionLost);
    assert!(dialog.is_closed());
    assert!(connection.is_closed());
    assert!(client.connection(server_addr).is_none());
}
