//! Transaction correlation tests
//!
//! Requests go out through a mock transport and responses are fed back the
//! way the connection would route them.

mod common;

use sipline_dialog_core::prelude::*;
use sipline_dialog_core::DialogError;
use sipline_sip_core::Contact;

use common::*;

#[tokio::test]
async fn test_final_response_resolves_once() {
    init_tracing();
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.send(Method::Options.into()).await.unwrap().unwrap();
    let options = transport.last_request();
    assert_eq!(handle.key(), &TransactionKey::new(Method::Options, options.cseq));

    let ok = response_to(&options, 200, "OK");
    dialog.receive_message(ok.clone().into()).await.unwrap();
    let response = resolve(handle).await.unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(dialog.pending_transactions(), 0);

    // Retransmitted final response finds nothing to complete
    assert_eq!(
        dialog.receive_message(ok.into()).await.unwrap_err(),
        DialogError::UnmatchedResponse {
            method: Method::Options,
            cseq: options.cseq
        }
    );
}

#[tokio::test]
async fn test_responses_match_by_method_and_cseq() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let first = dialog.send(Method::Options.into()).await.unwrap().unwrap();
    let second = dialog.send(Method::Info.into()).await.unwrap().unwrap();
    let requests = transport.requests();

    // Answer out of order
    dialog
        .receive_message(response_to(&requests[1], 202, "Accepted").into())
        .await
        .unwrap();
    dialog
        .receive_message(response_to(&requests[0], 404, "Not Found").into())
        .await
        .unwrap();

    assert_eq!(resolve(second).await.unwrap().status_code, 202);
    assert_eq!(resolve(first).await.unwrap().status_code, 404);
}

#[tokio::test]
async fn test_provisional_response_does_not_resolve() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let mut handle = dialog.invite(None, None).await.unwrap();
    let invite = transport.last_request();

    dialog
        .receive_message(response_to(&invite, 100, "Trying").into())
        .await
        .unwrap();
    dialog
        .receive_message(response_to(&invite, 180, "Ringing").into())
        .await
        .unwrap();

    assert!(futures::poll!(&mut handle).is_pending());
    assert_eq!(dialog.pending_transactions(), 1);

    dialog
        .receive_message(response_to(&invite, 486, "Busy Here").into())
        .await
        .unwrap();
    assert_eq!(resolve(handle).await.unwrap().status_code, 486);
}

#[tokio::test]
async fn test_invite_success_is_acknowledged() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.invite(None, Some("v=0\r\n".to_string())).await.unwrap();
    let invite = transport.last_request();

    let mut ok = response_to(&invite, 200, "OK");
    ok.contact = Some(Contact::from_header("<sip:bob@192.0.2.10:5070>").unwrap());
    dialog.receive_message(ok.clone().into()).await.unwrap();
    assert_eq!(resolve(handle).await.unwrap(), ok);

    let acks = transport.requests_of(Method::Ack);
    assert_eq!(acks.len(), 1);
    let ack = &acks[0];
    assert_eq!(ack.cseq, invite.cseq);
    assert_eq!(ack.uri.to_string(), "sip:bob@192.0.2.10:5070");
    assert_eq!(ack.call_id(), Some(dialog.call_id()));
    assert_eq!(ack.to.tag(), ok.to.tag());
    assert_ne!(ack.headers.get("Via"), invite.headers.get("Via"));
    assert_eq!(dialog.pending_transactions(), 0);
}

#[tokio::test]
async fn test_invite_failure_ack_reuses_branch() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.invite(None, None).await.unwrap();
    let invite = transport.last_request();
    dialog
        .receive_message(response_to(&invite, 603, "Decline").into())
        .await
        .unwrap();
    assert_eq!(resolve(handle).await.unwrap().status_code, 603);

    let ack = transport.last_request();
    assert_eq!(ack.method, Method::Ack);
    assert_eq!(ack.uri, invite.uri);
    assert_eq!(ack.headers.get("Via"), invite.headers.get("Via"));
}

#[tokio::test]
async fn test_non_invite_is_not_acknowledged() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.subscribe(None, 600).await.unwrap();
    let subscribe = transport.last_request();
    assert_eq!(subscribe.headers.get("Expires"), Some("600"));

    dialog
        .receive_message(response_to(&subscribe, 200, "OK").into())
        .await
        .unwrap();
    resolve(handle).await.unwrap();
    assert!(transport.requests_of(Method::Ack).is_empty());
}

#[tokio::test]
async fn test_cancel_invite_sends_cancel() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.invite(None, None).await.unwrap();
    let invite = transport.last_request();
    dialog
        .receive_message(response_to(&invite, 180, "Ringing").into())
        .await
        .unwrap();

    handle.cancel().await.unwrap();
    assert_eq!(dialog.pending_transactions(), 0);

    let cancel = transport.last_request();
    assert_eq!(cancel.method, Method::Cancel);
    assert_eq!(cancel.cseq, invite.cseq);
    assert_eq!(cancel.headers.get("Via"), invite.headers.get("Via"));
    assert_eq!(cancel.call_id(), invite.call_id());

    // Cancelling twice is harmless
    handle.cancel().await.unwrap();
    assert_eq!(transport.requests_of(Method::Cancel).len(), 1);
    assert_eq!(resolve(handle).await.unwrap_err(), DialogError::Cancelled);
}

#[tokio::test]
async fn test_cancel_non_invite_stays_local() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    let handle = dialog.send(Method::Options.into()).await.unwrap().unwrap();
    handle.cancel().await.unwrap();

    assert!(transport.requests_of(Method::Cancel).is_empty());
    assert_eq!(resolve(handle).await.unwrap_err(), DialogError::Cancelled);
}

#[tokio::test]
async fn test_dropped_handle_still_completes_transaction() {
    let (_app, connection, transport) = setup(TransportKind::Tcp);
    let dialog = alice_dialog(&connection, None);

    drop(dialog.send(Method::Options.into()).await.unwrap());
    let options = transport.last_request();
    dialog
        .receive_message(response_to(&options, 200, "OK").into())
        .await
        .unwrap();
    assert_eq!(dialog.pending_transactions(), 0);
}
