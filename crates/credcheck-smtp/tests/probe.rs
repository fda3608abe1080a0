//! End-to-end probes against scripted SMTP servers on localhost.
//!
//! Each test starts a tiny server that sends a greeting, then answers every
//! line it receives with the next canned reply.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use credcheck_smtp::command::encode_credential;
use credcheck_smtp::connection::tls_config_with_roots;
use credcheck_smtp::{
    CredentialValidator, Credentials, Endpoint, Error, FailureKind, ProbeOptions, Security, Step,
};

const ACCEPT: [&str; 5] = [
    "220 smtp.test ESMTP ready\r\n",
    "250 smtp.test\r\n",
    "334 VXNlcm5hbWU6\r\n",
    "334 UGFzc3dvcmQ6\r\n",
    "235 2.7.0 Authentication successful\r\n",
];

const REJECT: [&str; 5] = [
    "220 smtp.test ESMTP ready\r\n",
    "250 smtp.test\r\n",
    "334 VXNlcm5hbWU6\r\n",
    "334 UGFzc3dvcmQ6\r\n",
    "535 5.7.8 Authentication credentials invalid\r\n",
];

/// Plays `replies` over `stream` and returns the lines the client sent.
async fn serve<S>(stream: S, replies: &[&str]) -> Vec<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut received = Vec::new();

    let mut replies = replies.iter();
    if let Some(greeting) = replies.next() {
        writer.write_all(greeting.as_bytes()).await.unwrap();
        writer.flush().await.unwrap();
    }
    for reply in replies {
        match lines.next_line().await {
            Ok(Some(line)) => received.push(line),
            _ => break,
        }
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
        let _ = writer.flush().await;
    }
    received
}

async fn plain_server(replies: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, &replies).await
    });
    (port, handle)
}

struct TestCert {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

fn test_cert(name: &str) -> TestCert {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    TestCert {
        cert: cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    }
}

async fn tls_server(
    cert: &TestCert,
    replies: Vec<&'static str>,
) -> (u16, JoinHandle<Option<Vec<String>>>) {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert.clone()], cert.key.clone_key())
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // A client that refuses the certificate aborts the handshake
        let stream = acceptor.accept(stream).await.ok()?;
        Some(serve(stream, &replies).await)
    });
    (port, handle)
}

fn trusting(cert: &TestCert) -> ProbeOptions {
    let mut roots = RootCertStore::empty();
    roots.add(cert.cert.clone()).unwrap();
    ProbeOptions::new()
        .client_name("client.test")
        .tls_config(tls_config_with_roots(roots).unwrap())
}

fn fast_options() -> ProbeOptions {
    ProbeOptions::new()
        .client_name("client.test")
        .poll_budget(Duration::from_millis(20), 50)
}

#[tokio::test]
async fn test_plain_accepted_credentials() {
    let (port, server) = plain_server(ACCEPT.to_vec()).await;
    let validator = CredentialValidator::with_options(fast_options());

    let valid = validator
        .validate("user@example.com", "secret", "127.0.0.1", port, false)
        .await;

    assert!(valid);
    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            "HELO client.test".to_string(),
            "AUTH LOGIN".to_string(),
            encode_credential("user@example.com"),
            encode_credential("secret"),
        ]
    );
}

#[tokio::test]
async fn test_plain_rejected_credentials() {
    let (port, server) = plain_server(REJECT.to_vec()).await;
    let validator = CredentialValidator::with_options(fast_options());

    let err = validator
        .probe(
            &Credentials::new("user@example.com", "wrong"),
            &Endpoint::new("127.0.0.1", port),
            Security::None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Password);
    assert!(err.source.is_auth_rejected());
    assert_eq!(server.await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_plain_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let validator = CredentialValidator::with_options(fast_options());
    let err = validator
        .probe(
            &Credentials::new("user", "pass"),
            &Endpoint::new("127.0.0.1", port),
            Security::None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Greeting);
    assert_eq!(err.source.kind(), FailureKind::Connect);
}

#[tokio::test]
async fn test_plain_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let options = ProbeOptions::new().poll_budget(Duration::from_millis(10), 5);
    let err = CredentialValidator::with_options(options)
        .probe(
            &Credentials::new("user", "pass"),
            &Endpoint::new("127.0.0.1", port),
            Security::None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Greeting);
    assert!(matches!(err.source, Error::ReplyTimeout { attempts: 5 }));
}

#[tokio::test]
async fn test_plain_server_hangs_up_after_greeting() {
    let (port, server) = plain_server(ACCEPT[..1].to_vec()).await;
    let validator = CredentialValidator::with_options(fast_options());

    let err = validator
        .probe(
            &Credentials::new("user", "pass"),
            &Endpoint::new("127.0.0.1", port),
            Security::None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Helo);
    assert_eq!(err.source.kind(), FailureKind::StreamExhausted);
    server.await.unwrap();
}

#[tokio::test]
async fn test_tls_accepted_credentials() {
    let cert = test_cert("127.0.0.1");
    let (port, server) = tls_server(&cert, ACCEPT.to_vec()).await;
    let validator = CredentialValidator::with_options(trusting(&cert));

    assert!(
        validator
            .validate("user@example.com", "secret", "127.0.0.1", port, true)
            .await
    );
    let received = server.await.unwrap().expect("handshake completed");
    assert_eq!(received.len(), 4);
    assert_eq!(received[2], encode_credential("user@example.com"));
}

#[tokio::test]
async fn test_tls_rejected_credentials() {
    let cert = test_cert("127.0.0.1");
    let (port, server) = tls_server(&cert, REJECT.to_vec()).await;
    let validator = CredentialValidator::with_options(trusting(&cert));

    assert!(
        !validator
            .validate("user@example.com", "wrong", "127.0.0.1", port, true)
            .await
    );
    assert_eq!(server.await.unwrap().unwrap().len(), 4);
}

#[tokio::test]
async fn test_tls_untrusted_certificate_fails_closed() {
    let cert = test_cert("127.0.0.1");
    let (port, server) = tls_server(&cert, ACCEPT.to_vec()).await;
    // Default options trust only the public webpki roots
    let validator = CredentialValidator::new();

    let err = validator
        .probe(
            &Credentials::new("user", "pass"),
            &Endpoint::new("127.0.0.1", port),
            Security::Tls,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Greeting);
    assert_eq!(err.source.kind(), FailureKind::Handshake);
    assert!(server.await.unwrap().is_none());
}

#[tokio::test]
async fn test_tls_name_mismatch_fails_closed() {
    let cert = test_cert("mail.example.com");
    let (port, server) = tls_server(&cert, ACCEPT.to_vec()).await;
    let validator = CredentialValidator::with_options(trusting(&cert));

    let valid = validator
        .validate("user", "pass", "127.0.0.1", port, true)
        .await;

    assert!(!valid);
    assert!(server.await.unwrap().is_none());
}

#[tokio::test]
async fn test_plain_client_against_tls_server() {
    let cert = test_cert("127.0.0.1");
    let (port, _server) = tls_server(&cert, ACCEPT.to_vec()).await;
    let options = ProbeOptions::new().poll_budget(Duration::from_millis(10), 5);

    // The TLS server waits for a ClientHello; the plain client waits for a greeting
    let valid = CredentialValidator::with_options(options)
        .validate("user", "pass", "127.0.0.1", port, false)
        .await;

    assert!(!valid);
}

#[tokio::test]
async fn test_tls_handshake_bounded_by_connect_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accepts the TCP connection but never answers the ClientHello
    let _server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let options = ProbeOptions::new().connect_timeout(Duration::from_millis(300));
    let started = std::time::Instant::now();
    let err = CredentialValidator::with_options(options)
        .probe(
            &Credentials::new("user", "pass"),
            &Endpoint::new("127.0.0.1", port),
            Security::Tls,
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.step, Step::Greeting);
    assert_eq!(err.source.kind(), FailureKind::Handshake);
    assert!(err.source.to_string().contains("timed out"));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}
