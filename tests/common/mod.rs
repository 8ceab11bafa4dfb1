//! Local stand-in for the log intake
//!
//! Accepts any number of plain TCP connections and records every
//! newline-terminated record it receives, in arrival order.

#![allow(dead_code)]

use log_intake_transport::{BackoffPolicy, EndpointConfig, Transport, TransportBuilder};
use native_tls::{Identity, TlsAcceptor};
use parking_lot::Mutex;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

pub const API_KEY: &str = "test-api-key";

pub struct StubIntake {
    addr: SocketAddr,
    records: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<AtomicUsize>,
}

impl StubIntake {
    pub fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind stub intake");
        let addr = listener.local_addr().expect("stub has address");
        let records = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_records = Arc::clone(&records);
        let accept_connections = Arc::clone(&connections);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accept_connections.fetch_add(1, Ordering::SeqCst);
                let records = Arc::clone(&accept_records);
                thread::spawn(move || {
                    let mut reader = BufReader::new(stream);
                    loop {
                        let mut line = Vec::new();
                        match reader.read_until(b'\n', &mut line) {
                            Ok(0) | Err(_) => break,
                            Ok(_) => records.lock().push(line),
                        }
                    }
                });
            }
        });

        Self {
            addr,
            records,
            connections,
        }
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig::plain("127.0.0.1", self.addr.port())
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.lock().clone()
    }

    /// Wait until at least `count` records arrived, then return all of them
    pub fn wait_for_records(&self, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let records = self.records();
            if records.len() >= count || Instant::now() >= deadline {
                return records;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn builder(&self) -> TransportBuilder {
        Transport::builder()
            .api_key(API_KEY)
            .endpoint(self.endpoint())
            .backoff(quick_backoff())
    }
}

pub fn quick_backoff() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(10),
        cap: Duration::from_millis(50),
        deadline: Duration::from_millis(300),
    }
}

/// Split a record into its key and decoded JSON body
pub fn parse_record(record: &[u8]) -> (String, serde_json::Value) {
    let text = std::str::from_utf8(record).expect("record is utf-8");
    let body = text.strip_suffix('\n').expect("record ends with newline");
    let (key, json) = body.split_once(' ').expect("record has key separator");
    (
        key.to_string(),
        serde_json::from_str(json).expect("record body is JSON"),
    )
}

pub fn closed_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind probe listener");
    listener.local_addr().expect("probe has address").port()
}

/// TLS intake that trusts nothing but its own test CA
///
/// Accepts a single client and forwards every line it sends. The returned
/// endpoint validates the server against that CA as `localhost`.
pub fn start_tls_intake() -> (EndpointConfig, mpsc::Receiver<String>) {
    let ca_key = KeyPair::generate().expect("generate CA key");
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "log intake test CA");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).expect("self-sign CA");

    let server_key = KeyPair::generate().expect("generate server key");
    let mut server_params =
        CertificateParams::new(vec!["localhost".to_string()]).expect("server params");
    server_params
        .distinguished_name
        .push(DnType::CommonName, "localhost");
    let server_cert = server_params
        .signed_by(&server_key, &ca_cert, &ca_key)
        .expect("sign server certificate");
    let identity = Identity::from_pkcs8(
        server_cert.pem().as_bytes(),
        server_key.serialize_pem().as_bytes(),
    )
    .expect("server identity");
    let acceptor = TlsAcceptor::new(identity).expect("TLS acceptor");

    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind TLS intake");
    let port = listener.local_addr().expect("TLS intake has address").port();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else { return };
        let Ok(tls) = acceptor.accept(stream) else { return };
        let mut reader = BufReader::new(tls);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut endpoint = EndpointConfig::tls("127.0.0.1", port, "localhost");
    if let Some(tls) = endpoint.tls.as_mut() {
        tls.root_certificate_pem = Some(ca_cert.pem());
    }
    endpoint.connect_timeout = Duration::from_secs(2);
    (endpoint, rx)
}
