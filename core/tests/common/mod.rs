//! Shared fixture setup for the integration tests.
//!
//! Each test starts its own `mock-server` on an ephemeral port and drives
//! the blocking client against it over real HTTP.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use jenkins_core::{ClientConfig, JenkinsClient};
use mock_server::{Db, Registry};

pub const JOB_XML: &str = "<project><description>alpha</description><builders/></project>";

pub struct Fixture {
    pub db: Db,
    pub base_url: String,
}

pub fn start(registry: Registry) -> Fixture {
    let db = registry.shared();
    let addr = mock_server::spawn(db.clone()).unwrap();
    Fixture {
        db,
        base_url: format!("http://{addr}"),
    }
}

/// Fixture with one top-level job `alpha`.
pub fn start_with_job() -> Fixture {
    let mut registry = Registry::new();
    registry.add_job("job/alpha", JOB_XML);
    start(registry)
}

impl Fixture {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.as_str())
    }

    pub fn client(&self) -> JenkinsClient {
        JenkinsClient::new(self.config()).unwrap()
    }

    /// Run `f` against the live registry.
    pub fn registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.db.blocking_write())
    }
}

/// Client pointed at a port nothing listens on.
pub fn unreachable_config() -> ClientConfig {
    let addr = mock_server::unreachable_addr().unwrap();
    ClientConfig::new(format!("http://{addr}"))
}

/// Client pointed at a server that answers exactly one request with an
/// empty `200 OK` and then stops listening.
pub fn answer_once_config() -> ClientConfig {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .unwrap();
    });
    ClientConfig::new(format!("http://{addr}"))
}

/// Consume one request, headers and body.
fn read_request(stream: &mut TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();
}
