#![allow(dead_code)]

pub mod test_server {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::path::PathBuf;
    use std::sync::Once;
    use std::time::Duration;

    use smarthttp::{ServerConfig, SmartHttpServer};

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(2).set_stack_size(0x10000);
        });
    }

    pub fn staticdata() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/staticdata")
    }

    /// Configuration rooted at `tests/staticdata`, bound to an ephemeral port.
    pub fn test_config() -> ServerConfig {
        let mut config = ServerConfig::new(staticdata());
        config.port = 0;
        config.worker_threads = 2;
        config.validate().unwrap();
        config
    }

    /// Start a server and wait until it accepts connections.
    pub fn start_server(config: ServerConfig) -> (SmartHttpServer, SocketAddr) {
        setup_may_runtime();
        let server = SmartHttpServer::new(config).unwrap();
        let addr = server.start().unwrap();
        server.wait_ready().unwrap();
        (server, addr)
    }

    /// Send raw bytes and read until the server closes the connection.
    pub fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(request).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                // The server may close with request bytes still unread.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        buf
    }

    pub fn get(addr: SocketAddr, path: &str) -> Response {
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Response::parse(&send_raw(addr, request.as_bytes()))
    }

    /// A response split into status, header lines and body.
    #[derive(Debug)]
    pub struct Response {
        pub status: u16,
        pub status_line: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Response {
        pub fn parse(raw: &[u8]) -> Self {
            let split = raw
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .unwrap_or_else(|| panic!("no header terminator in {raw:?}"));
            let head = String::from_utf8_lossy(&raw[..split]).into_owned();
            let body = raw[split + 4..].to_vec();

            let mut lines = head.split("\r\n");
            let status_line = lines.next().unwrap_or_default().to_string();
            let status = status_line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0);
            let headers = lines
                .filter_map(|line| line.split_once(':'))
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .collect();
            Self {
                status,
                status_line,
                headers,
                body,
            }
        }

        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }
}
