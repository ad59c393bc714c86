#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::fs;
use std::net::TcpStream;

use common::test_server::{get, send_raw, start_server, staticdata, test_config, Response};

#[test]
fn test_static_html_served_with_length() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/index.html");
    server.stop();

    let expected = fs::read(staticdata().join("index.html")).unwrap();
    assert_eq!(resp.status_line, "HTTP/1.1 200 OK");
    assert_eq!(resp.header("Content-Type"), Some("text/html; charset=UTF-8"));
    assert_eq!(
        resp.header("Content-Length"),
        Some(expected.len().to_string().as_str())
    );
    assert_eq!(resp.body, expected);
}

#[test]
fn test_mime_types_by_extension() {
    let (server, addr) = start_server(test_config());
    let css = get(addr, "/style.css");
    let txt = get(addr, "/notes.txt");
    server.stop();
    assert_eq!(css.status, 200);
    assert_eq!(css.header("Content-Type"), Some("text/css; charset=UTF-8"));
    assert_eq!(txt.header("Content-Type"), Some("text/plain; charset=UTF-8"));
    assert_eq!(txt.text(), "plain text file\n");
}

#[test]
fn test_script_rendered_with_query() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/scripts/add.smscr?a=3&b=4");
    let defaults = get(addr, "/scripts/add.smscr");
    let hello = get(addr, "/scripts/hello.smscr?name=Ana%20Mar%C3%ADa");
    server.stop();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "7");
    assert_eq!(defaults.text(), "3");
    assert_eq!(hello.text(), "Hello, Ana María!");
    // Generated responses have no length header.
    assert_eq!(resp.header("Content-Length"), None);
}

#[test]
fn test_loops_render_in_order() {
    let (server, addr) = start_server(test_config());
    let loops = get(addr, "/scripts/loops.smscr");
    let shadow = get(addr, "/scripts/shadow.smscr");
    let format = get(addr, "/scripts/format.smscr");
    let temps = get(addr, "/scripts/temps.smscr");
    server.stop();
    assert_eq!(loops.text(), "123|321|");
    assert_eq!(shadow.text(), "10,11,1;10,11,2;");
    assert_eq!(format.text(), "3.14 ab");
    assert_eq!(temps.text(), "5none");
}

#[test]
fn test_script_sets_mime_type() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/scripts/mime.smscr");
    server.stop();
    assert_eq!(resp.header("Content-Type"), Some("text/plain; charset=UTF-8"));
    assert_eq!(resp.text(), "plain body");
}

#[test]
fn test_traversal_blocked() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/../Cargo.toml");
    let encoded = get(addr, "/scripts/%2e%2e/%2e%2e/Cargo.toml");
    server.stop();
    assert_eq!(resp.status, 403);
    assert!(resp.body.is_empty());
    assert_eq!(encoded.status, 403);
}

#[test]
fn test_missing_file_is_404() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/nope.html");
    let private = get(addr, "/private/secret.txt");
    let encoded_private = get(addr, "/%70rivate/secret.txt");
    let dotted_private = get(addr, "/scripts/../private/secret.txt");
    server.stop();
    assert_eq!(resp.status_line, "HTTP/1.1 404 Not Found");
    assert_eq!(resp.header("Content-Length"), Some("0"));
    assert!(resp.body.is_empty());
    assert_eq!(private.status, 404);
    assert_eq!(encoded_private.status, 404);
    assert_eq!(dotted_private.status, 404);
}

#[test]
fn test_malformed_request_is_400() {
    let (server, addr) = start_server(test_config());
    let garbage = Response::parse(&send_raw(addr, b"this is not http\r\n\r\n"));
    let post = Response::parse(&send_raw(addr, b"POST /index.html HTTP/1.1\r\n\r\n"));
    server.stop();
    assert_eq!(garbage.status, 400);
    assert_eq!(post.status, 400);
}

#[test]
fn test_oversized_header_is_400() {
    let mut config = test_config();
    config.max_header_bytes = 256;
    let (server, addr) = start_server(config);
    let request = format!(
        "GET / HTTP/1.1\r\nX-Filler: {}\r\n\r\n",
        "a".repeat(1024)
    );
    let resp = Response::parse(&send_raw(addr, request.as_bytes()));
    server.stop();
    assert_eq!(resp.status, 400);
}

#[test]
fn test_template_errors_are_500() {
    let (server, addr) = start_server(test_config());
    let broken = get(addr, "/scripts/broken.smscr");
    let runtime = get(addr, "/scripts/runtime.smscr");
    server.stop();
    assert_eq!(broken.status, 500);
    assert!(broken.body.is_empty());
    assert_eq!(runtime.status, 500);
}

#[test]
fn test_error_after_output_keeps_partial_body() {
    let (server, addr) = start_server(test_config());
    let resp = get(addr, "/scripts/late_error.smscr");
    server.stop();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "before");
}

#[test]
fn test_one_failure_does_not_affect_next_request() {
    let (server, addr) = start_server(test_config());
    let bad = get(addr, "/scripts/runtime.smscr");
    let good = get(addr, "/scripts/loops.smscr");
    server.stop();
    assert_eq!(bad.status, 500);
    assert_eq!(good.status, 200);
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let (server, addr) = start_server(test_config());
    assert!(server.is_running());
    assert_eq!(server.start().unwrap(), addr);
    assert_eq!(server.local_addr(), Some(addr));

    server.stop();
    server.stop();
    assert!(!server.is_running());
    assert!(server.local_addr().is_none());
    assert!(server.wait_ready().is_err());
}

#[test]
fn test_idle_clients_hold_only_their_worker() {
    let mut config = test_config();
    config.worker_threads = 2;
    let (server, addr) = start_server(config);

    // One silent client occupies one worker; the other still serves.
    let idle = TcpStream::connect(addr).unwrap();
    let resp = get(addr, "/index.html");
    drop(idle);
    server.stop();
    assert_eq!(resp.status, 200);
}
