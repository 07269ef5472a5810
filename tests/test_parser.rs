use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use warden::http::parser::{ParseError, find_headers_end, parse_head, parse_http_request};
use warden::http::request::Method;

const TIMEOUT: Duration = Duration::from_secs(1);

/// Splits a raw request at the terminator like the session does.
fn split(raw: &[u8]) -> (Vec<u8>, BytesMut) {
    let end = find_headers_end(raw).expect("terminator");
    (raw[..end].to_vec(), BytesMut::from(&raw[end + 4..]))
}

#[test]
fn test_parse_simple_get_request() {
    let parsed = parse_head(b"GET / HTTP/1.1\r\nHost: example.com").unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("host"), Some("example.com"));
}

#[test]
fn test_parse_header_names_lowercased_and_trimmed() {
    let parsed = parse_head(b"GET / HTTP/1.1\r\n  Content-Type :  application/json  ").unwrap();

    assert_eq!(parsed.headers.iter().next(), Some(("content-type", "application/json")));
    assert_eq!(parsed.headers.get("Content-Type"), Some("application/json"));
}

#[test]
fn test_parse_repeated_headers_are_joined_in_order() {
    let raw = b"GET / HTTP/1.1\r\nAccept: text/html\r\naccept: application/json";
    let parsed = parse_head(raw).unwrap();

    assert_eq!(parsed.headers.len(), 1);
    assert_eq!(parsed.headers.get("accept"), Some("text/html, application/json"));
}

#[test]
fn test_parse_header_value_may_contain_colon() {
    let parsed = parse_head(b"GET / HTTP/1.1\r\nHost: localhost:8080").unwrap();

    assert_eq!(parsed.headers.get("host"), Some("localhost:8080"));
}

#[test]
fn test_parse_skips_header_without_colon() {
    let parsed = parse_head(b"GET / HTTP/1.1\r\nBrokenHeader\r\nHost: a").unwrap();

    assert_eq!(parsed.headers.len(), 1);
    assert_eq!(parsed.headers.get("host"), Some("a"));
}

#[test]
fn test_parse_request_line_needs_three_tokens() {
    for line in [&b"GET /"[..], b"GET / HTTP/1.1 extra", b"", b"GARBAGE"] {
        let result = parse_head(line);
        assert!(
            matches!(result, Err(ParseError::MalformedRequestLine(_))),
            "{:?} should be rejected",
            String::from_utf8_lossy(line)
        );
    }
}

#[test]
fn test_parse_unknown_method_is_kept() {
    let parsed = parse_head(b"BREW /pot HTTP/1.1").unwrap();

    assert_eq!(parsed.method, Method::Extension("BREW".to_string()));
}

#[test]
fn test_parse_non_utf8_header_bytes() {
    let parsed = parse_head(b"GET /caf\xe9 HTTP/1.1\r\nX-Name: \xff\xfe").unwrap();

    assert_eq!(parsed.path, "/caf\u{e9}");
    assert_eq!(parsed.headers.get("x-name"), Some("\u{ff}\u{fe}"));
}

#[tokio::test]
async fn test_parse_post_request_with_buffered_body() {
    let (head, mut buffered) = split(b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
    let mut socket: &[u8] = b"";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(&req.body[..], b"hello");
    assert!(buffered.is_empty());
}

#[tokio::test]
async fn test_parse_body_continues_from_socket() {
    let (head, mut buffered) = split(b"POST /api HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello");
    let mut socket: &[u8] = b" worldGET / HTTP/1.1\r\n\r\n";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert_eq!(&req.body[..], b"hello world");
    // Nothing past the declared length is read from the socket.
    assert_eq!(socket, b"GET / HTTP/1.1\r\n\r\n");
}

#[tokio::test]
async fn test_parse_short_body_when_peer_closes_early() {
    let (head, mut buffered) = split(b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\nab");
    let mut socket: &[u8] = b"c";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert_eq!(&req.body[..], b"abc");
}

#[tokio::test]
async fn test_parse_keeps_pipelined_bytes_in_buffer() {
    let (head, mut buffered) = split(
        b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nxyzGET /b HTTP/1.1\r\n\r\n",
    );
    let mut socket: &[u8] = b"";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert_eq!(&req.body[..], b"xyz");
    assert_eq!(&buffered[..], b"GET /b HTTP/1.1\r\n\r\n");
}

#[tokio::test]
async fn test_parse_without_content_length_has_empty_body() {
    let (head, mut buffered) = split(b"GET / HTTP/1.1\r\n\r\nGET /next HTTP/1.1\r\n\r\n");
    let mut socket: &[u8] = b"";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert!(req.body.is_empty());
    assert_eq!(&buffered[..], b"GET /next HTTP/1.1\r\n\r\n");
}

#[tokio::test]
async fn test_parse_invalid_content_length_skips_body() {
    let (head, mut buffered) = split(b"POST /api HTTP/1.1\r\nContent-Length: ten\r\n\r\nhello");
    let mut socket: &[u8] = b"";

    let req = parse_http_request(&head, &mut buffered, &mut socket, TIMEOUT).await.unwrap();

    assert!(req.body.is_empty());
    assert_eq!(&buffered[..], b"hello");
}

#[tokio::test]
async fn test_parse_body_read_times_out() {
    let (head, mut buffered) = split(b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\n");
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(b"ab").await.unwrap();

    let result = parse_http_request(
        &head,
        &mut buffered,
        &mut server,
        Duration::from_millis(50),
    )
    .await;

    assert!(matches!(result, Err(ParseError::Timeout(_))));
    drop(client);
}
