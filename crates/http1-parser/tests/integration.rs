//! End-to-end scenarios driving the parser purely through its public API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use http1_parser::{BodyType, HttpRequestLimits, HttpRequestParser, Method, ParseResult};
use ring_channel::{ChannelError, DataSink, DataSource, IOChannel, NotificationSink};

#[derive(Default, Clone)]
struct FakeSource(Rc<RefCell<VecDeque<u8>>>);
impl DataSource for FakeSource {
    fn data_available(&self) -> usize {
        self.0.borrow().len()
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let mut queue = self.0.borrow_mut();
        let n = buf.len().min(queue.len());
        for slot in buf.iter_mut().take(n) {
            *slot = queue.pop_front().unwrap();
        }
        Ok(n)
    }
}

#[derive(Default, Clone)]
struct FakeSink(Rc<RefCell<Vec<u8>>>);
impl DataSink for FakeSink {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }
}

#[derive(Default)]
struct NoNotify;
impl NotificationSink for NoNotify {
    fn on_read_notification_changed(&mut self, _: bool) {}
    fn on_write_notification_changed(&mut self, _: bool) {}
}

type TestChannel = IOChannel<FakeSource, FakeSink, NoNotify>;

fn channel_with(bytes: &[u8]) -> (TestChannel, FakeSink) {
    let source = FakeSource::default();
    source.0.borrow_mut().extend(bytes.iter().copied());
    let sink = FakeSink::default();
    let mut ch = IOChannel::new(source, sink.clone(), NoNotify);
    ch.read_from_channel().unwrap();
    (ch, sink)
}

#[test]
fn scenario_1_simple_get() {
    let (mut ch, _) = channel_with(b"GET / HTTP/1.1\r\nHost: host.com\r\n\r\n");
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    let req = parser.request();
    assert_eq!(req.method, Some(Method::Get));
    assert_eq!(req.path, b"/");
    assert!(req.query.is_empty());
    assert_eq!(req.headers.len(), 1);
    assert!(req.body.is_empty());
    assert_eq!(req.body_type, BodyType::NoBody);
}

#[test]
fn scenario_2_identity_body_delivered_on_next_call() {
    let (mut ch, _) =
        channel_with(b"POST / HTTP/1.1\r\nHost: example.com\r\nContent-Length: 21\r\n\r\nThis is the body data");
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedBody));
    assert_eq!(parser.request().body, b"This is the body data");
    assert!(parser.request().is_complete);
}

#[test]
fn scenario_3_chunked_body_in_three_calls() {
    let (mut ch, _) = channel_with(
        b"PUT / HTTP/1.1\r\nHost: example.com\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n7\r\n World!\r\n0\r\n\r\n",
    );
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedBody));
    assert_eq!(parser.request().body, b"Hello");
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedBody));
    assert_eq!(parser.request().body, b" World!");
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(parser.request().request_body_size, 12);
    assert!(parser.request().body.is_empty());
    assert_eq!(parser.request().trailers_count(), 0);
}

#[test]
fn scenario_4_expect_continue_handshake() {
    let (mut ch, sink) = channel_with(b"GET / HTTP/1.1\r\nExpect: 100-continue\r\nHost: example.com\r\n\r\n");
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(&sink.0.borrow()[..], b"HTTP/1.1 100 Continue\r\n\r\n");
}

#[test]
fn scenario_5_disagreeing_content_length_fails() {
    let (mut ch, _) =
        channel_with(b"POST / HTTP/1.1\r\nHost: example.com\r\nContent-Length: 22\r\nContent-Length: 25\r\n\r\n");
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    match parser.parse(&mut ch) {
        ParseResult::Failed(e) => assert_eq!(e.status_code(), 400),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn scenario_6_options_asterisk_form() {
    let (mut ch, _) = channel_with(b"OPTIONS * HTTP/1.1\r\nHost: host.com\r\n\r\n");
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(parser.request().method, Some(Method::Options));
    assert_eq!(parser.request().path, b"*");
    assert!(parser.request().query.is_empty());
}

#[test]
fn scenario_7_oversized_url_fails() {
    let (mut ch, _) = channel_with(b"GET /aaaa HTTP/1.1\r\nHost: example.com\r\n\r\n");
    let mut limits = HttpRequestLimits::default();
    limits.max_url_size = Some(4);
    let mut parser = HttpRequestParser::new(limits);
    match parser.parse(&mut ch) {
        ParseResult::Failed(e) => assert_eq!(e.status_code(), 413),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn byte_by_byte_feed_matches_whole_feed_result() {
    let whole: &[u8] = b"GET /a/b?x=1&y=2 HTTP/1.1\r\nHost: example.com\r\nX-Custom: value\r\n\r\n";

    let (mut whole_ch, _) = channel_with(whole);
    let mut whole_parser = HttpRequestParser::new(HttpRequestLimits::default());
    let whole_result = loop {
        match whole_parser.parse(&mut whole_ch) {
            ParseResult::NeedsMoreData => unreachable!("entire request is already buffered"),
            other => break other,
        }
    };
    assert!(matches!(whole_result, ParseResult::ParsedRequest));

    let source = FakeSource::default();
    let sink = FakeSink::default();
    let mut ch = IOChannel::new(source.clone(), sink, NoNotify);
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    let mut byte_result = None;
    for &byte in whole {
        source.0.borrow_mut().push_back(byte);
        ch.read_from_channel().unwrap();
        match parser.parse(&mut ch) {
            ParseResult::NeedsMoreData => continue,
            other => {
                byte_result = Some(other);
                break;
            }
        }
    }
    assert!(matches!(byte_result, Some(ParseResult::ParsedRequest)));
    assert_eq!(parser.request().path, whole_parser.request().path);
    assert_eq!(parser.request().query, whole_parser.request().query);
    assert_eq!(parser.request().headers.len(), whole_parser.request().headers.len());
}

#[test]
fn back_to_back_requests_track_request_size_per_request() {
    let first = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n";
    let second = b"GET /b HTTP/1.1\r\nHost: h\r\n\r\n";
    let mut combined = first.to_vec();
    combined.extend_from_slice(second);
    let (mut ch, _) = channel_with(&combined);
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());

    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(parser.request().path, b"/a");
    assert_eq!(parser.request_size(), first.len() as u64);

    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(parser.request().path, b"/b");
    assert_eq!(parser.request_size(), second.len() as u64);
}

#[test]
fn failed_request_leaves_parser_terminally_failed() {
    let (mut ch, _) = channel_with(b"GET / HTTP/1.1\r\n\r\n"); // missing Host
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::Failed(_)));
    for _ in 0..3 {
        assert!(matches!(parser.parse(&mut ch), ParseResult::Failed(_)));
    }
    assert!(parser.is_failed());
    assert!(parser.error().is_some());
}

#[test]
fn trailers_follow_final_chunk() {
    let (mut ch, _) = channel_with(
        b"PUT / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ndata\r\n0\r\nX-Checksum: abc123\r\n\r\n",
    );
    let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedBody));
    assert_eq!(parser.request().body, b"data");
    assert!(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
    assert_eq!(parser.request().trailer("X-Checksum", 1), Some(&b"abc123"[..]));
    assert!(parser.request().is_complete);
}
