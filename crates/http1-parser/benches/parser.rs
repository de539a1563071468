use std::collections::VecDeque;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http1_parser::{HttpRequestLimits, HttpRequestParser, ParseResult};
use ring_channel::{ChannelError, DataSink, DataSource, IOChannel, NotificationSink};

#[derive(Default)]
struct FakeSource(VecDeque<u8>);
impl DataSource for FakeSource {
    fn data_available(&self) -> usize {
        self.0.len()
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let n = buf.len().min(self.0.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.0.pop_front().unwrap();
        }
        Ok(n)
    }
}

#[derive(Default)]
struct FakeSink;
impl DataSink for FakeSink {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        Ok(data.len())
    }
}

#[derive(Default)]
struct NoNotify;
impl NotificationSink for NoNotify {
    fn on_read_notification_changed(&mut self, _: bool) {}
    fn on_write_notification_changed(&mut self, _: bool) {}
}

fn channel_with(bytes: &[u8]) -> IOChannel<FakeSource, FakeSink, NoNotify> {
    let mut source = FakeSource::default();
    source.0.extend(bytes.iter().copied());
    let mut ch = IOChannel::new(source, FakeSink, NoNotify);
    ch.read_from_channel().unwrap();
    ch
}

fn simple_get(c: &mut Criterion) {
    let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nUser-Agent: bench\r\nAccept: */*\r\n\r\n";
    c.bench_function("parser_simple_get", |b| {
        b.iter(|| {
            let mut ch = channel_with(black_box(request));
            let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
            black_box(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
        });
    });
}

fn post_with_body(c: &mut Criterion) {
    let mut request = b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 4096\r\n\r\n".to_vec();
    request.extend(vec![0x41u8; 4096]);
    c.bench_function("parser_post_with_4k_body", |b| {
        b.iter(|| {
            let mut ch = channel_with(black_box(&request));
            let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
            black_box(matches!(parser.parse(&mut ch), ParseResult::ParsedRequest));
            black_box(matches!(parser.parse(&mut ch), ParseResult::ParsedBody));
        });
    });
}

fn chunked_body(c: &mut Criterion) {
    let mut request = b"PUT /stream HTTP/1.1\r\nHost: example.com\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for _ in 0..16 {
        request.extend(b"100\r\n");
        request.extend(vec![0x58u8; 256]);
        request.extend(b"\r\n");
    }
    request.extend(b"0\r\n\r\n");
    c.bench_function("parser_chunked_16x256", |b| {
        b.iter(|| {
            let mut ch = channel_with(black_box(&request));
            let mut parser = HttpRequestParser::new(HttpRequestLimits::default());
            while !parser.request().is_complete {
                match parser.parse(&mut ch) {
                    ParseResult::ParsedRequest | ParseResult::ParsedBody => {}
                    _ => break,
                }
            }
        });
    });
}

criterion_group!(benches, simple_get, post_with_body, chunked_body);
criterion_main!(benches);
