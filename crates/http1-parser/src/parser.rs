//! Full request state machine: request-line -> headers -> body (identity
//! or chunked) -> trailers.
//!
//! `parse()` is called repeatedly as bytes arrive on the channel's read
//! buffer. Internally it chains through states that aren't individually
//! reportable (finishing one header line, consuming a trailing chunk
//! CRLF) and only returns once it has something the caller needs to see:
//! a fully parsed request line, a delivered body chunk, or a terminal
//! failure. `requestSize` grows by every byte the parser actually removes
//! from the read buffer and is checked against `MaxRequestSize` at every
//! such removal, so an oversized field fails at the moment it crosses the
//! bound rather than only once its terminator shows up.

use ring_channel::{find_first_byte, find_first_non_field_char, ChannelError, DataSink, DataSource, IOChannel, NotificationSink, SimdIterator};

use crate::chunk::{parse_chunk_metadata, ChunkMetadataStatus};
use crate::error::ParserError;
use crate::field_block::trim_sp_htab;
use crate::invariants::{debug_assert_pending_body_no_underflow, debug_assert_request_size_monotonic};
use crate::limits::HttpRequestLimits;
use crate::request::{BodyType, HttpRequest, Method};

/// The literal bytes written to the channel's write buffer as soon as an
/// `Expect: 100-continue` header is recognized in a successfully parsed
/// header block.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

const VERSION_CRLF: &[u8] = b"HTTP/1.1\r\n";
const LONGEST_METHOD: usize = 7; // "OPTIONS"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectRequestLine,
    ExpectHeaders,
    ExpectBody,
    ExpectChunkMetadata,
    ExpectChunkData,
    ExpectChunkCrlf,
    ExpectTrailers,
    Done,
    Failed,
}

/// What one `parse()` call produced.
#[derive(Debug)]
pub enum ParseResult {
    /// A full request (request-line + headers, or the chunked
    /// zero-size terminator + optional trailers) was parsed.
    ParsedRequest,
    /// A slice of the request body was delivered; see
    /// [`HttpRequestParser::request`] for the bytes.
    ParsedBody,
    /// Not enough bytes are buffered yet to make progress.
    NeedsMoreData,
    /// Grammar or semantic violation. Terminal for the connection.
    Failed(ParserError),
    /// The channel's sink rejected the `100-continue` handshake write.
    /// Terminal for the connection, but distinct from `Failed` because
    /// the failure originated at the transport, not in the grammar.
    TransportFailed(ChannelError),
}

/// Internal result of one state's parsing step before it's folded into
/// the public [`ParseResult`].
enum StepError {
    Parser(ParserError),
    Transport(ChannelError),
}

impl From<ParserError> for StepError {
    fn from(e: ParserError) -> Self {
        StepError::Parser(e)
    }
}

type StepResult<T> = Result<T, StepError>;

enum FieldStep {
    Blank,
    Added,
    NeedsMoreData,
}

/// Streaming HTTP/1.1 request parser. Bound to one connection; request
/// state is reset in place between back-to-back requests on the same
/// stream.
pub struct HttpRequestParser {
    state: State,
    limits: HttpRequestLimits,
    request: HttpRequest,
    request_size: u64,
    chunk_remaining: u64,
    error: Option<ParserError>,
}

impl HttpRequestParser {
    pub fn new(limits: HttpRequestLimits) -> Self {
        Self {
            state: State::ExpectRequestLine,
            limits,
            request: HttpRequest::default(),
            request_size: 0,
            chunk_remaining: 0,
            error: None,
        }
    }

    /// The request under construction (or most recently completed).
    /// Valid to read after any non-`NeedsMoreData` result.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Bytes consumed toward the current request, across request-line,
    /// headers, chunk metadata, chunk data, and trailers.
    pub fn request_size(&self) -> u64 {
        self.request_size
    }

    /// The terminal error, once `parse()` has returned `Failed`.
    pub fn error(&self) -> Option<&ParserError> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// Advances the parser using whatever bytes are currently buffered on
    /// `channel`. Never blocks; never reads past what the channel already
    /// has. Safe to call again after `NeedsMoreData` once more bytes have
    /// arrived.
    pub fn parse<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> ParseResult
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        if self.state == State::Failed {
            return ParseResult::Failed(
                self.error.clone().unwrap_or_else(|| ParserError::malformed("parser already failed")),
            );
        }
        match self.run(channel) {
            Ok(result) => result,
            Err(StepError::Parser(e)) => {
                tracing::debug!(status = e.status_code(), "request parse failed: {e}");
                self.state = State::Failed;
                self.error = Some(e.clone());
                ParseResult::Failed(e)
            }
            Err(StepError::Transport(e)) => {
                tracing::warn!("channel write failed during Expect handshake: {e}");
                self.state = State::Failed;
                self.error = Some(ParserError::malformed("channel write failed during Expect handshake"));
                ParseResult::TransportFailed(e)
            }
        }
    }

    fn run<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<ParseResult>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        loop {
            match self.state {
                State::Done => self.start_next_request(),
                State::ExpectRequestLine => {
                    if !self.try_request_line(channel)? {
                        return Ok(ParseResult::NeedsMoreData);
                    }
                }
                State::ExpectHeaders => match self.step_field_block(channel, false)? {
                    FieldStep::Added => {}
                    FieldStep::NeedsMoreData => return Ok(ParseResult::NeedsMoreData),
                    FieldStep::Blank => {
                        self.finalize_headers(channel)?;
                        return Ok(ParseResult::ParsedRequest);
                    }
                },
                State::ExpectBody => {
                    return Ok(match self.try_identity_body(channel)? {
                        true => ParseResult::ParsedBody,
                        false => ParseResult::NeedsMoreData,
                    });
                }
                State::ExpectChunkMetadata => match self.try_chunk_metadata(channel)? {
                    ChunkStep::GotChunkData => {}
                    ChunkStep::RequestDone => return Ok(ParseResult::ParsedRequest),
                    ChunkStep::EnterTrailers => {}
                    ChunkStep::NeedsMoreData => return Ok(ParseResult::NeedsMoreData),
                },
                State::ExpectChunkData => {
                    return Ok(match self.try_chunk_data(channel)? {
                        true => ParseResult::ParsedBody,
                        false => ParseResult::NeedsMoreData,
                    });
                }
                State::ExpectChunkCrlf => {
                    if !self.try_chunk_crlf(channel)? {
                        return Ok(ParseResult::NeedsMoreData);
                    }
                }
                State::ExpectTrailers => match self.step_field_block(channel, true)? {
                    FieldStep::Added => {}
                    FieldStep::NeedsMoreData => return Ok(ParseResult::NeedsMoreData),
                    FieldStep::Blank => {
                        self.request.is_complete = true;
                        self.state = State::Done;
                        return Ok(ParseResult::ParsedRequest);
                    }
                },
                State::Failed => unreachable!("handled before entering run()"),
            }
        }
    }

    fn start_next_request(&mut self) {
        self.request.reset();
        self.request_size = 0;
        self.chunk_remaining = 0;
        self.state = State::ExpectRequestLine;
    }

    /// Pulls `n` bytes out of the channel's read buffer, folding them into
    /// the running `requestSize` counter and failing fast if that pushes
    /// past `MaxRequestSize`.
    fn consume<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>, n: usize) -> Result<(), ParserError>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        channel.skip(n);
        let before = self.request_size;
        self.request_size += n as u64;
        debug_assert_request_size_monotonic!(before, self.request_size);
        if let Some(max) = self.limits.max_request_size {
            if self.request_size > max {
                return Err(ParserError::too_big("request exceeds MaxRequestSize"));
            }
        }
        Ok(())
    }

    // ---- request line -----------------------------------------------

    fn try_request_line<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<bool>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        match parse_request_line(channel, &self.limits)? {
            None => Ok(false),
            Some(parsed) => {
                self.request.method = Some(parsed.method);
                self.request.path = parsed.path;
                self.request.query = parsed.query;
                self.consume(channel, parsed.consumed)?;
                self.state = State::ExpectHeaders;
                Ok(true)
            }
        }
    }

    // ---- headers / trailers ------------------------------------------

    fn step_field_block<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>, is_trailer: bool) -> StepResult<FieldStep>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        let (max_name, max_value, max_lines) = if is_trailer {
            (self.limits.max_trailer_name_size, self.limits.max_trailer_value_size, self.limits.max_trailer_line_count)
        } else {
            (self.limits.max_header_name_size, self.limits.max_header_value_size, self.limits.max_header_line_count)
        };
        let line = parse_field_line(channel, max_name, max_value)?;
        match line {
            LineStep::NeedsMoreData => Ok(FieldStep::NeedsMoreData),
            LineStep::Blank(consumed) => {
                self.consume(channel, consumed)?;
                Ok(FieldStep::Blank)
            }
            LineStep::Field { consumed, name, value } => {
                let block = if is_trailer { &mut self.request.trailers } else { &mut self.request.headers };
                if block.len() >= crate::field_block::MAX_FIELDS
                    || max_lines.is_some_and(|max| block.len() >= max)
                {
                    return Err(ParserError::too_big("header/trailer line count exceeds configured maximum").into());
                }
                block.add_line(&name, &value);
                self.consume(channel, consumed)?;
                Ok(FieldStep::Added)
            }
        }
    }

    fn finalize_headers<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<()>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        if self.request.headers.field_count("Host") != 1 {
            return Err(ParserError::malformed("exactly one Host header is required").into());
        }

        let cl_count = self.request.headers.field_count("Content-Length");
        let te_count = self.request.headers.field_count("Transfer-Encoding");
        if cl_count > 0 && te_count > 0 {
            return Err(ParserError::malformed("Content-Length and Transfer-Encoding must not both be present").into());
        }
        if te_count > 1 {
            return Err(ParserError::malformed("at most one Transfer-Encoding header is permitted").into());
        }

        let content_length = if cl_count > 0 { Some(self.parse_content_length(cl_count)?) } else { None };
        let chunked = te_count == 1 && self.transfer_encoding_is_chunked()?;

        self.write_continue_if_expected(channel)?;

        if chunked {
            self.request.body_type = BodyType::Chunked;
            self.state = State::ExpectChunkMetadata;
        } else if let Some(n) = content_length {
            if let Some(max_body) = self.limits.max_body_size {
                if n > max_body {
                    return Err(ParserError::too_big("Content-Length exceeds MaxBodySize").into());
                }
            }
            if let Some(max_req) = self.limits.max_request_size {
                if self.request_size.saturating_add(n) > max_req {
                    return Err(ParserError::too_big("Content-Length pushes request past MaxRequestSize").into());
                }
            }
            self.request.body_type = BodyType::NotChunked;
            self.request.request_body_size = n;
            self.request.pending_body_size = n;
            if n == 0 {
                self.request.is_complete = true;
                self.state = State::Done;
            } else {
                self.state = State::ExpectBody;
            }
        } else {
            self.request.body_type = BodyType::NoBody;
            self.request.is_complete = true;
            self.state = State::Done;
        }
        Ok(())
    }

    fn parse_content_length(&self, count: usize) -> Result<u64, ParserError> {
        let mut agreed: Option<u64> = None;
        for occurrence in 1..=count {
            let raw = self
                .request
                .headers
                .field_value("Content-Length", occurrence)
                .expect("occurrence within field_count range");
            if raw.is_empty() || raw.len() > 19 || !raw.iter().all(u8::is_ascii_digit) {
                return Err(ParserError::malformed("Content-Length value must be 1-19 ASCII digits"));
            }
            let n: u64 = std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ParserError::malformed("Content-Length value overflows a 64-bit integer"))?;
            match agreed {
                None => agreed = Some(n),
                Some(v) if v == n => {}
                Some(_) => return Err(ParserError::malformed("repeated Content-Length occurrences disagree")),
            }
        }
        Ok(agreed.unwrap_or(0))
    }

    fn transfer_encoding_is_chunked(&self) -> Result<bool, ParserError> {
        let raw = self.request.headers.field_value("Transfer-Encoding", 1).expect("te_count == 1 checked by caller");
        let last_coding = raw.rsplit(|&b| b == b',').next().unwrap_or(raw);
        let last_coding = trim_sp_htab(last_coding);
        if last_coding.eq_ignore_ascii_case(b"chunked") {
            Ok(true)
        } else {
            Err(ParserError::malformed("Transfer-Encoding must end with the chunked token"))
        }
    }

    fn write_continue_if_expected<D, K, N>(&self, channel: &mut IOChannel<D, K, N>) -> StepResult<()>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        let expect_count = self.request.headers.field_count("Expect");
        for occurrence in 1..=expect_count {
            let raw = self.request.headers.field_value("Expect", occurrence).unwrap();
            if raw.eq_ignore_ascii_case(b"100-continue") {
                channel.write(CONTINUE_RESPONSE).map_err(StepError::Transport)?;
                break;
            }
        }
        Ok(())
    }

    // ---- identity body ------------------------------------------------

    /// Returns `true` if a (possibly partial) body slice was delivered.
    fn try_identity_body<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<bool>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        let available = channel.data_available();
        if available == 0 {
            return Ok(false);
        }
        let take = available.min(self.request.pending_body_size as usize);
        if take == 0 {
            return Ok(false);
        }
        if let Some(max_body) = self.limits.max_body_size {
            if self.request.request_body_size.saturating_sub(self.request.pending_body_size) + take as u64 > max_body {
                return Err(ParserError::too_big("identity body exceeds MaxBodySize").into());
            }
        }
        let mut body = vec![0u8; take];
        channel.read_into(&mut body);
        self.apply_body_consumption(take, &body)?;
        self.request.body = body;
        debug_assert_pending_body_no_underflow!(self.request.pending_body_size + take as u64, take as u64);
        self.request.pending_body_size -= take as u64;
        if self.request.pending_body_size == 0 {
            self.request.is_complete = true;
            self.state = State::Done;
        }
        Ok(true)
    }

    /// Folds delivered body bytes into `requestSize`, separate from
    /// `consume` because identity-body bytes are pulled with
    /// `read_into` rather than `skip`.
    fn apply_body_consumption(&mut self, n: usize, _body: &[u8]) -> Result<(), ParserError> {
        let before = self.request_size;
        self.request_size += n as u64;
        debug_assert_request_size_monotonic!(before, self.request_size);
        if let Some(max) = self.limits.max_request_size {
            if self.request_size > max {
                return Err(ParserError::too_big("request exceeds MaxRequestSize"));
            }
        }
        Ok(())
    }

    // ---- chunked body ---------------------------------------------------

    fn try_chunk_metadata<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<ChunkStep>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        match parse_chunk_metadata(channel, 0) {
            ChunkMetadataStatus::NeedsMoreData => Ok(ChunkStep::NeedsMoreData),
            ChunkMetadataStatus::Failed(msg) => Err(ParserError::malformed(msg).into()),
            ChunkMetadataStatus::ExpectingChunkData { chunk_data_size, chunk_metadata_size } => {
                if let Some(max) = self.limits.max_chunk_metadata_size {
                    if chunk_metadata_size as u64 > max {
                        return Err(ParserError::too_big("chunk metadata exceeds MaxChunkMetadataSize").into());
                    }
                }
                self.consume(channel, chunk_metadata_size)?;
                self.chunk_remaining = chunk_data_size;
                self.state = State::ExpectChunkData;
                Ok(ChunkStep::GotChunkData)
            }
            ChunkMetadataStatus::ParsedRequest { chunk_metadata_size } => {
                if let Some(max) = self.limits.max_chunk_metadata_size {
                    if chunk_metadata_size as u64 > max {
                        return Err(ParserError::too_big("chunk metadata exceeds MaxChunkMetadataSize").into());
                    }
                }
                self.consume(channel, chunk_metadata_size)?;
                self.request.body.clear();
                self.request.pending_body_size = 0;
                self.request.is_complete = true;
                self.state = State::Done;
                Ok(ChunkStep::RequestDone)
            }
            ChunkMetadataStatus::ExpectingTrailer => {
                // Consume through the zero-size chunk's own CRLF; the
                // trailer field lines that follow are parsed with the
                // same grammar as headers, not as chunk metadata.
                let consumed = zero_chunk_line_len(channel);
                self.consume(channel, consumed)?;
                self.state = State::ExpectTrailers;
                Ok(ChunkStep::EnterTrailers)
            }
        }
    }

    fn try_chunk_data<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<bool>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        let available = channel.data_available();
        if available == 0 {
            return Ok(false);
        }
        let take = available.min(self.chunk_remaining as usize);
        if take == 0 {
            return Ok(false);
        }
        if let Some(max_body) = self.limits.max_body_size {
            if self.request.request_body_size + take as u64 > max_body {
                return Err(ParserError::too_big("chunked body exceeds MaxBodySize").into());
            }
        }
        let mut body = vec![0u8; take];
        channel.read_into(&mut body);
        self.apply_body_consumption(take, &body)?;
        self.request.request_body_size += take as u64;
        self.request.pending_body_size = 0;
        self.request.body = body;
        debug_assert_pending_body_no_underflow!(self.chunk_remaining, take as u64);
        self.chunk_remaining -= take as u64;
        if self.chunk_remaining == 0 {
            // Opportunistically consume the trailing CRLF now if it's
            // already buffered, so a fully-buffered chunked body needs
            // exactly one ParsedBody per chunk rather than an extra
            // round trip just to eat two bytes.
            if self.try_chunk_crlf(channel)? {
                self.state = State::ExpectChunkMetadata;
            } else {
                self.state = State::ExpectChunkCrlf;
            }
        }
        Ok(true)
    }

    fn try_chunk_crlf<D, K, N>(&mut self, channel: &mut IOChannel<D, K, N>) -> StepResult<bool>
    where
        D: DataSource,
        K: DataSink,
        N: NotificationSink,
    {
        let available = channel.data_available();
        if available < 2 {
            return Ok(false);
        }
        if channel.peek_char(0) != b'\r' || channel.peek_char(1) != b'\n' {
            return Err(ParserError::malformed("chunk data not followed by CRLF").into());
        }
        self.consume(channel, 2)?;
        Ok(true)
    }
}

enum ChunkStep {
    GotChunkData,
    RequestDone,
    EnterTrailers,
    NeedsMoreData,
}

/// Length of the zero-size chunk's own metadata line (`"0" CRLF`, plus any
/// chunk extensions before it), independent of however long the trailer
/// block that follows turns out to be.
fn zero_chunk_line_len<D, K, N>(channel: &IOChannel<D, K, N>) -> usize
where
    D: DataSource,
    K: DataSink,
    N: NotificationSink,
{
    let available = channel.data_available();
    (0..available)
        .find(|&i| channel.peek_char(i) == b'\n')
        .map_or(available, |i| i + 1)
}

struct RequestLine {
    consumed: usize,
    method: Method,
    path: Vec<u8>,
    query: Vec<u8>,
}

/// Parses `method SP request-target SP "HTTP/1.1" CRLF` directly off the
/// channel's read buffer, the same way [`crate::chunk::parse_chunk_metadata`]
/// parses chunk metadata: every delimiter (`method`'s trailing SP, the
/// request-target's trailing SP) is located with [`SimdIterator::scan`]
/// rather than a scalar walk over a linearized copy. `Ok(None)` means
/// more bytes are needed; limit overflows that are already unrecoverable
/// (no terminator could legally appear in time) are reported as
/// `TooBigRequest` instead of waiting forever.
fn parse_request_line<D, K, N>(
    channel: &mut IOChannel<D, K, N>,
    limits: &HttpRequestLimits,
) -> Result<Option<RequestLine>, ParserError>
where
    D: DataSource,
    K: DataSink,
    N: NotificationSink,
{
    let available = channel.data_available();
    if available == 0 {
        return Ok(None);
    }

    let sp1 = match SimdIterator::new(channel).scan(0, |w| find_first_byte(w, b' ')) {
        Some(p) => p,
        None => {
            if available > LONGEST_METHOD {
                return Err(ParserError::malformed("unrecognized HTTP method"));
            }
            return Ok(None);
        }
    };
    if sp1 == 0 {
        return Err(ParserError::malformed("request line must not begin with a space"));
    }
    let method = channel
        .slice_with(0, sp1, Method::from_bytes)
        .ok_or_else(|| ParserError::malformed("unrecognized HTTP method"))?;

    let target_start = sp1 + 1;
    if target_start >= available {
        return Ok(None);
    }
    if channel.peek_char(target_start) == b' ' {
        return Err(ParserError::malformed("unexpected extra space after method"));
    }
    let sp2 = match SimdIterator::new(channel).scan(target_start, |w| find_first_byte(w, b' ')) {
        Some(p) => p,
        None => {
            if let Some(max) = limits.max_url_size {
                if (available - target_start) as u64 > max {
                    return Err(ParserError::too_big("request-target exceeds MaxUrlSize"));
                }
            }
            return Ok(None);
        }
    };
    let target_len = sp2 - target_start;
    if let Some(max) = limits.max_url_size {
        if target_len as u64 > max {
            return Err(ParserError::too_big("request-target exceeds MaxUrlSize"));
        }
    }
    let (path, query) = channel.slice_with(target_start, target_len, |target| {
        validate_request_target(target, method).map(|(p, q)| (p.to_vec(), q.to_vec()))
    })?;

    let version_start = sp2 + 1;
    if version_start >= available {
        return Ok(None);
    }
    if channel.peek_char(version_start) == b' ' {
        return Err(ParserError::malformed("unexpected extra space before HTTP version"));
    }
    let version_len = available - version_start;
    if version_len < VERSION_CRLF.len() {
        let matches_prefix = channel.slice_with(version_start, version_len, |v| VERSION_CRLF.starts_with(v));
        if !matches_prefix {
            return Err(ParserError::malformed("expected literal HTTP/1.1 version"));
        }
        return Ok(None);
    }
    let version_ok = channel.slice_with(version_start, VERSION_CRLF.len(), |v| v == VERSION_CRLF);
    if !version_ok {
        return Err(ParserError::malformed("expected literal \"HTTP/1.1\" followed by CRLF"));
    }

    let consumed = version_start + VERSION_CRLF.len();
    Ok(Some(RequestLine { consumed, method, path, query }))
}

fn validate_request_target(target: &[u8], method: Method) -> Result<(&[u8], &[u8]), ParserError> {
    if target == b"*" {
        if method != Method::Options {
            return Err(ParserError::malformed("asterisk-form request-target is only valid for OPTIONS"));
        }
        return Ok((target, &target[target.len()..]));
    }
    if target.first() != Some(&b'/') {
        return Err(ParserError::malformed("origin-form request-target must begin with '/'"));
    }
    let (path, query) = match SimdIterator::new(target).scan(0, |w| find_first_byte(w, b'?')) {
        Some(p) => (&target[..p], &target[p + 1..]),
        None => (target, &target[target.len()..]),
    };
    validate_pchar_path(path)?;
    validate_pchar_path(query)?;
    Ok((path, query))
}

/// Validates `pchar / "/" / "?"` (RFC 3986) over `s`, requiring
/// pct-encoded triples to be exactly two hex digits.
fn validate_pchar_path(s: &[u8]) -> Result<(), ParserError> {
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            b'/' | b'?' => i += 1,
            b'%' => {
                let ok = i + 2 < s.len() && s[i + 1].is_ascii_hexdigit() && s[i + 2].is_ascii_hexdigit();
                if !ok {
                    return Err(ParserError::malformed("invalid percent-encoding in request-target"));
                }
                i += 3;
            }
            b if is_pchar(b) => i += 1,
            _ => return Err(ParserError::malformed("illegal character in request-target")),
        }
    }
    Ok(())
}

fn is_pchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'-' | b'.' | b'_' | b'~') // unreserved
        || matches!(b, b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=') // sub-delims
        || matches!(b, b':' | b'@')
}

enum LineStep {
    Blank(usize),
    Field { consumed: usize, name: Vec<u8>, value: Vec<u8> },
    NeedsMoreData,
}

/// Parses one `field-name ":" OWS field-value OWS CRLF` line, or the
/// blank `CRLF` that terminates a header/trailer block, directly off the
/// channel's read buffer. The colon and the terminating CR are both
/// located with [`SimdIterator::scan`] — the CR search reuses
/// [`find_first_non_field_char`], the same classifier the
/// chunk-extension scan uses, since CR is itself the first byte that
/// fails `field-vchar`. Copies `name` and `value` out so the result can
/// outlive the channel's internal buffer layout.
fn parse_field_line<D, K, N>(
    channel: &mut IOChannel<D, K, N>,
    max_name: usize,
    max_value: usize,
) -> Result<LineStep, ParserError>
where
    D: DataSource,
    K: DataSink,
    N: NotificationSink,
{
    let available = channel.data_available();
    if available == 0 {
        return Ok(LineStep::NeedsMoreData);
    }
    if channel.peek_char(0) == b'\r' {
        if available < 2 {
            return Ok(LineStep::NeedsMoreData);
        }
        if channel.peek_char(1) == b'\n' {
            return Ok(LineStep::Blank(2));
        }
        return Err(ParserError::malformed("lone CR is not a valid line terminator"));
    }

    let colon = match SimdIterator::new(channel).scan(0, |w| find_first_byte(w, b':')) {
        Some(p) => p,
        None => {
            if SimdIterator::new(channel).scan(0, |w| find_first_byte(w, b'\n')).is_some() {
                return Err(ParserError::malformed("header line is missing a colon"));
            }
            if available > max_name {
                return Err(ParserError::too_big("header field-name exceeds configured maximum"));
            }
            return Ok(LineStep::NeedsMoreData);
        }
    };
    if colon == 0 || colon > max_name {
        return Err(if colon == 0 {
            ParserError::malformed("header field-name must not be empty")
        } else {
            ParserError::too_big("header field-name exceeds configured maximum")
        });
    }
    let name = channel.slice_with(0, colon, <[u8]>::to_vec);
    if !name.iter().all(|&b| is_token_char(b)) {
        return Err(ParserError::malformed("illegal character in header field-name"));
    }

    let value_start = colon + 1;
    let cr = match SimdIterator::new(channel).scan(value_start, find_first_non_field_char) {
        Some(p) => p,
        None => {
            if available - value_start > max_value {
                return Err(ParserError::too_big("header field-value exceeds configured maximum"));
            }
            return Ok(LineStep::NeedsMoreData);
        }
    };
    let value_len = cr - value_start;
    if value_len > max_value {
        return Err(ParserError::too_big("header field-value exceeds configured maximum"));
    }
    let value = channel.slice_with(value_start, value_len, <[u8]>::to_vec);
    if !value.iter().all(|&b| is_field_vchar(b)) {
        return Err(ParserError::malformed("illegal character in header field-value"));
    }

    let lf_index = cr + 1;
    if lf_index >= available {
        return Ok(LineStep::NeedsMoreData);
    }
    if channel.peek_char(lf_index) != b'\n' {
        return Err(ParserError::malformed("field-value CR not followed by LF"));
    }

    let consumed = lf_index + 1;
    Ok(LineStep::Field { consumed, name, value })
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// `field-vchar` per RFC 9110: visible ASCII plus obs-text (0x80-0xFF),
/// plus the SP/HTAB that OWS allows inside the raw line we scan here.
fn is_field_vchar(b: u8) -> bool {
    !(b < 0x20 && b != 0x09) && b != 0x7F
}
