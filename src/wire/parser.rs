//! Incremental HTTP/1.x response parser.
//!
//! Bytes are pushed in whatever pieces the channel delivers them and the
//! parser returns the events completed by each piece. Framing follows the
//! response headers: `Content-Length`, chunked transfer coding (with
//! trailers), or read-until-close. Interim 1xx responses other than
//! `101 Switching Protocols` are skipped.

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, StatusCode, Version};
use thiserror::Error;

use crate::error::FetchError;

/// Upper bound on a response head (status line plus headers).
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_HEADERS: usize = 128;
const MAX_CHUNK_LINE: usize = 4 * 1024;

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    /// Declared `Content-Length`, when the body is length-delimited.
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// The header block is complete.
    HeadersComplete(ResponseHead),
    /// Trailer fields of a chunked body.
    HeaderFragment(HeaderMap),
    /// A piece of the body, in receive order.
    BodyFragment(Bytes),
    /// The message is complete; nothing further will be emitted.
    MessageComplete,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid HTTP version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("malformed response head: {0}")]
    Head(String),

    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("invalid content-length: {0}")]
    ContentLength(String),

    #[error("malformed chunked body: {0}")]
    Chunk(String),

    #[error("connection closed before the response was complete")]
    Incomplete,

    #[error("parser already failed")]
    Failed,
}

impl From<ParseError> for FetchError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Incomplete => FetchError::Transport(err.to_string()),
            other => FetchError::Protocol(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Body { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataEnd,
    Trailers,
    UntilClose,
    Done,
    Failed,
}

/// Push parser for one response.
#[derive(Debug)]
pub struct ResponseParser {
    state: State,
    buf: BytesMut,
    expect_body: bool,
}

impl ResponseParser {
    /// `expect_body` is false for responses to `HEAD`.
    pub fn new(expect_body: bool) -> Self {
        Self {
            state: State::Head,
            buf: BytesMut::new(),
            expect_body,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Push `data` and collect the events it completes.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ParseEvent>, ParseError> {
        match self.state {
            State::Failed => return Err(ParseError::Failed),
            State::Done => {
                if !data.is_empty() {
                    tracing::trace!(bytes = data.len(), "Ignoring bytes after complete response");
                }
                return Ok(Vec::new());
            }
            _ => {}
        }

        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        match self.drive(&mut events) {
            Ok(()) => Ok(events),
            Err(err) => {
                self.state = State::Failed;
                Err(err)
            }
        }
    }

    /// Signal end of input. Completes a close-delimited body; anything else
    /// still in flight is [`ParseError::Incomplete`].
    pub fn finish(&mut self) -> Result<Vec<ParseEvent>, ParseError> {
        match self.state {
            State::UntilClose => {
                let mut events = Vec::new();
                if !self.buf.is_empty() {
                    events.push(ParseEvent::BodyFragment(self.buf.split().freeze()));
                }
                self.state = State::Done;
                events.push(ParseEvent::MessageComplete);
                Ok(events)
            }
            State::Done => Ok(Vec::new()),
            State::Failed => Err(ParseError::Failed),
            _ => {
                self.state = State::Failed;
                Err(ParseError::Incomplete)
            }
        }
    }

    fn drive(&mut self, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        loop {
            let progressed = match self.state {
                State::Head => self.parse_head(events)?,
                State::Body { remaining } => match self.take_body(remaining, events) {
                    Some(0) => {
                        self.complete(events);
                        true
                    }
                    Some(remaining) => {
                        self.state = State::Body { remaining };
                        true
                    }
                    None => false,
                },
                State::ChunkSize => self.parse_chunk_size()?,
                State::ChunkData { remaining } => match self.take_body(remaining, events) {
                    Some(0) => {
                        self.state = State::ChunkDataEnd;
                        true
                    }
                    Some(remaining) => {
                        self.state = State::ChunkData { remaining };
                        true
                    }
                    None => false,
                },
                State::ChunkDataEnd => {
                    if self.buf.len() < 2 {
                        false
                    } else if &self.buf[..2] == b"\r\n" {
                        self.buf.advance(2);
                        self.state = State::ChunkSize;
                        true
                    } else {
                        return Err(ParseError::Chunk("missing CRLF after chunk data".into()));
                    }
                }
                State::Trailers => self.parse_trailers(events)?,
                State::UntilClose => {
                    if self.buf.is_empty() {
                        false
                    } else {
                        events.push(ParseEvent::BodyFragment(self.buf.split().freeze()));
                        true
                    }
                }
                State::Done => {
                    if !self.buf.is_empty() {
                        tracing::trace!(bytes = self.buf.len(), "Ignoring bytes after complete response");
                        self.buf.clear();
                    }
                    false
                }
                State::Failed => return Err(ParseError::Failed),
            };

            if !progressed {
                return Ok(());
            }
        }
    }

    fn parse_head(&mut self, events: &mut Vec<ParseEvent>) -> Result<bool, ParseError> {
        check_version(&self.buf)?;

        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut slots);
        let used = match response.parse(&self.buf) {
            Ok(httparse::Status::Complete(used)) => used,
            Ok(httparse::Status::Partial) => {
                if self.buf.len() > MAX_HEAD_SIZE {
                    return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
                }
                return Ok(false);
            }
            Err(e) => return Err(ParseError::Head(e.to_string())),
        };

        let code = response
            .code
            .ok_or_else(|| ParseError::Head("missing status code".into()))?;
        let status = StatusCode::from_u16(code).map_err(|e| ParseError::Head(e.to_string()))?;
        let version = match response.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let reason = response.reason.unwrap_or_default().to_string();
        let headers = to_header_map(response.headers)?;
        self.buf.advance(used);

        if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
            tracing::trace!(status = status.as_u16(), "Skipping interim response");
            return Ok(true);
        }

        let chunked = is_chunked(&headers);
        let content_length = if chunked {
            None
        } else {
            content_length(&headers)?
        };
        let bodiless = !self.expect_body
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;

        self.state = if bodiless {
            State::Done
        } else if chunked {
            State::ChunkSize
        } else {
            match content_length {
                Some(0) => State::Done,
                Some(len) => State::Body { remaining: len },
                None => State::UntilClose,
            }
        };

        tracing::trace!(
            status = status.as_u16(),
            ?content_length,
            chunked,
            bodiless,
            "Parsed response head"
        );

        events.push(ParseEvent::HeadersComplete(ResponseHead {
            version,
            status,
            reason,
            headers,
            content_length,
        }));
        if self.state == State::Done {
            events.push(ParseEvent::MessageComplete);
        }
        Ok(true)
    }

    fn parse_chunk_size(&mut self) -> Result<bool, ParseError> {
        match httparse::parse_chunk_size(&self.buf) {
            Ok(httparse::Status::Complete((used, size))) => {
                self.buf.advance(used);
                self.state = if size == 0 {
                    State::Trailers
                } else {
                    State::ChunkData { remaining: size }
                };
                Ok(true)
            }
            Ok(httparse::Status::Partial) => {
                if self.buf.len() > MAX_CHUNK_LINE {
                    return Err(ParseError::Chunk("chunk size line too long".into()));
                }
                Ok(false)
            }
            Err(_) => Err(ParseError::Chunk("invalid chunk size line".into())),
        }
    }

    fn parse_trailers(&mut self, events: &mut Vec<ParseEvent>) -> Result<bool, ParseError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let (used, trailers) = match httparse::parse_headers(&self.buf, &mut slots) {
            Ok(httparse::Status::Complete((used, parsed))) => (used, to_header_map(parsed)?),
            Ok(httparse::Status::Partial) => {
                if self.buf.len() > MAX_HEAD_SIZE {
                    return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
                }
                return Ok(false);
            }
            Err(e) => return Err(ParseError::Chunk(format!("invalid trailers: {e}"))),
        };
        self.buf.advance(used);

        if !trailers.is_empty() {
            events.push(ParseEvent::HeaderFragment(trailers));
        }
        self.complete(events);
        Ok(true)
    }

    /// Move up to `remaining` buffered bytes out as a body fragment and
    /// return what is left, or `None` when nothing is buffered.
    fn take_body(&mut self, remaining: u64, events: &mut Vec<ParseEvent>) -> Option<u64> {
        if self.buf.is_empty() {
            return None;
        }
        let take = remaining.min(self.buf.len() as u64) as usize;
        events.push(ParseEvent::BodyFragment(self.buf.split_to(take).freeze()));
        Some(remaining - take as u64)
    }

    fn complete(&mut self, events: &mut Vec<ParseEvent>) {
        self.state = State::Done;
        events.push(ParseEvent::MessageComplete);
    }
}

/// Reject anything but HTTP/1.0 and HTTP/1.1 as soon as the version is
/// readable, before waiting for the rest of the head.
fn check_version(buf: &[u8]) -> Result<(), ParseError> {
    const PREFIX: &[u8] = b"HTTP/";

    if buf.len() <= PREFIX.len() || !buf.starts_with(PREFIX) {
        return Ok(());
    }
    let major = buf[PREFIX.len()];
    if !major.is_ascii_digit() {
        return Ok(());
    }
    let major = major - b'0';
    let minor = match (buf.get(PREFIX.len() + 1), buf.get(PREFIX.len() + 2)) {
        (None, _) | (Some(b'.'), None) => return Ok(()),
        (Some(b'.'), Some(digit)) if digit.is_ascii_digit() => digit - b'0',
        _ => 0,
    };

    if major == 1 && minor <= 1 {
        Ok(())
    } else {
        Err(ParseError::UnsupportedVersion { major, minor })
    }
}

fn to_header_map(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| ParseError::Head(format!("header name '{}': {e}", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| ParseError::Head(format!("header '{}': {e}", header.name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .last()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| ParseError::ContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
        match length {
            Some(existing) if existing != parsed => {
                return Err(ParseError::ContentLength(format!("conflicting values {existing} and {parsed}")));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}
