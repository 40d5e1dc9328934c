//! Incremental CR-delimited line decoding
//!
//! Bytes arrive in arbitrary chunks; [`LineParser::feed`] appends a chunk and yields every
//! complete line it now holds. A trailing partial line stays buffered for the next call.
//! [`LineParser::reset`] drops that state and must be called whenever the underlying connection
//! is replaced.

use bytes::{Buf, BytesMut};

use crate::error::LineError;

const LINE_TERMINATOR: u8 = b'\r';

/// Splits a byte stream into trimmed, non-empty text lines.
#[derive(Debug)]
pub struct LineParser {
    buffer: BytesMut,
    max_line_length: usize,
    /// Set after an unterminated line outgrew the bound; bytes are dropped until the next CR
    discarding: bool,
}

impl LineParser {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_length.min(4096)),
            max_line_length,
            discarding: false,
        }
    }

    /// Append `chunk` and iterate over the complete lines.
    ///
    /// The iterator is lazy: lines not consumed before it is dropped stay buffered and come out
    /// of the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(chunk);
        Lines { parser: self }
    }

    /// Forget any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Bytes held for an unterminated line
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn next_line(&mut self) -> Option<Result<String, LineError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|b| *b == LINE_TERMINATOR) else {
                return self.check_partial();
            };

            let line = self.buffer.split_to(end);
            self.buffer.advance(1);

            if self.discarding {
                self.discarding = false;
                continue;
            }

            if line.len() > self.max_line_length {
                return Some(Err(LineError::Oversized {
                    limit: self.max_line_length,
                }));
            }

            match std::str::from_utf8(&line) {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Some(Ok(text.to_string()));
                }
                Err(e) => return Some(Err(LineError::InvalidEncoding(e.to_string()))),
            }
        }
    }

    fn check_partial(&mut self) -> Option<Result<String, LineError>> {
        if self.discarding {
            self.buffer.clear();
            return None;
        }
        if self.buffer.len() > self.max_line_length {
            self.buffer.clear();
            self.discarding = true;
            return Some(Err(LineError::Oversized {
                limit: self.max_line_length,
            }));
        }
        None
    }
}

/// Lines completed by one [`LineParser::feed`] call
pub struct Lines<'a> {
    parser: &'a mut LineParser,
}

impl Iterator for Lines<'_> {
    type Item = Result<String, LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_line()
    }
}
