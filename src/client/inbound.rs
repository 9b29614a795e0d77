//! Inbound byte buffer with streaming UTF-8 decoding.
//!
//! One read from the socket is one logical chunk. The bytes are decoded as
//! far as they form complete characters; a multi-byte character split
//! across two reads stays in the buffer until the rest of it arrives.

use std::str::Utf8Error;

/// Capacity of the inbound buffer in bytes.
pub(crate) const INBOUND_CAPACITY: usize = 2048;

/// Text decoded from the buffered bytes.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub text: String,
    /// Number of leading bytes that were turned into `text` or dropped.
    pub consumed: usize,
    /// Invalid sequences that were skipped.
    pub errors: Vec<Utf8Error>,
}

/// Fixed-capacity byte buffer owned by the read loop.
#[derive(Debug)]
pub(crate) struct InboundBuffer {
    buf: Box<[u8]>,
    filled: usize,
}

impl InboundBuffer {
    pub(crate) fn new() -> Self {
        Self::with_capacity(INBOUND_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Unfilled tail of the buffer, where the next read lands.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Mark `n` bytes of the spare region as filled.
    pub(crate) fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.buf.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.filled
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Decode the filled bytes.
    ///
    /// Stops before an incomplete trailing sequence. Invalid sequences are
    /// skipped and reported in [`Decoded::errors`].
    pub(crate) fn decode(&self) -> Decoded {
        let bytes = &self.buf[..self.filled];
        let mut decoded = Decoded::default();
        let mut pos = 0;

        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(text) => {
                    decoded.text.push_str(text);
                    pos = bytes.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    decoded
                        .text
                        .push_str(&String::from_utf8_lossy(&bytes[pos..pos + valid]));
                    pos += valid;
                    match e.error_len() {
                        Some(len) => {
                            decoded.errors.push(e);
                            pos += len;
                        }
                        // Incomplete character at the end, wait for more bytes
                        None => break,
                    }
                }
            }
        }

        decoded.consumed = pos;
        decoded
    }

    /// Drop the first `consumed` bytes.
    ///
    /// Leftover bytes are shifted to the front and the write position
    /// follows them; a fully drained buffer is simply reset.
    pub(crate) fn consume(&mut self, consumed: usize) {
        let consumed = consumed.min(self.filled);
        if consumed == self.filled {
            self.filled = 0;
        } else {
            self.buf.copy_within(consumed..self.filled, 0);
            self.filled -= consumed;
        }
    }
}
