//! Fixed-Capacity Response Buffer

use std::borrow::Cow;

/// Receive buffer capacity in bytes
pub const RESPONSE_BUFFER_CAPACITY: usize = 20;

/// Accumulates the bytes of one adapter reply.
///
/// Storage is allocated inline and never grows; a byte pushed into a full
/// buffer is refused, leaving the buffer terminated at capacity.
#[derive(Debug, Clone)]
pub struct ResponseBuffer<const N: usize = RESPONSE_BUFFER_CAPACITY> {
    storage: [u8; N],
    len: usize,
}

impl<const N: usize> ResponseBuffer<N> {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            storage: [0; N],
            len: 0,
        }
    }

    /// Append a byte. Returns `false` if the buffer is already full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len >= N {
            return false;
        }
        self.storage[self.len] = byte;
        self.len += 1;
        true
    }

    /// Valid bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Frame text, lossily decoded
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Parse the two ASCII hex digits starting at `offset`
    pub fn hex_pair(&self, offset: usize) -> Option<u8> {
        let pair = self.as_bytes().get(offset..offset + 2)?;
        if !pair.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        let text = std::str::from_utf8(pair).ok()?;
        u8::from_str_radix(text, 16).ok()
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Reset the write index
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> Default for ResponseBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
