//! Resource governor for one evaluation

use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounds the size of strings functions may build during one evaluation.
///
/// Functions ask before allocating; a refusal turns into an
/// `InsufficientMemory` error value at the call site. The governor also
/// keeps a running total of granted characters for diagnostics.
#[derive(Debug)]
pub struct Governor {
    max_string_length: usize,
    granted: AtomicUsize,
}

impl Governor {
    /// Governor allowing strings of up to `max_string_length` chars.
    pub fn new(max_string_length: usize) -> Self {
        Self {
            max_string_length,
            granted: AtomicUsize::new(0),
        }
    }

    /// Whether a string of `len` chars may be allocated. Grants are
    /// counted.
    pub fn can_allocate_string(&self, len: usize) -> bool {
        if len > self.max_string_length {
            log::warn!(
                "governor refused string of {} chars (limit {})",
                len,
                self.max_string_length
            );
            return false;
        }
        self.granted.fetch_add(len, Ordering::Relaxed);
        true
    }

    /// Largest string length allowed.
    pub fn max_string_length(&self) -> usize {
        self.max_string_length
    }

    /// Characters granted so far.
    pub fn granted(&self) -> usize {
        self.granted.load(Ordering::Relaxed)
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new(10_000_000)
    }
}
