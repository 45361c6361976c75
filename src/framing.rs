//! Message boundary detection for the per-slot input buffers.
//!
//! Client messages are ASCII strings terminated by NUL, CR, LF, or EOT
//! (0x04). A scan only ever covers the region appended by the most recent
//! read; earlier bytes were already scanned when they arrived.

/// Free space below which a read is refused and the buffered message is
/// declared overflowed.
pub const OVERFLOW_RESERVE: usize = 4;

/// Returns true for bytes that end a client message.
#[inline]
pub fn is_terminator(byte: u8) -> bool {
    matches!(byte, 0 | b'\r' | b'\n' | 0x04)
}

/// Scans `buf[start..]` for the first terminator and returns its absolute
/// index, or `None` if the message is still incomplete.
pub fn scan(buf: &[u8], start: usize) -> Option<usize> {
    buf[start..]
        .iter()
        .position(|b| is_terminator(*b))
        .map(|pos| start + pos)
}
