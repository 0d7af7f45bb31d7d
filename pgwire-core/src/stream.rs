//! C3: stream FSM — wraps the framing FSM (C2) with buffer orchestration.
//!
//! Grounded on `nativepg/protocol/read_message_fsm.hpp::read_message_stream_fsm`
//! (a buffer-aware wrapper around the framing FSM that asks its caller to
//! perform the actual read) and structurally on the teacher's
//! `io/buf_stream.rs::BufStream` (a growable read buffer plus a
//! read-then-decode loop) — adapted from "owns the socket and `.await`s" to
//! "returns a `Read` request and waits to be resumed", and from `BytesMut`'s
//! refcounted storage to a plain `Vec<u8>` this FSM owns outright.

use crate::error::Result;
use crate::framing::{FrameAction, Framing};
use crate::message::backend::BackendMessage;

/// Minimum number of spare bytes kept available in the buffer for a read,
/// even when the framing FSM hasn't asked for more than a handful (avoids a
/// storm of tiny reads on a byte-at-a-time transport).
const MIN_READ_CAPACITY: usize = 4096;

/// Result of a single [`Stream::resume`] call.
pub enum StreamAction<'a> {
    /// The caller should fill at least `hint` bytes (via [`Stream::fill_buf`]
    /// and its own transport read), then call `resume` again with the number
    /// of bytes actually read.
    Read { hint: usize },
    /// A full message is available. Borrowed from the stream's internal
    /// buffer; the stream must not be resumed again until this value is
    /// dropped (enforced by the borrow checker, not a runtime check).
    Message(BackendMessage<'a>),
}

/// Buffered, resumable decoder of one backend message at a time (C3).
pub struct Stream {
    buf: Vec<u8>,
    /// Bytes before `start` are discardable (already consumed).
    start: usize,
    /// Bytes before `filled` (and at/after `start`) are valid, unconsumed data.
    filled: usize,
    framing: Framing,
    /// Set after a `Message` is yielded; applied (buffer advanced, framing
    /// reset) at the top of the next `resume` call.
    pending_advance: usize,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            buf: Vec::new(),
            start: 0,
            filled: 0,
            framing: Framing::new(),
            pending_advance: 0,
        }
    }

    /// Ensures at least `want` spare bytes are available past `filled`,
    /// compacting the consumed prefix out of the way first, and returns that
    /// slice for the caller to fill via its transport.
    pub fn fill_buf(&mut self, want: usize) -> &mut [u8] {
        let want = want.max(MIN_READ_CAPACITY);

        if self.start > 0 {
            self.buf.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }

        let needed = self.filled + want;
        if self.buf.len() < needed {
            self.buf.resize(needed, 0);
        }

        &mut self.buf[self.filled..self.filled + want]
    }

    /// Advances the internal state by `bytes_read` (the number of bytes the
    /// caller actually wrote into the slice from [`Stream::fill_buf`]) and
    /// attempts to decode the next message.
    ///
    /// On the very first call, pass `bytes_read = 0`: the stream will report
    /// `Read` against an empty buffer, same as resuming a framing FSM with no
    /// bytes yet buffered.
    pub fn resume(&mut self, bytes_read: usize) -> Result<StreamAction<'_>> {
        self.filled += bytes_read;

        if self.pending_advance > 0 {
            self.start += self.pending_advance;
            self.pending_advance = 0;
            self.framing.reset();
        }

        match self.framing.resume(&self.buf[self.start..self.filled])? {
            FrameAction::NeedsMore(hint) => Ok(StreamAction::Read { hint }),
            FrameAction::Message { message, bytes_consumed } => {
                self.pending_advance = bytes_consumed;
                Ok(StreamAction::Message(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(stream: &mut Stream, data: &[u8]) {
        let dest = stream.fill_buf(data.len());
        dest[..data.len()].copy_from_slice(data);
    }

    #[test]
    fn decodes_a_message_split_across_arbitrary_chunk_boundaries() {
        let full: Vec<u8> = vec![
            0x43, 0x00, 0x00, 0x00, 0x0D, 0x53, 0x45, 0x4C, 0x45, 0x43, 0x54, 0x20, 0x31, 0x00,
        ];

        for split in 0..=full.len() {
            let mut stream = Stream::new();
            let (first, second) = full.split_at(split);

            feed(&mut stream, first);
            let mut n = first.len();

            let message = loop {
                match stream.resume(n).unwrap() {
                    StreamAction::Read { hint } => {
                        // Feed whatever of `second` remains, respecting the hint.
                        let to_feed = second.len().min(hint.max(1));
                        feed(&mut stream, &second[..to_feed]);
                        n = to_feed;
                    }
                    StreamAction::Message(msg) => break msg,
                }
            };

            match message {
                crate::message::backend::BackendMessage::CommandComplete(cc) => {
                    assert_eq!(cc.tag, "SELECT 1")
                }
                _ => panic!("wrong message for split {split}"),
            }
        }
    }

    #[test]
    fn two_sequential_messages_leave_no_bytes_unconsumed() {
        let mut stream = Stream::new();
        let mut data: Vec<u8> = vec![
            0x43, 0x00, 0x00, 0x00, 0x0D, 0x53, 0x45, 0x4C, 0x45, 0x43, 0x54, 0x20, 0x31, 0x00,
        ];
        data.extend_from_slice(&[0x5A, 0x00, 0x00, 0x00, 0x05, b'I']); // ReadyForQuery

        feed(&mut stream, &data);
        let mut n = data.len();
        let mut seen = 0;

        loop {
            match stream.resume(n).unwrap() {
                StreamAction::Read { .. } => break,
                StreamAction::Message(_) => {
                    seen += 1;
                    n = 0;
                    if seen == 2 {
                        break;
                    }
                }
            }
        }

        assert_eq!(seen, 2);
    }
}
