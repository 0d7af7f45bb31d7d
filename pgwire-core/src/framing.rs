//! C2: framing FSM — extracts one length-prefixed message at a time from a
//! growing byte buffer.
//!
//! Grounded on `nativepg/protocol/read_message_fsm.hpp::read_message_fsm`:
//! the C++ original keeps a manual resume-point plus partially-decoded
//! `msg_type_`/`msg_size_` fields so it can resume mid-header when fed bytes
//! one read at a time. This crate's [`Stream`] (C3) instead always calls
//! `resume` with the *entire* currently buffered range, so the framing FSM
//! itself needs no state beyond "not yet terminated" — it simply re-attempts
//! the parse from the start of the buffer each time, which is cheap (a
//! handful of bytes) and keeps the invariant that it never retains pointers
//! past a `resume` call.

use crate::error::Result;
use crate::message::backend::{parse, BackendMessage, BackendTag};
use crate::message::header::parse_header;

const HEADER_LEN: usize = 5;

/// Result of a single [`Framing::resume`] call.
pub enum FrameAction<'a> {
    /// Not enough bytes buffered yet; the caller should read at least `hint`
    /// more bytes before calling again.
    NeedsMore(usize),
    /// A full message was decoded. `bytes_consumed` is the total wire size
    /// (header + payload) the caller must advance its buffer by.
    Message {
        message: BackendMessage<'a>,
        bytes_consumed: usize,
    },
}

/// Per-message framing state machine (C2).
#[derive(Debug, Default)]
pub struct Framing {
    done: bool,
}

impl Framing {
    pub fn new() -> Self {
        Framing { done: false }
    }

    /// Resets the FSM so it can decode the next message. Called by the
    /// stream FSM after a `Message` result has been consumed.
    pub fn reset(&mut self) {
        self.done = false;
    }

    /// Attempts to decode one message from `buf`. Never panics on
    /// under-length input; never reads past the bytes it is given.
    pub fn resume<'a>(&mut self, buf: &'a [u8]) -> Result<FrameAction<'a>> {
        debug_assert!(!self.done, "Framing::resume called after a terminal error");

        if buf.len() < HEADER_LEN {
            return Ok(FrameAction::NeedsMore(HEADER_LEN - buf.len()));
        }

        let header_bytes: [u8; HEADER_LEN] = buf[..HEADER_LEN].try_into().unwrap();
        let header = match parse_header(&header_bytes) {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let required = 1 + header.length as usize;
        if buf.len() < required {
            return Ok(FrameAction::NeedsMore(required - buf.len()));
        }

        let tag = match BackendTag::try_from(header.tag) {
            Ok(t) => t,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let body = &buf[HEADER_LEN..required];
        let message = match parse(tag, body) {
            Ok(m) => m,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        Ok(FrameAction::Message {
            message,
            bytes_consumed: required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_needs_more_when_header_incomplete() {
        let mut fsm = Framing::new();
        let buf = [0x43, 0x00, 0x00];
        match fsm.resume(&buf).unwrap() {
            FrameAction::NeedsMore(hint) => assert_eq!(hint, 2),
            _ => panic!("expected NeedsMore"),
        }
    }

    #[test]
    fn yields_needs_more_when_body_incomplete() {
        let mut fsm = Framing::new();
        // Header says length 13 (body of 9 bytes after the 4-byte length), but
        // only 3 of those 9 bytes are present.
        let mut buf = vec![0x43, 0x00, 0x00, 0x00, 0x0D];
        buf.extend_from_slice(b"SEL");
        match fsm.resume(&buf).unwrap() {
            FrameAction::NeedsMore(hint) => assert_eq!(hint, 6),
            _ => panic!("expected NeedsMore"),
        }
    }

    #[test]
    fn command_complete_fixture_consumes_fourteen_bytes() {
        let mut fsm = Framing::new();
        let buf: Vec<u8> = vec![
            0x43, 0x00, 0x00, 0x00, 0x0D, 0x53, 0x45, 0x4C, 0x45, 0x43, 0x54, 0x20, 0x31, 0x00,
        ];
        match fsm.resume(&buf).unwrap() {
            FrameAction::Message { message, bytes_consumed } => {
                assert_eq!(bytes_consumed, 14);
                match message {
                    BackendMessage::CommandComplete(cc) => assert_eq!(cc.tag, "SELECT 1"),
                    _ => panic!("wrong message"),
                }
            }
            _ => panic!("expected Message"),
        }
    }

    #[test]
    fn extra_bytes_after_message_are_left_for_the_next_resume() {
        let mut fsm = Framing::new();
        let mut buf: Vec<u8> = vec![
            0x43, 0x00, 0x00, 0x00, 0x0D, 0x53, 0x45, 0x4C, 0x45, 0x43, 0x54, 0x20, 0x31, 0x00,
        ];
        buf.push(0x5A); // start of a second message's tag ('Z')
        match fsm.resume(&buf).unwrap() {
            FrameAction::Message { bytes_consumed, .. } => assert_eq!(bytes_consumed, 14),
            _ => panic!("expected Message"),
        }
    }
}
