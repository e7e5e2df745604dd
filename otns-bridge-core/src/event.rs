use std::fmt;
use strum::{Display, FromRepr};
use thiserror::Error;

/// Size of the fixed event header: delay (u64), type (u8), length (u16)
pub const EVENT_HEADER_LEN: usize = 11;

/// Largest payload the visualizer accepts in a single event
pub const MAX_EVENT_DATA_LEN: usize = 1024;

/// Event type tag carried in the second header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u8)]
pub enum EventType {
    AlarmFired = 0,
    RadioReceived = 1,
    UartWrite = 2,
    RadioSpinelWrite = 3,
    StatusPush = 5,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event too short: {len} bytes, header needs {EVENT_HEADER_LEN}")]
    TooShort { len: usize },

    #[error("unknown event type {0}")]
    UnknownType(u8),

    #[error("payload truncated: header declares {declared} bytes, {available} available")]
    Truncated { declared: usize, available: usize },

    #[error("{extra} trailing bytes after a {declared} byte payload")]
    TrailingBytes { declared: usize, extra: usize },

    #[error("payload of {len} bytes exceeds the {MAX_EVENT_DATA_LEN} byte limit")]
    PayloadTooLarge { len: usize },
}

/// A single OTNS event datagram.
///
/// `delay` is only meaningful for alarm events and is carried as an opaque
/// integer; the visualizer defines its unit.
#[derive(Clone, PartialEq, Eq)]
pub struct Event {
    pub delay: u64,
    pub event_type: EventType,
    pub data: Vec<u8>,
}

impl Event {
    pub fn new(event_type: EventType, data: Vec<u8>, delay: u64) -> Self {
        Self {
            delay,
            event_type,
            data,
        }
    }

    /// Status push carrying a `key=value` text payload
    pub fn status(message: &str) -> Self {
        Self::new(EventType::StatusPush, message.as_bytes().to_vec(), 0)
    }

    /// Alarm with an empty payload
    pub fn alarm(delay: u64) -> Self {
        Self::new(EventType::AlarmFired, Vec::new(), delay)
    }

    /// Payload as text, if it is valid UTF-8
    pub fn message(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        if self.data.len() > MAX_EVENT_DATA_LEN {
            return Err(EventError::PayloadTooLarge {
                len: self.data.len(),
            });
        }

        let mut bytes = Vec::with_capacity(EVENT_HEADER_LEN + self.data.len());
        bytes.extend_from_slice(&self.delay.to_le_bytes());
        bytes.push(self.event_type as u8);
        bytes.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        if bytes.len() < EVENT_HEADER_LEN {
            return Err(EventError::TooShort { len: bytes.len() });
        }

        let (header, payload) = bytes.split_at(EVENT_HEADER_LEN);
        let mut delay = [0u8; 8];
        delay.copy_from_slice(&header[..8]);
        let delay = u64::from_le_bytes(delay);
        let event_type =
            EventType::from_repr(header[8]).ok_or(EventError::UnknownType(header[8]))?;
        let declared = u16::from_le_bytes([header[9], header[10]]) as usize;

        if payload.len() < declared {
            return Err(EventError::Truncated {
                declared,
                available: payload.len(),
            });
        }
        if payload.len() > declared {
            return Err(EventError::TrailingBytes {
                declared,
                extra: payload.len() - declared,
            });
        }

        Ok(Self::new(event_type, payload[..declared].to_vec(), delay))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Event");
        debug
            .field("delay", &self.delay)
            .field("event_type", &self.event_type);
        match self.message() {
            Some(text) => debug.field("data", &text),
            None => debug.field("data", &self.data),
        };
        debug.finish()
    }
}
