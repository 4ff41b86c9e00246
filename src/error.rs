use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// This enum contains all error values this crate can return. Most fallible operations return
/// a [`Result<T, ChairsError>`].
#[derive(Debug)]
pub enum ChairsError {
    /// An I/O operation failed (bind, connect, send, read).
    Io(std::io::Error),
    /// The caller made an invalid request, usually bad CLI arguments or an invalid tracker.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A packet's JSON body exceeded the wire size budget and was dropped before sending.
    OversizedPacket {
        /// The encoded body length in bytes.
        len: usize,
    },
    /// A received frame could not be parsed into `(hash, body)` or the body failed to decode.
    BadFrame {
        /// Further specifies what was wrong with the frame.
        info: String,
    },
    /// A send was attempted to a peer with no live connection and the redial also failed.
    NotConnected {
        /// The peer's name.
        peer: String,
    },
}

impl Display for ChairsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChairsError::Io(err) => write!(f, "I/O error: {err}"),
            ChairsError::InvalidRequest { info } => write!(f, "Invalid request: {info}"),
            ChairsError::OversizedPacket { len } => {
                write!(f, "Packet body of {len} bytes exceeds the wire size budget")
            }
            ChairsError::BadFrame { info } => write!(f, "Bad frame: {info}"),
            ChairsError::NotConnected { peer } => {
                write!(f, "No connection to peer '{peer}' and redial failed")
            }
        }
    }
}

impl Error for ChairsError {}

impl From<std::io::Error> for ChairsError {
    fn from(err: std::io::Error) -> Self {
        ChairsError::Io(err)
    }
}
