//! Line framing for the control channel

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::MAX_FRAME_LENGTH;

/// One decoded unit from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A line that was skipped as oversize or not UTF-8
    Dropped(String),
}

/// [`LinesCodec`] that survives bad lines
///
/// An oversize line is discarded up to its newline and a non-UTF-8 line is
/// consumed before the error surfaces, so neither desynchronizes the stream.
/// Both come out as [`Frame::Dropped`] instead of an error, which keeps
/// `Framed` from pausing the read side.
pub struct ControlCodec {
    lines: LinesCodec,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_FRAME_LENGTH),
        }
    }

    fn recover(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Frame>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Dropped(format!(
                "frame longer than {} bytes",
                MAX_FRAME_LENGTH
            )))),
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Dropped(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.lines.decode_eof(buf))
    }
}

impl Encoder<String> for ControlCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.lines.encode(line, buf)
    }
}
