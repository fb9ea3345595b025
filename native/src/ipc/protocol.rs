// Wire format: four raw ARGB bytes followed by the platform line terminator.

use crate::color::Color;
use thiserror::Error;

/// Line terminator appended to every frame.
#[cfg(windows)]
pub const LINE_TERMINATOR: &[u8] = b"\r\n";
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &[u8] = b"\n";

/// Total size of one encoded frame on the wire.
pub const FRAME_LEN: usize = 4 + LINE_TERMINATOR.len();

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("frame is not terminated by the line terminator")]
    MissingTerminator,
}

/// One outbound color message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorFrame {
    color: Color,
}

impl ColorFrame {
    pub fn new(color: Color) -> Self {
        Self { color }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Serialize to the exact bytes written to the pipe.
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..4].copy_from_slice(&self.color.to_argb_bytes());
        bytes[4..].copy_from_slice(LINE_TERMINATOR);
        bytes
    }

    /// Parse a single frame. The slice must be exactly [`FRAME_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_LEN {
            return Err(FrameError::Length {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        // Color bytes may themselves equal the terminator, so only the tail is checked.
        if &bytes[4..] != LINE_TERMINATOR {
            return Err(FrameError::MissingTerminator);
        }

        let color = Color::from_argb_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self { color })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let bytes = ColorFrame::new(Color::from_argb(255, 10, 20, 30)).to_bytes();
        assert_eq!(&bytes[..4], &[255, 10, 20, 30]);
        assert_eq!(&bytes[4..], LINE_TERMINATOR);
        assert_eq!(bytes.len(), FRAME_LEN);
    }

    #[test]
    fn test_color_bytes_matching_terminator_survive() {
        let newline = b'\n';
        let color = Color::from_argb(newline, newline, 13, newline);
        let frame = ColorFrame::from_bytes(&ColorFrame::new(color).to_bytes()).unwrap();
        assert_eq!(frame.color(), color);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            ColorFrame::from_bytes(&[1, 2, 3]),
            Err(FrameError::Length {
                expected: FRAME_LEN,
                actual: 3
            })
        );
    }

    #[test]
    fn test_rejects_missing_terminator() {
        let mut bytes = ColorFrame::new(Color::BLACK).to_bytes();
        bytes[FRAME_LEN - 1] = b'x';
        assert_eq!(
            ColorFrame::from_bytes(&bytes),
            Err(FrameError::MissingTerminator)
        );
    }
}
