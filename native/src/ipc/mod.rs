// Named pipe plumbing between the device and its consumer process.
// Server-to-client only: one frame per color change.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::PipeClient;
pub use protocol::{ColorFrame, FrameError, FRAME_LEN, LINE_TERMINATOR};
pub use transport::{pipe_path, PipeListener, PipeWriter};

/// Well-known pipe name the consumer connects to.
pub const PIPE_NAME: &str = "AuroraEVGA";
