use super::protocol::{ColorFrame, FRAME_LEN};
use super::transport::pipe_path;
use std::io;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

#[cfg(windows)]
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};
#[cfg(unix)]
use tokio::net::UnixStream;

/// Consumer end of the color pipe.
pub struct PipeClient {
    #[cfg(windows)]
    stream: NamedPipeClient,
    #[cfg(unix)]
    stream: UnixStream,
    path: PathBuf,
}

impl PipeClient {
    /// Connect to the device's pipe by its well-known name.
    pub async fn connect(pipe_name: &str) -> io::Result<Self> {
        let path = pipe_path(pipe_name);

        #[cfg(windows)]
        let stream = ClientOptions::new().read(true).write(false).open(&path)?;
        #[cfg(unix)]
        let stream = UnixStream::connect(&path).await?;

        Ok(Self { stream, path })
    }

    /// Read the next frame, waiting until one arrives.
    pub async fn receive_frame(&mut self) -> io::Result<ColorFrame> {
        let mut buffer = [0u8; FRAME_LEN];
        self.stream.read_exact(&mut buffer).await?;

        ColorFrame::from_bytes(&buffer).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid frame: {}", e))
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
