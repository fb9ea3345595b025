// Server side of the color pipe: endpoint creation, cancellable accept and framed writes.

use super::protocol::ColorFrame;
use crate::error::DeviceError;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::oneshot;

#[cfg(windows)]
use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

#[cfg(windows)]
type ServerStream = NamedPipeServer;
#[cfg(unix)]
type ServerStream = UnixStream;

/// Resolve a well-known pipe name to its platform address.
///
/// Names that are already full pipe paths are returned unchanged.
#[cfg(windows)]
pub fn pipe_path(name: &str) -> PathBuf {
    if name.starts_with(r"\\.\pipe\") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!(r"\\.\pipe\{}", name))
    }
}

/// Resolve a well-known pipe name to its platform address.
///
/// On Unix the pipe is a stream socket in the user's runtime directory.
/// Names containing a `/` are treated as socket paths and returned unchanged.
#[cfg(unix)]
pub fn pipe_path(name: &str) -> PathBuf {
    if name.contains('/') {
        PathBuf::from(name)
    } else {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("{}.sock", name))
    }
}

/// Remove whatever the endpoint left on disk. Missing files are not an error.
pub fn remove_endpoint(path: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("[PIPE] Could not remove {}: {}", path.display(), e);
            }
        }
    }
    #[cfg(windows)]
    {
        let _ = path;
    }
}

/// A bound server endpoint that has not accepted a client yet.
pub struct PipeListener {
    path: PathBuf,
    #[cfg(windows)]
    server: NamedPipeServer,
    #[cfg(unix)]
    listener: UnixListener,
}

impl PipeListener {
    /// Create the server endpoint. Does not block.
    ///
    /// Must be called from within a Tokio runtime context.
    #[cfg(windows)]
    pub fn bind(path: &Path) -> io::Result<Self> {
        // Outbound only: the consumer never writes back.
        let server = ServerOptions::new()
            .access_inbound(false)
            .access_outbound(true)
            .create(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            server,
        })
    }

    /// Create the server endpoint. Does not block.
    ///
    /// Must be called from within a Tokio runtime context.
    #[cfg(unix)]
    pub fn bind(path: &Path) -> io::Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // A socket file left behind by a crashed host would make bind fail.
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }

        let listener = UnixListener::bind(path)?;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));

        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    /// Wait for a client to connect, or for `cancel` to fire.
    ///
    /// Returns `Ok(None)` when cancelled. A dropped cancel sender counts as a cancel.
    pub async fn accept(self, cancel: oneshot::Receiver<()>) -> io::Result<Option<PipeWriter>> {
        let path = self.path.clone();

        info!("[PIPE] Waiting for client on {}", path.display());

        let stream = tokio::select! {
            _ = cancel => {
                debug!("[PIPE] Accept on {} cancelled", path.display());
                return Ok(None);
            }
            stream = self.wait_for_client() => stream?,
        };

        info!("[PIPE] Client connected on {}", path.display());
        Ok(Some(PipeWriter::new(stream, path)))
    }

    #[cfg(windows)]
    async fn wait_for_client(self) -> io::Result<ServerStream> {
        self.server.connect().await?;
        Ok(self.server)
    }

    #[cfg(unix)]
    async fn wait_for_client(self) -> io::Result<ServerStream> {
        // The listener is dropped once the single client is in.
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }
}

/// Buffered writer over a connected pipe.
pub struct PipeWriter {
    stream: BufWriter<ServerStream>,
    path: PathBuf,
}

impl PipeWriter {
    fn new(stream: ServerStream, path: PathBuf) -> Self {
        Self {
            stream: BufWriter::new(stream),
            path,
        }
    }

    /// Write one frame and flush it, giving up after `timeout`.
    pub async fn write_frame(
        &mut self,
        frame: &ColorFrame,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        let bytes = frame.to_bytes();
        let stream = &mut self.stream;

        let write = async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeviceError::Transport(e)),
            Err(_) => Err(DeviceError::WriteTimeout(timeout)),
        }
    }

    /// Flush, disconnect the client and remove the endpoint.
    ///
    /// The endpoint is removed even when flushing or disconnecting fails;
    /// the first error is returned for the caller to log.
    pub async fn close(mut self) -> io::Result<()> {
        let flushed = self.stream.flush().await;

        #[cfg(windows)]
        let disconnected = self.stream.get_ref().disconnect();
        #[cfg(unix)]
        let disconnected = self.stream.get_mut().shutdown().await;

        remove_endpoint(&self.path);
        debug!("[PIPE] Closed {}", self.path.display());

        flushed.and(disconnected)
    }

    /// Drop the client without flushing and remove the endpoint.
    ///
    /// Bytes still sitting in the buffer are discarded. Used after a failed
    /// write, where a flush would only stall on the same dead consumer. Does
    /// not await, so it is safe to call from any thread.
    pub fn abandon(self) -> io::Result<()> {
        let stream = self.stream.into_inner();

        #[cfg(windows)]
        let disconnected = stream.disconnect();
        #[cfg(unix)]
        let disconnected = {
            // Closing the socket is what the client sees as end of stream.
            drop(stream);
            Ok(())
        };

        remove_endpoint(&self.path);
        debug!("[PIPE] Abandoned {}", self.path.display());

        disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_path_keeps_full_paths() {
        #[cfg(windows)]
        let full = r"\\.\pipe\AuroraEVGA";
        #[cfg(unix)]
        let full = "/tmp/evga-test/AuroraEVGA.sock";

        assert_eq!(pipe_path(full), PathBuf::from(full));
    }

    #[test]
    fn test_pipe_path_for_bare_name() {
        let path = pipe_path("AuroraEVGA");

        #[cfg(windows)]
        assert_eq!(path, PathBuf::from(r"\\.\pipe\AuroraEVGA"));
        #[cfg(unix)]
        assert!(path.ends_with("AuroraEVGA.sock"));
    }

    #[test]
    fn test_accept_can_be_cancelled() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let path = pipe_path(&format!("evga-transport-cancel-{}", std::process::id()));

        runtime.block_on(async {
            let listener = PipeListener::bind(&path).unwrap();
            let (cancel_tx, cancel_rx) = oneshot::channel();
            let accept = tokio::spawn(listener.accept(cancel_rx));

            cancel_tx.send(()).unwrap();
            let result = tokio::time::timeout(Duration::from_secs(5), accept)
                .await
                .expect("accept did not observe cancel")
                .unwrap();

            assert!(matches!(result, Ok(None)));
        });

        remove_endpoint(&path);
    }

    #[test]
    fn test_abandon_ends_the_stream_without_flushing() {
        use super::super::client::PipeClient;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let name = format!("evga-transport-abandon-{}", std::process::id());
        let path = pipe_path(&name);

        runtime.block_on(async {
            let listener = PipeListener::bind(&path).unwrap();
            let (_cancel_tx, cancel_rx) = oneshot::channel();
            let accept = tokio::spawn(listener.accept(cancel_rx));

            let mut client = PipeClient::connect(&name).await.unwrap();
            let mut writer = accept.await.unwrap().unwrap().expect("client not accepted");

            let frame = ColorFrame::new(crate::color::Color::rgb(1, 2, 3));
            writer
                .write_frame(&frame, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(client.receive_frame().await.unwrap(), frame);

            writer.abandon().unwrap();

            let next = tokio::time::timeout(Duration::from_secs(5), client.receive_frame())
                .await
                .expect("client did not see the pipe close");
            assert!(next.is_err());
        });

        #[cfg(unix)]
        assert!(!path.exists());
    }
}
