use crate::error::{LinkError, Result};
use log::*;
use std::io::{self, Read};
use std::net::TcpStream;

/// Source of raw bytes that can be checked without blocking.
pub trait ByteSource {
    /// Reads whatever is available right now.
    ///
    /// Returns `Ok(None)` if no data is ready and `Ok(Some(0))` once the peer closed the
    /// connection.
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

pub struct TcpByteSource {
    stream: TcpStream,
}

impl TcpByteSource {
    /// Connects in blocking mode, then switches the socket to non-blocking reads.
    pub fn connect(address: &str) -> Result<Self> {
        let connect_error = |source| LinkError::Connect {
            address: address.to_owned(),
            source,
        };
        let stream = TcpStream::connect(address).map_err(connect_error)?;
        stream.set_nonblocking(true).map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;
        info!("Connected to location server at {}", address);
        Ok(Self { stream })
    }
}

impl ByteSource for TcpByteSource {
    fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.stream.read(buf) {
            Ok(read) => Ok(Some(read)),
            Err(error)
                if error.kind() == io::ErrorKind::WouldBlock
                    || error.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl Drop for TcpByteSource {
    fn drop(&mut self) {
        // peer may already be gone
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        debug!("Socket released");
    }
}

/// Accumulates received bytes and splits them into newline terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Removes and decodes the text in front of the first newline.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let end = self.buffer.iter().position(|&byte| byte == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
        Some(
            std::str::from_utf8(&line)
                .map(str::to_owned)
                .map_err(LinkError::from),
        )
    }

    /// Bytes of a message that has not been terminated yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

pub struct SocketPoller<S> {
    source: S,
    lines: LineBuffer,
    chunk: Vec<u8>,
}

impl<S: ByteSource> SocketPoller<S> {
    pub fn new(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            lines: LineBuffer::new(),
            chunk: vec![0; chunk_size.max(1)],
        }
    }

    /// Pulls at most one chunk from the source into the line buffer.
    ///
    /// Returns whether any data was read.
    pub fn fill(&mut self) -> Result<bool> {
        match self.source.poll_read(&mut self.chunk) {
            Ok(None) => Ok(false),
            Ok(Some(0)) => Err(LinkError::PeerClosed),
            Ok(Some(read)) => {
                trace!("Received {} bytes", read);
                self.lines.push(&self.chunk[..read]);
                Ok(true)
            }
            Err(error) => Err(LinkError::Transport(error)),
        }
    }

    pub fn next_line(&mut self) -> Option<Result<String>> {
        self.lines.next_line()
    }
}
