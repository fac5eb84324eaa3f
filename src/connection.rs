//! Receiver side of a transport connection.
//!
//! A connection hands out its request input and response output as separate
//! streams. Dropping a stream closes only its own direction; the connection
//! itself stays open until [`ReceiverConnection::close`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use tracing::debug;

/// Incoming connection carrying one request and its response.
pub trait ReceiverConnection {
    type Input: Read + Send + 'static;
    type Output: Write;

    /// Address of the remote side.
    fn uri(&self) -> String;

    fn input_stream(&mut self) -> io::Result<Self::Input>;

    fn output_stream(&mut self) -> io::Result<Self::Output>;

    fn has_error(&self) -> bool {
        false
    }

    fn error_message(&self) -> Option<String> {
        None
    }

    fn close(self) -> io::Result<()>;
}

/// [`ReceiverConnection`] over an accepted TCP socket.
#[derive(Debug)]
pub struct TcpReceiverConnection {
    socket: TcpStream,
}

impl TcpReceiverConnection {
    pub fn new(socket: TcpStream) -> Self {
        Self { socket }
    }

    /// Fail reads that wait longer than `timeout`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }
}

impl ReceiverConnection for TcpReceiverConnection {
    type Input = TcpInputStream;
    type Output = TcpOutputStream;

    fn uri(&self) -> String {
        match self.socket.peer_addr() {
            Ok(addr) => format!("tcp://{}", addr),
            Err(_) => "tcp://unknown".to_string(),
        }
    }

    fn input_stream(&mut self) -> io::Result<TcpInputStream> {
        Ok(TcpInputStream {
            socket: self.socket.try_clone()?,
        })
    }

    fn output_stream(&mut self) -> io::Result<TcpOutputStream> {
        Ok(TcpOutputStream {
            socket: self.socket.try_clone()?,
        })
    }

    fn close(self) -> io::Result<()> {
        match self.socket.shutdown(Shutdown::Both) {
            // already shut down from both halves
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Request input of a TCP connection. Dropping it shuts down the read side.
#[derive(Debug)]
pub struct TcpInputStream {
    socket: TcpStream,
}

impl Read for TcpInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Drop for TcpInputStream {
    fn drop(&mut self) {
        if let Err(e) = self.socket.shutdown(Shutdown::Read) {
            debug!(error = %e, "Could not shut down connection input");
        }
    }
}

/// Response output of a TCP connection. Dropping it flushes and shuts down
/// the write side, which signals the end of the response to the peer.
#[derive(Debug)]
pub struct TcpOutputStream {
    socket: TcpStream,
}

impl Write for TcpOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}

impl Drop for TcpOutputStream {
    fn drop(&mut self) {
        let result = self
            .socket
            .flush()
            .and_then(|_| self.socket.shutdown(Shutdown::Write));
        if let Err(e) = result {
            debug!(error = %e, "Could not shut down connection output");
        }
    }
}
