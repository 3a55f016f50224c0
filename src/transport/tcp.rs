//! VISCA over a raw TCP socket.

use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::Transport;
use crate::error::TransportError;
use crate::protocol::FrameReader;

/// Smallest read timeout handed to the OS; zero means "block forever".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    reader: FrameReader,
    buffer: [u8; 64],
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            stream: None,
            reader: FrameReader::new(),
            buffer: [0u8; 64],
        }
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::connect(format!("{}: {}", self.describe(), e)))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::connect(format!(
                "{}: no addresses",
                self.describe()
            )));
        }
        Ok(addrs)
    }

    fn connect_one(addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&SockAddr::from(addr), timeout)?;
        socket.set_nodelay(true)?;
        Ok(socket.into())
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.close();
        let mut last_error = None;
        for addr in self.resolve()? {
            match Self::connect_one(addr, self.connect_timeout) {
                Ok(stream) => {
                    debug!("connected to {} via {}", self.describe(), addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(TransportError::connect(format!(
            "{}: {}",
            self.describe(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::closed("not connected"))?;
        stream.write_all(bytes).map_err(TransportError::from_write)?;
        stream.flush().map_err(TransportError::from_write)
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.reader.next_frame() {
                return Ok(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::timeout(format!(
                    "no reply from {} within {:?}",
                    self.describe(),
                    timeout
                )));
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| TransportError::closed("not connected"))?;
            stream
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
                .map_err(TransportError::from_read)?;
            match stream.read(&mut self.buffer) {
                Ok(0) => {
                    self.stream = None;
                    return Err(TransportError::closed("connection closed by camera"));
                }
                Ok(n) => self.reader.push(&self.buffer[..n]),
                Err(e) => {
                    let err = TransportError::from_read(e);
                    if !err.is_timeout() {
                        return Err(err);
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.reader.clear();
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        if self.host.contains(':') {
            format!("tcp://[{}]:{}", self.host, self.port)
        } else {
            format!("tcp://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_reads_frames_split_across_packets() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut cmd = [0u8; 7];
            conn.read_exact(&mut cmd).unwrap();
            conn.write_all(&[0x90, 0x41]).unwrap();
            conn.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            conn.write_all(&[0xFF, 0x90, 0x51, 0xFF]).unwrap();
            cmd
        });

        let mut transport = TcpTransport::new("127.0.0.1", port, Duration::from_secs(1));
        transport.open().unwrap();
        assert!(transport.is_open());
        transport
            .write(&[0x81, 0x01, 0x04, 0x3F, 0x01, 0x03, 0xFF])
            .unwrap();
        let timeout = Duration::from_secs(1);
        assert_eq!(transport.read_frame(timeout).unwrap(), vec![0x90, 0x41, 0xFF]);
        assert_eq!(transport.read_frame(timeout).unwrap(), vec![0x90, 0x51, 0xFF]);
        assert_eq!(server.join().unwrap(), [0x81, 0x01, 0x04, 0x3F, 0x01, 0x03, 0xFF]);
    }

    #[test]
    fn test_read_times_out_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(200));
            drop(conn);
        });

        let mut transport = TcpTransport::new("127.0.0.1", port, Duration::from_secs(1));
        transport.open().unwrap();
        let err = transport.read_frame(Duration::from_millis(30)).unwrap_err();
        assert!(err.is_timeout());
        assert!(transport.is_open());
        server.join().unwrap();
    }

    #[test]
    fn test_write_without_open_fails() {
        let mut transport = TcpTransport::new("127.0.0.1", 9, Duration::from_millis(100));
        assert!(transport.write(&[0x81, 0xFF]).is_err());
        assert_eq!(transport.describe(), "tcp://127.0.0.1:9");
    }
}
