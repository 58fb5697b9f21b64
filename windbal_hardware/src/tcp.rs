//! SCPI over a raw TCP socket (port 5025 on Keysight instruments).

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::scpi::ScpiTransport;
use crate::util::classify_io;

pub const DEFAULT_PORT: u16 = 5025;

pub struct TcpTransport {
    addr: String,
    timeout: Duration,
    reader: Option<BufReader<TcpStream>>,
    writer: Option<TcpStream>,
}

impl TcpTransport {
    /// `addr` is `host:port` or a bare host, which gets `DEFAULT_PORT`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        let mut addr = addr.into();
        if !addr.contains(':') {
            addr = format!("{addr}:{DEFAULT_PORT}");
        }
        Self {
            addr,
            timeout: timeout.max(Duration::from_millis(1)),
            reader: None,
            writer: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl ScpiTransport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let sock = self
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| HwError::Protocol(format!("cannot resolve {}", self.addr)))?;
        let stream = TcpStream::connect_timeout(&sock, self.timeout).map_err(classify_io)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        self.reader = Some(BufReader::new(stream.try_clone()?));
        self.writer = Some(stream);
        debug!(addr = %self.addr, "SCPI socket open");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.write_line("*CLS")
    }

    fn write_line(&mut self, cmd: &str) -> Result<()> {
        let w = self.writer.as_mut().ok_or(HwError::NotConnected)?;
        trace!(cmd, "scpi >");
        w.write_all(cmd.as_bytes()).map_err(classify_io)?;
        w.write_all(b"\n").map_err(classify_io)?;
        w.flush().map_err(classify_io)
    }

    fn read_line(&mut self) -> Result<String> {
        let r = self.reader.as_mut().ok_or(HwError::NotConnected)?;
        let mut line = String::new();
        let n = r.read_line(&mut line).map_err(classify_io)?;
        if n == 0 {
            return Err(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "instrument closed the connection",
            )));
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(len = line.len(), "scpi <");
        Ok(line)
    }

    fn close(&mut self) {
        if let Some(w) = self.writer.take() {
            let _ = w.shutdown(std::net::Shutdown::Both);
            debug!(addr = %self.addr, "SCPI socket closed");
        }
        self.reader = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    #[test]
    fn bare_host_gets_default_port() {
        let t = TcpTransport::new("10.0.0.5", Duration::from_secs(1));
        assert_eq!(t.addr(), "10.0.0.5:5025");
    }

    #[test]
    fn io_before_open_is_not_connected() {
        let mut t = TcpTransport::new("127.0.0.1:1", Duration::from_millis(10));
        assert!(matches!(t.write_line("*IDN?"), Err(HwError::NotConnected)));
        assert!(matches!(t.read_line(), Err(HwError::NotConnected)));
    }

    #[test]
    fn query_round_trips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut w = sock;
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            w.write_all(b"Keysight Technologies,DAQ970A,MY0000,A.03\r\n").unwrap();
        });

        let mut t = TcpTransport::new(addr.to_string(), Duration::from_secs(2));
        t.open().unwrap();
        let idn = t.query("*IDN?").unwrap();
        assert_eq!(idn, "Keysight Technologies,DAQ970A,MY0000,A.03");
        server.join().unwrap();
        t.close();
        t.close();
    }

    #[test]
    fn silent_instrument_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(200));
            drop(sock);
        });
        let mut t = TcpTransport::new(addr.to_string(), Duration::from_millis(30));
        t.open().unwrap();
        assert!(matches!(t.read_line(), Err(HwError::Timeout)));
        server.join().unwrap();
    }
}
