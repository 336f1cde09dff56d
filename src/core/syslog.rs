//! core::syslog
//!
//! Log sink that mirrors console output to the local syslog daemon.
//!
//! Each event becomes one datagram of the form `<PRI>ident[pid]: message`
//! on the `/dev/log` socket, with the facility fixed to `user`.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::Arc;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// The local syslog socket.
pub const SYSLOG_SOCKET: &str = "/dev/log";

const FACILITY_USER: u8 = 1;

/// Syslog severity for a tracing level.
pub fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// One syslog datagram.
pub fn frame(priority: u8, ident: &str, pid: u32, message: &str) -> Vec<u8> {
    format!("<{}>{}[{}]: {}", priority, ident, pid, message).into_bytes()
}

/// Writer factory for `tracing_subscriber::fmt::Layer::with_writer`.
#[derive(Debug, Clone)]
pub struct SyslogWriter {
    socket: Arc<UnixDatagram>,
    ident: String,
    pid: u32,
}

impl SyslogWriter {
    /// Connect to the syslog socket at `path`.
    pub fn connect(path: impl AsRef<Path>, ident: impl Into<String>) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self {
            socket: Arc::new(socket),
            ident: ident.into(),
            pid: std::process::id(),
        })
    }

    fn line(&self, level: &Level) -> SyslogLine<'_> {
        SyslogLine {
            writer: self,
            priority: FACILITY_USER * 8 + severity(level),
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(&Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(meta.level())
    }
}

/// Buffers one formatted event and sends it when flushed or dropped.
pub struct SyslogLine<'a> {
    writer: &'a SyslogWriter,
    priority: u8,
    buf: Vec<u8>,
}

impl SyslogLine<'_> {
    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buf);
        let datagram = frame(
            self.priority,
            &self.writer.ident,
            self.writer.pid,
            text.trim_end_matches('\n'),
        );
        self.buf.clear();
        self.writer.socket.send(&datagram).map(|_| ())
    }
}

impl io::Write for SyslogLine<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send()
    }
}

impl Drop for SyslogLine<'_> {
    fn drop(&mut self) {
        // A missing or full syslog daemon must not break the command.
        let _ = self.send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn priorities_use_user_facility() {
        assert_eq!(FACILITY_USER * 8 + severity(&Level::ERROR), 11);
        assert_eq!(FACILITY_USER * 8 + severity(&Level::WARN), 12);
        assert_eq!(FACILITY_USER * 8 + severity(&Level::TRACE), 15);
    }

    #[test]
    fn frame_layout() {
        assert_eq!(frame(12, "berth", 42, "hello"), b"<12>berth[42]: hello".to_vec());
    }

    #[test]
    fn events_are_sent_as_datagrams() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.sock");
        let daemon = UnixDatagram::bind(&path).unwrap();

        let writer = SyslogWriter::connect(&path, "berth").unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_level(false)
            .with_writer(writer)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("disk nearly full");
        });

        let mut buf = [0u8; 512];
        let n = daemon.recv(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.starts_with("<12>berth["), "{text}");
        assert!(text.contains("disk nearly full"), "{text}");
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn connect_fails_without_daemon() {
        let dir = TempDir::new().unwrap();
        assert!(SyslogWriter::connect(dir.path().join("missing"), "berth").is_err());
    }
}
