use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;

/// Where a command writes its user-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    Stderr,
    Null,
    File(PathBuf),
}

impl FromStr for Output {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.to_lowercase().as_str() {
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            "null" => Self::Null,
            _ => Self::File(PathBuf::from(raw)),
        })
    }
}

impl Output {
    /// Opens the destination. Files are created if missing and appended to.
    pub fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(match self {
            Self::Stdout => Box::new(io::stdout()),
            Self::Stderr => Box::new(io::stderr()),
            Self::Null => Box::new(io::sink()),
            Self::File(path) => {
                tracing::debug!(path = %path.display(), "Opening output file");
                Box::new(OpenOptions::new().create(true).append(true).open(path)?)
            }
        })
    }

    pub fn open_shared(&self) -> io::Result<SharedWriter> {
        self.open().map(SharedWriter::new)
    }
}

/// Cloneable, line-oriented writer shared between tasks.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes `line` followed by a newline and flushes.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self.inner.lock();
        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()
    }

    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.inner.lock();
        guard.write_all(bytes)?;
        guard.flush()
    }
}

/// Growable in-memory destination; handy for capturing output in tests.
#[derive(Clone, Default)]
pub struct MemoryBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn writer(&self) -> SharedWriter {
        SharedWriter::new(Box::new(self.clone()))
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedWriter").finish_non_exhaustive()
    }
}
