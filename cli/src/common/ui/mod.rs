//! # Blade Console Output (`common::ui`)
//!
//! File: cli/src/common/ui/mod.rs
//!
//! ## Overview
//!
//! User-facing output for Blade. A `Console` owns an output sink and an error
//! sink, each behind its own mutex, and is cheap to clone. During
//! `deploy --watch` the file-watch thread and the continuous-build thread
//! both print through clones of the same `Console`; each call writes one
//! whole line under the lock, so lines from different threads never tear.
//!
//! Logging (`tracing`) goes to stderr separately and is meant for
//! diagnostics. The `Console` is for what the user asked to see.
//!
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Shared output and error streams for one command invocation.
#[derive(Clone)]
pub struct Console {
    out: Sink,
    err: Sink,
}

impl Console {
    /// A console writing to the process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    /// Writes one line to the output sink.
    pub fn println(&self, message: impl Display) {
        write_line(&self.out, &message.to_string());
    }

    /// Writes one line to the error sink, prefixed with the command name.
    pub fn error(&self, command: &str, message: impl Display) {
        write_line(&self.err, &format!("{}: {}", command, message));
    }

    /// Writes one line to the error sink as-is.
    pub fn eprintln(&self, message: impl Display) {
        write_line(&self.err, &message.to_string());
    }
}

fn write_line(sink: &Sink, line: &str) {
    // Tolerate a poisoned lock.
    let mut guard = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Best-effort; write errors are ignored.
    let _ = writeln!(guard, "{}", line);
    let _ = guard.flush();
}

/// An in-memory sink whose contents can be read back, for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl CaptureBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builds a console whose output and error streams are captured.
#[cfg(test)]
pub fn capture_console() -> (Console, CaptureBuffer, CaptureBuffer) {
    let out = CaptureBuffer::default();
    let err = CaptureBuffer::default();
    let console = Console::new(Box::new(out.clone()), Box::new(err.clone()));
    (console, out, err)
}
