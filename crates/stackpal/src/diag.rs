//! Diagnostic sink for engine debug output.
//!
//! The engine prints through a format-string interface; the sink renders the
//! arguments and writes them straight to a fixed stream. Output is not
//! buffered or structured, and write errors are dropped.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Where a configured sink writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagTarget {
    #[default]
    Stdout,
    Stderr,
    /// Forward each message as a `tracing` event at `DEBUG`.
    Tracing,
}

impl fmt::Display for DiagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Tracing => "tracing",
        })
    }
}

/// Best-effort writer for engine diagnostics.
pub enum DiagnosticSink {
    Stdout,
    Stderr,
    Tracing,
    Writer(Mutex<Box<dyn Write + Send>>),
}

impl DiagnosticSink {
    pub fn new(target: DiagTarget) -> Self {
        match target {
            DiagTarget::Stdout => Self::Stdout,
            DiagTarget::Stderr => Self::Stderr,
            DiagTarget::Tracing => Self::Tracing,
        }
    }

    pub fn stdout() -> Self {
        Self::Stdout
    }

    /// A sink writing into an arbitrary stream.
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Mutex::new(Box::new(writer)))
    }

    /// Renders `args` and writes the result. Never fails.
    pub fn diagnostic(&self, args: fmt::Arguments<'_>) {
        match self {
            Self::Stdout => write_through(&mut io::stdout().lock(), args),
            Self::Stderr => write_through(&mut io::stderr().lock(), args),
            Self::Tracing => {
                tracing::debug!(target: "stackpal::diag", "{}", args);
            }
            Self::Writer(writer) => write_through(
                &mut *writer.lock().unwrap_or_else(PoisonError::into_inner),
                args,
            ),
        }
    }
}

/// Writes and flushes, so partial lines reach the stream immediately.
fn write_through(out: &mut impl Write, args: fmt::Arguments<'_>) {
    let _ = out.write_fmt(args);
    let _ = out.flush();
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("DiagnosticSink::Stdout"),
            Self::Stderr => f.write_str("DiagnosticSink::Stderr"),
            Self::Tracing => f.write_str("DiagnosticSink::Tracing"),
            Self::Writer(_) => f.write_str("DiagnosticSink::Writer(..)"),
        }
    }
}

/// Writes a formatted diagnostic through anything with a
/// `diagnostic(fmt::Arguments)` method: a [`DiagnosticSink`] or a `Platform`.
///
/// ```
/// use stackpal::{DiagnosticSink, platform_diag};
///
/// let sink = DiagnosticSink::stdout();
/// platform_diag!(sink, "tcp: {} segments queued\n", 3);
/// ```
#[macro_export]
macro_rules! platform_diag {
    ($sink:expr, $($arg:tt)*) => {
        $sink.diagnostic(::core::format_args!($($arg)*))
    };
}
