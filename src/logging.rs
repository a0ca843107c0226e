//! Log setup with secret redaction.
//!
//! Every line written by the fmt layer passes through [`RedactionPatterns`],
//! so a bot token that leaks into an error message (teloxide includes the
//! request URL in some of them) never reaches the log sink.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    token_in_url: Regex,
    raw_token: Regex,
    bot_prefixed_token: Regex,
    cookie_header: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_in_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            raw_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            bot_prefixed_token: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            cookie_header: Regex::new(r"(?i)(cookie:\s*)[^\r\n]+")?,
        })
    }

    /// Mask every secret found in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let mut output = self
            .token_in_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .raw_token
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .bot_prefixed_token
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .cookie_header
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may be shorter or longer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`),
/// fmt layer on stderr behind the redacting writer.
pub fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}
