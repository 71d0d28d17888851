use ntpstamp::NtpResult;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Append-only record of exchange results, one `delay_us offset_us` line each
pub struct ResultSink<W: Write> {
    out: W,
}

impl ResultSink<File> {
    /// Open `path` for appending, creating it if needed
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self::new(file))
    }
}

impl<W: Write> ResultSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn record(&mut self, result: &NtpResult) -> io::Result<()> {
        writeln!(self.out, "{} {}", result.roundtrip(), result.offset())?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
