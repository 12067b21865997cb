//! Prep and output files.
//!
//! A prep file is an append-only stream of length-prefixed octet streams:
//! one writer (the preprocessing engine), one reader (the matching online
//! engine). The writer flushes after every logical store; the reader
//! validates available data before every draw.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::AstraError;
use super::options::AstraOptions;
use super::stream::OctetStream;
use super::Result;

/// Builds the file path `<dir>/<protocol><suffix>-<name>-P<party>-T<thread>`.
///
/// `party` is the preprocessing party number on the writer side and
/// `my_num + 1` on the online reader side, so each prep party's file is
/// picked up by its online counterpart.
pub fn filename(
    options: &AstraOptions,
    protocol: &str,
    suffix: &str,
    name: &str,
    party: usize,
) -> PathBuf {
    let file = format!(
        "{protocol}{suffix}-{name}-P{party}-T{thread}",
        thread = options.thread_num
    );
    let path = options.prep_dir.join(file);
    if options.verbose_astra {
        tracing::debug!(target: "astra", "prep filename {}", path.display());
    }
    path
}

/// One-writer prep stream; flushes after every store.
#[derive(Debug)]
pub struct PrepWriter {
    file: BufWriter<File>,
}

impl PrepWriter {
    /// Creates (or truncates) the prep file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            AstraError::Config(format!("cannot open prep file {}: {e}", path.display()))
        })?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Appends one length-prefixed stream and flushes.
    pub fn store(&mut self, os: &OctetStream) -> Result<()> {
        os.output(&mut self.file).map_err(|_| AstraError::prep_store())?;
        self.file.flush().map_err(|_| AstraError::prep_store())
    }
}

/// One-reader prep stream.
#[derive(Debug)]
pub struct PrepReader {
    file: BufReader<File>,
}

impl PrepReader {
    /// Opens the prep file at `path` for sequential reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            AstraError::Config(format!("cannot open prep file {}: {e}", path.display()))
        })?;
        Ok(Self {
            file: BufReader::new(file),
        })
    }

    /// Replaces `os` with the next length-prefixed stream.
    pub fn read(&mut self, os: &mut OctetStream) -> Result<()> {
        os.input(&mut self.file).map_err(|_| AstraError::prep_read())
    }
}
