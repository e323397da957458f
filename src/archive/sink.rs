//! Archive output sinks.
//!
//! The assembler writes through the [`ArchiveSink`] trait so tests can
//! capture entries in memory while the CLI streams a real ZIP to disk.

use std::io::{self, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Destination for finished archive entries. Paths use `/` separators.
pub trait ArchiveSink {
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Flush and close the archive. Further writes fail.
    fn finalize(&mut self) -> io::Result<()>;
}

/// Streams entries into a ZIP archive.
///
/// Entry timestamps are pinned to the epoch of the ZIP format so the same
/// input always produces byte-identical output.
pub struct ZipSink<W: Write + Seek> {
    writer: Option<ZipWriter<W>>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> ZipSink<W> {
    pub fn new(inner: W, compression_level: Option<i64>) -> Self {
        let fixed = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).unwrap_or_default();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(compression_level)
            .last_modified_time(fixed);
        Self {
            writer: Some(ZipWriter::new(inner)),
            options,
        }
    }
}

impl<W: Write + Seek> ArchiveSink for ZipSink<W> {
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("archive already finalized"))?;
        writer
            .start_file(path, self.options)
            .map_err(io::Error::other)?;
        writer.write_all(bytes)
    }

    fn finalize(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish().map_err(io::Error::other)?;
        }
        Ok(())
    }
}

/// Collects entries in memory, in write order. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<(String, Vec<u8>)>,
    pub finalized: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by its full path.
    pub fn entry(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl ArchiveSink for MemorySink {
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()> {
        if self.finalized {
            return Err(io::Error::other("archive already finalized"));
        }
        self.entries.push((path.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.finalized = true;
        Ok(())
    }
}
