//! Utility functions for file handling and common operations

use crate::{SvgenoError, SvgenoResult};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Check if a file is gzip compressed
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> SvgenoResult<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0; 2];

    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(SvgenoError::Io(e)),
    }
}

/// Open a plain or gzip compressed text file for reading
pub fn open_reader<P: AsRef<Path>>(path: P) -> SvgenoResult<Box<dyn BufRead>> {
    let file = File::open(&path)
        .map_err(|_| SvgenoError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

/// Plain or gzip compressed output file.
///
/// Call [`OutputWriter::finish`] once writing is done; dropping the writer
/// instead discards any error from the final flush or the gzip trailer.
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    /// Write the gzip trailer if any and flush everything to disk
    pub fn finish(self) -> SvgenoResult<()> {
        match self {
            OutputWriter::Plain(mut writer) => writer.flush()?,
            OutputWriter::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputWriter::Plain(writer) => writer.write(buf),
            OutputWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputWriter::Plain(writer) => writer.flush(),
            OutputWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Create an output file, gzip compressed when the path ends in `.gz`
pub fn create_writer<P: AsRef<Path>>(path: P) -> SvgenoResult<OutputWriter> {
    let file = File::create(&path)?;

    let writer = if has_extension(&path, "gz") {
        OutputWriter::Gzip(GzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        OutputWriter::Plain(BufWriter::new(file))
    };

    Ok(writer)
}

/// Get the number of CPU cores, with a fallback default
pub fn get_num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Validate file paths and check if they exist
pub fn validate_file_exists<P: AsRef<Path>>(path: P) -> SvgenoResult<()> {
    if !path.as_ref().exists() {
        return Err(SvgenoError::FileNotFound(
            path.as_ref().to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Validate that a file is readable
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> SvgenoResult<()> {
    validate_file_exists(&path)?;

    File::open(&path)
        .map_err(|_| SvgenoError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    Ok(())
}

/// Check if a path has a specific extension
pub fn has_extension<P: AsRef<Path>>(path: P, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Format a file size in bytes to a human-readable string
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Create parent directories if they don't exist
pub fn ensure_parent_dirs<P: AsRef<Path>>(path: P) -> SvgenoResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Timer utility for measuring execution time
pub struct Timer {
    start: std::time::Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::info!("Starting timer: {}", name);
        Timer {
            start: std::time::Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn log_elapsed(&self) {
        log::info!("Timer '{}' elapsed: {:.2?}", self.name, self.elapsed());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.log_elapsed();
    }
}
