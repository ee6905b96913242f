//! Append-only writers for run artifacts.
//!
//! A run produces two artifacts sharing one prefix:
//!
//! - the sample stream, one [`SampleRecord`] per line as
//!   `index,begin,end,value` with no header
//! - the metadata side-car, a JSON array describing the surviving metrics
//!
//! Both go through the same [`Compression`] setting. With
//! [`Compression::Snappy`] the bytes are wrapped in the snappy framing format
//! and the file gets a `.sz` suffix; the record format itself does not change.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArtifactIoError, CoalesceError, DataShapeError, Result};
use crate::metric::MetricIndex;

/// Transparent compression applied to run artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain text.
    #[default]
    None,
    /// Snappy framing format.
    Snappy,
}

impl Compression {
    /// File name suffix appended after the artifact's own extension.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Snappy => ".sz",
        }
    }
}

/// One durable, consolidated sample: `value` held from `begin` to `end`
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// The metric this record belongs to.
    pub index: MetricIndex,
    /// First clock reading covered.
    pub begin: i64,
    /// Last clock reading covered.
    pub end: i64,
    /// The value held over the range.
    pub value: f64,
}

impl fmt::Display for SampleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.index, self.begin, self.end, self.value)
    }
}

impl FromStr for SampleRecord {
    type Err = CoalesceError;

    fn from_str(line: &str) -> Result<Self> {
        let malformed = |reason: &str| DataShapeError::MalformedRecord {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = line.trim_end().split(',');
        let (Some(index), Some(begin), Some(end), Some(value), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(malformed("expected 4 comma-separated fields").into());
        };

        Ok(Self {
            index: MetricIndex(index.parse().map_err(|_| malformed("bad index"))?),
            begin: begin.parse().map_err(|_| malformed("bad begin"))?,
            end: end.parse().map_err(|_| malformed("bad end"))?,
            value: value.parse().map_err(|_| malformed("bad value"))?,
        })
    }
}

/// Output handle, optionally compressing.
enum Sink {
    Plain(BufWriter<File>),
    Snappy(snap::write::FrameEncoder<BufWriter<File>>),
}

impl Sink {
    fn create(path: &Path, compression: Compression) -> Result<Self> {
        let file = File::create(path).map_err(|e| ArtifactIoError::Create {
            path: path.to_path_buf(),
            source: e,
        })?;
        let buffered = BufWriter::new(file);
        Ok(match compression {
            Compression::None => Self::Plain(buffered),
            Compression::Snappy => Self::Snappy(snap::write::FrameEncoder::new(buffered)),
        })
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Snappy(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // FrameEncoder::flush emits any buffered frame and flushes the file buffer.
        match self {
            Self::Plain(w) => w.flush(),
            Self::Snappy(w) => w.flush(),
        }
    }
}

/// Append-only writer for a run's sample stream.
pub struct SampleWriter {
    path: PathBuf,
    sink: Sink,
    records: u64,
}

impl SampleWriter {
    /// Creates (truncating) the sample stream at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactIoError::Create`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, compression: Compression) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sink = Sink::create(&path, compression)?;
        Ok(Self {
            path,
            sink,
            records: 0,
        })
    }

    /// Appends one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactIoError::Write`] if the write fails.
    pub fn append(&mut self, record: &SampleRecord) -> Result<()> {
        writeln!(self.sink, "{record}").map_err(|e| ArtifactIoError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        self.records += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Path of the sample stream.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes all buffered data and closes the file.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactIoError::Flush`] if flushing fails.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.sink.flush().map_err(|e| ArtifactIoError::Flush {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(self.path)
    }
}

impl fmt::Debug for SampleWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleWriter")
            .field("path", &self.path)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

/// Serializes `value` as JSON into a new file at `path`.
///
/// # Errors
///
/// Returns [`DataShapeError::MetadataSerialize`] if `value` cannot be
/// represented as JSON, or an [`ArtifactIoError`] if the file cannot be
/// written.
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(
    path: P,
    compression: Compression,
    value: &T,
) -> Result<()> {
    let path = path.as_ref();
    let mut sink = Sink::create(path, compression)?;

    serde_json::to_writer(&mut sink, value).map_err(|e| -> CoalesceError {
        if e.is_io() {
            ArtifactIoError::Write {
                path: path.to_path_buf(),
                source: e.into(),
            }
            .into()
        } else {
            DataShapeError::MetadataSerialize { source: e }.into()
        }
    })?;

    sink.flush().map_err(|e| ArtifactIoError::Flush {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Opens an artifact for reading, undoing `compression`.
///
/// # Errors
///
/// Returns [`ArtifactIoError::Read`] if the file cannot be opened.
pub fn open_artifact<P: AsRef<Path>>(path: P, compression: Compression) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ArtifactIoError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Snappy => Box::new(snap::read::FrameDecoder::new(file)),
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Reads back every record of a sample stream.
///
/// # Errors
///
/// Returns an [`ArtifactIoError`] if the file cannot be read, or
/// [`DataShapeError::MalformedRecord`] for a line that does not parse.
pub fn read_records<P: AsRef<Path>>(path: P, compression: Compression) -> Result<Vec<SampleRecord>> {
    let path = path.as_ref();
    let reader = open_artifact(path, compression)?;

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| ArtifactIoError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        if line.is_empty() {
            continue;
        }
        records.push(line.parse()?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(index: u32, begin: i64, end: i64, value: f64) -> SampleRecord {
        SampleRecord {
            index: MetricIndex(index),
            begin,
            end,
            value,
        }
    }

    #[test]
    fn test_record_line_format() {
        assert_eq!(rec(0, 15001, 16000, 1000.0).to_string(), "0,15001,16000,1000");
        assert_eq!(rec(3, -5, 7, 0.25).to_string(), "3,-5,7,0.25");
    }

    #[test]
    fn test_record_parse() {
        let r: SampleRecord = "2,14001,16000,1100.5\n".parse().unwrap();
        assert_eq!(r, rec(2, 14001, 16000, 1100.5));
    }

    #[test]
    fn test_record_parse_rejects_bad_lines() {
        for line in ["", "1,2,3", "1,2,3,4,5", "x,2,3,4", "1,2,3,abc", "-1,2,3,4"] {
            let err = line.parse::<SampleRecord>().unwrap_err();
            assert!(
                matches!(err, CoalesceError::DataShape(DataShapeError::MalformedRecord { .. })),
                "line {line:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_plain_writer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metric-data-0.csv");

        let mut writer = SampleWriter::create(&path, Compression::None).unwrap();
        writer.append(&rec(0, 1, 1000, 5.0)).unwrap();
        writer.append(&rec(1, 1, 1000, 0.5)).unwrap();
        assert_eq!(writer.records(), 2);
        let finished = writer.finish().unwrap();

        assert_eq!(finished, path);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0,1,1000,5\n1,1,1000,0.5\n");
    }

    #[test]
    fn test_snappy_writer_matches_plain() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.csv");
        let packed = dir.path().join("packed.csv.sz");
        let records: Vec<_> = (0..500).map(|i| rec(i % 7, i64::from(i), i64::from(i) + 9, f64::from(i))).collect();

        for (path, compression) in [(&plain, Compression::None), (&packed, Compression::Snappy)] {
            let mut writer = SampleWriter::create(path, compression).unwrap();
            for r in &records {
                writer.append(r).unwrap();
            }
            writer.finish().unwrap();
        }

        let raw = std::fs::read(&packed).unwrap();
        let mut decoded = String::new();
        snap::read::FrameDecoder::new(raw.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, std::fs::read_to_string(&plain).unwrap());

        assert_eq!(read_records(&packed, Compression::Snappy).unwrap(), records);
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        write_json(&path, Compression::None, &serde_json::json!([{"idx": 0}])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"[{"idx":0}]"#);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let err = SampleWriter::create(dir.path().join("nope/x.csv"), Compression::None).unwrap_err();
        assert!(matches!(err, CoalesceError::ArtifactIo(ArtifactIoError::Create { .. })));
    }

    #[test]
    fn test_compression_suffix_and_serde() {
        assert_eq!(Compression::None.suffix(), "");
        assert_eq!(Compression::Snappy.suffix(), ".sz");
        let c: Compression = serde_json::from_str(r#""snappy""#).unwrap();
        assert_eq!(c, Compression::Snappy);
    }
}
