//! Package chunk source.
//!
//! Wraps a seekable byte source and slices it into the fixed-size chunks
//! streamed to the peer. The bytes are opaque; nothing here inspects the
//! package format.

use crate::error::{Error, Result};
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of every chunk except possibly the last.
pub const CHUNK_SIZE: usize = 256;

/// Wire alignment the final chunk is padded to.
pub const CHUNK_ALIGN: usize = 4;

/// Anything a package can be streamed from.
pub trait PackageRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> PackageRead for T {}

/// One chunk read from the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the first byte in the package.
    pub start: u64,
    /// Chunk bytes, zero-padded to a multiple of [`CHUNK_ALIGN`] if short.
    pub data: Vec<u8>,
    /// Number of bytes actually read, excluding padding.
    pub read_len: usize,
}

/// Seekable package with position tracking.
pub struct PackageSource {
    reader: Box<dyn PackageRead>,
    size: u32,
    position: u64,
    last_chunk_start: Option<u64>,
}

impl std::fmt::Debug for PackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageSource")
            .field("size", &self.size)
            .field("position", &self.position)
            .field("last_chunk_start", &self.last_chunk_start)
            .finish_non_exhaustive()
    }
}

impl PackageSource {
    /// Open a package file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("Opened package {}", path.display());
        Self::from_reader(BufReader::new(file))
    }

    /// Wrap an already open source, measuring its size.
    pub fn from_reader<R: PackageRead + 'static>(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let size = u32::try_from(len).map_err(|_| Error::PackageTooLarge(len))?;
        reader.seek(SeekFrom::Start(0))?;

        Ok(Self {
            reader: Box::new(reader),
            size,
            position: 0,
            last_chunk_start: None,
        })
    }

    /// Total package size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether every byte has been read.
    pub fn is_exhausted(&self) -> bool {
        self.position >= u64::from(self.size)
    }

    /// Restart from offset 0.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek_to(0)?;
        self.last_chunk_start = None;
        Ok(())
    }

    /// Move back to the start of the most recently read chunk.
    ///
    /// Returns `false` if no chunk has been read since the last rewind.
    pub fn rewind_last_chunk(&mut self) -> Result<bool> {
        match self.last_chunk_start {
            Some(start) => {
                self.seek_to(start)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Read the next chunk of up to [`CHUNK_SIZE`] bytes.
    ///
    /// A short read at the end of the package is zero-padded to a multiple
    /// of [`CHUNK_ALIGN`]. Full chunks are never padded. A source that ends
    /// before its measured size fails with `UnexpectedEof`.
    pub fn next_chunk(&mut self) -> Result<Chunk> {
        let start = self.position;
        let mut data = vec![0u8; CHUNK_SIZE];
        let mut read_len = 0;

        while read_len < CHUNK_SIZE {
            match self.reader.read(&mut data[read_len..]) {
                Ok(0) => break,
                Ok(n) => read_len += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if read_len == 0 && !self.is_exhausted() {
            return Err(Error::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "package ended at offset {start}, expected {} bytes",
                    self.size
                ),
            )));
        }

        data.truncate(read_len.next_multiple_of(CHUNK_ALIGN));
        self.position = start + read_len as u64;
        self.last_chunk_start = Some(start);

        Ok(Chunk {
            start,
            data,
            read_len,
        })
    }

    /// Fraction of the package delivered once `chunk` has been sent.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self, chunk: &Chunk) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        (chunk.start + chunk.read_len as u64) as f64 / f64::from(self.size)
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn numbered(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_from_reader_measures_size() {
        let source = PackageSource::from_reader(Cursor::new(numbered(1001))).unwrap();
        assert_eq!(source.size(), 1001);
        assert_eq!(source.position(), 0);
        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_chunks_and_final_padding() {
        let bytes = numbered(1001);
        let mut source = PackageSource::from_reader(Cursor::new(bytes.clone())).unwrap();

        for i in 0..3 {
            let chunk = source.next_chunk().unwrap();
            assert_eq!(chunk.data.len(), CHUNK_SIZE);
            assert_eq!(chunk.read_len, CHUNK_SIZE);
            assert_eq!(chunk.data, bytes[i * CHUNK_SIZE..(i + 1) * CHUNK_SIZE]);
        }

        let last = source.next_chunk().unwrap();
        assert_eq!(last.read_len, 233);
        assert_eq!(last.data.len(), 236);
        assert_eq!(&last.data[..233], &bytes[768..]);
        assert_eq!(&last.data[233..], &[0, 0, 0]);
        assert!(source.is_exhausted());
        assert!((source.progress(&last) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aligned_final_chunk_is_not_padded() {
        let mut source = PackageSource::from_reader(Cursor::new(numbered(300))).unwrap();
        source.next_chunk().unwrap();
        let last = source.next_chunk().unwrap();
        assert_eq!(last.read_len, 44);
        assert_eq!(last.data.len(), 44);
    }

    #[test]
    fn test_rewind_last_chunk_rereads_same_bytes() {
        let mut source = PackageSource::from_reader(Cursor::new(numbered(600))).unwrap();
        assert!(!source.rewind_last_chunk().unwrap());

        source.next_chunk().unwrap();
        let second = source.next_chunk().unwrap();
        assert!(source.rewind_last_chunk().unwrap());
        assert_eq!(source.position(), 256);
        assert_eq!(source.next_chunk().unwrap(), second);
    }

    #[test]
    fn test_rewind_restarts() {
        let mut source = PackageSource::from_reader(Cursor::new(numbered(10))).unwrap();
        let first = source.next_chunk().unwrap();
        assert!(source.is_exhausted());
        source.rewind().unwrap();
        assert_eq!(source.position(), 0);
        assert_eq!(source.next_chunk().unwrap(), first);
    }

    /// Seek-only source reporting a fixed length.
    struct FixedLength(u64);

    impl Read for FixedLength {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Seek for FixedLength {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            Ok(match pos {
                SeekFrom::End(_) => self.0,
                _ => 0,
            })
        }
    }

    #[test]
    fn test_rejects_package_over_u32() {
        let too_big = u64::from(u32::MAX) + 1;
        let err = PackageSource::from_reader(FixedLength(too_big)).unwrap_err();
        assert!(matches!(err, Error::PackageTooLarge(n) if n == too_big));

        let source = PackageSource::from_reader(FixedLength(u64::from(u32::MAX))).unwrap();
        assert_eq!(source.size(), u32::MAX);
    }

    #[test]
    fn test_source_ending_early_is_an_error() {
        let mut source = PackageSource::from_reader(FixedLength(10)).unwrap();
        let err = source.next_chunk().unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn test_empty_package_is_exhausted() {
        let mut source = PackageSource::from_reader(Cursor::new(Vec::new())).unwrap();
        assert!(source.is_exhausted());
        let chunk = source.next_chunk().unwrap();
        assert!(chunk.data.is_empty());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let err = PackageSource::open("/nonexistent/package.pkg").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &numbered(513)).unwrap();
        let source = PackageSource::open(file.path()).unwrap();
        assert_eq!(source.size(), 513);
    }
}
