//! Data sources: the seek/consume/store contract the engine reads through.
//!
//! A source is shared by every node of a tree through a [SourceRef]. Nodes
//! seek it before every read or write, so a single logical cursor per source
//! is assumed.

use std::{
    cell::RefCell,
    fmt,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    rc::Rc,
};

use crate::errors::SourceError;

/// Backing store of a parse.
pub trait Source: fmt::Debug {
    /// Positions the cursor.
    fn seek(&mut self, offset: u64);

    /// Reads up to `n` bytes at the cursor and advances it.
    ///
    /// Fewer than `n` bytes are returned only at end of data.
    fn consume(&mut self, n: usize) -> Vec<u8>;

    /// Writes `data` at the cursor and advances it.
    fn store(&mut self, data: &[u8]) -> Result<(), SourceError>;
}

/// Shared handle to a source.
pub type SourceRef = Rc<RefCell<dyn Source>>;

/// Wraps a source into a [SourceRef].
pub fn shared(source: impl Source + 'static) -> SourceRef {
    Rc::new(RefCell::new(source))
}

/// Zero-filled scratch space.
///
/// Bytes that were never written read as zero. Reads never run short unless
/// the space was given a limit, past which it behaves like end of data.
#[derive(Debug, Clone, Default)]
pub struct ScratchSource {
    data: Vec<u8>,
    cursor: u64,
    limit: Option<u64>,
}

impl ScratchSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch space that ends at offset `end`.
    pub fn bounded(end: u64) -> Self {
        ScratchSource {
            limit: Some(end),
            ..Self::default()
        }
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn shared(self) -> SourceRef {
        shared(self)
    }
}

impl Source for ScratchSource {
    fn seek(&mut self, offset: u64) {
        self.cursor = offset;
    }

    fn consume(&mut self, n: usize) -> Vec<u8> {
        let n = match self.limit {
            Some(limit) => {
                let left = limit.saturating_sub(self.cursor);
                n.min(usize::try_from(left).unwrap_or(usize::MAX))
            }
            None => n,
        };
        let start = usize::try_from(self.cursor).unwrap_or(usize::MAX);
        let mut out = vec![0u8; n];
        if start < self.data.len() {
            let end = self.data.len().min(start.saturating_add(n));
            out[..end - start].copy_from_slice(&self.data[start..end]);
        }
        self.cursor = self.cursor.saturating_add(n as u64);
        out
    }

    fn store(&mut self, data: &[u8]) -> Result<(), SourceError> {
        let capacity = self.limit.unwrap_or(usize::MAX as u64);
        let out_of_bounds = || SourceError::OutOfBounds {
            offset: self.cursor,
            len: data.len(),
            capacity,
        };
        let start = usize::try_from(self.cursor).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_bounds)?;
        if end as u64 > capacity {
            return Err(out_of_bounds());
        }
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        self.cursor = self.cursor.saturating_add(data.len() as u64);
        Ok(())
    }
}

/// A fixed run of bytes, optionally placed at a base offset.
///
/// Offsets below the base or past the end read as end of data; writes must
/// stay inside the buffer.
#[derive(Debug, Clone, Default)]
pub struct BytesSource {
    data: Vec<u8>,
    base: u64,
    cursor: u64,
}

impl BytesSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::at(0, data)
    }

    /// Places `data` so that its first byte lives at offset `base`.
    pub fn at(base: u64, data: impl Into<Vec<u8>>) -> Self {
        BytesSource {
            data: data.into(),
            base,
            cursor: base,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn shared(self) -> SourceRef {
        shared(self)
    }

    fn index(&self) -> Option<usize> {
        let rel = self.cursor.checked_sub(self.base)?;
        usize::try_from(rel).ok()
    }
}

impl Source for BytesSource {
    fn seek(&mut self, offset: u64) {
        self.cursor = offset;
    }

    fn consume(&mut self, n: usize) -> Vec<u8> {
        let out = match self.index() {
            Some(start) if start < self.data.len() => {
                let end = self.data.len().min(start.saturating_add(n));
                self.data[start..end].to_vec()
            }
            _ => Vec::new(),
        };
        self.cursor = self.cursor.saturating_add(out.len() as u64);
        out
    }

    fn store(&mut self, data: &[u8]) -> Result<(), SourceError> {
        let out_of_bounds = || SourceError::OutOfBounds {
            offset: self.cursor,
            len: data.len(),
            capacity: self.data.len() as u64,
        };
        let start = self.index().ok_or_else(out_of_bounds)?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_bounds)?;
        if end > self.data.len() {
            return Err(out_of_bounds());
        }

        self.data[start..end].copy_from_slice(data);
        self.cursor = self.cursor.saturating_add(data.len() as u64);
        Ok(())
    }
}

/// A whole file as a source.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    writable: bool,
    cursor: u64,
}

impl FileSource {
    /// Opens `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileSource {
            file: File::open(path)?,
            writable: false,
            cursor: 0,
        })
    }

    /// Opens `path` for reading and writing.
    pub fn open_rw(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileSource {
            file,
            writable: true,
            cursor: 0,
        })
    }

    pub fn shared(self) -> SourceRef {
        shared(self)
    }

    fn read_at(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(self.cursor))?;
        let mut out = Vec::with_capacity(n);
        (&mut self.file).take(n as u64).read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Source for FileSource {
    fn seek(&mut self, offset: u64) {
        self.cursor = offset;
    }

    fn consume(&mut self, n: usize) -> Vec<u8> {
        let out = match self.read_at(n) {
            Ok(out) => out,
            Err(error) => {
                tracing::warn!(offset = self.cursor, %error, "file read failed, treating as end of data");
                Vec::new()
            }
        };
        self.cursor = self.cursor.saturating_add(out.len() as u64);
        out
    }

    fn store(&mut self, data: &[u8]) -> Result<(), SourceError> {
        if !self.writable {
            return Err(SourceError::ReadOnly);
        }
        self.file.seek(SeekFrom::Start(self.cursor))?;
        self.file.write_all(data)?;
        self.cursor = self.cursor.saturating_add(data.len() as u64);
        Ok(())
    }
}
