use std::{
  fs::File,
  io::{self, Read},
  path::{Path, PathBuf},
};

/// A re-openable byte stream with a declared total size.
///
/// Every `open` starts a fresh read from the first byte, so the header and the body
/// of one capture can be consumed as two independent streams.
pub trait ByteSource: Send + Sync {
  fn name(&self) -> &str;

  /// Declared total size in bytes; 0 when unknown.
  fn size(&self) -> u64;

  fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
  path: PathBuf,
  name: String,
  size: u64,
}

impl FileSource {
  pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
    let path = path.as_ref().to_path_buf();
    let size = std::fs::metadata(&path)?.len();
    let name = path
      .file_name()
      .and_then(|s| s.to_str())
      .map(str::to_string)
      .unwrap_or_else(|| path.to_string_lossy().to_string());
    Ok(Self { path, name, size })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl ByteSource for FileSource {
  fn name(&self) -> &str {
    &self.name
  }

  fn size(&self) -> u64 {
    self.size
  }

  fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
    Ok(Box::new(File::open(&self.path)?))
  }
}

/// In-memory capture. `max_read` caps how many bytes a single read returns, which lets
/// callers force chunk boundaries at arbitrary positions.
#[derive(Debug, Clone)]
pub struct MemorySource {
  name: String,
  bytes: Vec<u8>,
  max_read: Option<usize>,
}

impl MemorySource {
  pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      bytes: bytes.into(),
      max_read: None,
    }
  }

  pub fn with_max_read(mut self, max_read: usize) -> Self {
    self.max_read = Some(max_read.max(1));
    self
  }
}

impl ByteSource for MemorySource {
  fn name(&self) -> &str {
    &self.name
  }

  fn size(&self) -> u64 {
    self.bytes.len() as u64
  }

  fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
    Ok(Box::new(CappedReader {
      data: &self.bytes,
      max_read: self.max_read.unwrap_or(usize::MAX),
    }))
  }
}

struct CappedReader<'a> {
  data: &'a [u8],
  max_read: usize,
}

impl Read for CappedReader<'_> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let n = buf.len().min(self.max_read).min(self.data.len());
    buf[..n].copy_from_slice(&self.data[..n]);
    self.data = &self.data[n..];
    Ok(n)
  }
}

/// Reads one chunk, retrying on `Interrupted`.
pub(crate) fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
  loop {
    match reader.read(buf) {
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      other => return other,
    }
  }
}
