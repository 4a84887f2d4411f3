//! File references and the byte sources behind them.
//!
//! Remote references are downloaded to a temporary file first so every
//! source is seekable and has a known length before registration. The
//! temporary file is removed when the source is dropped.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use tempfile::{NamedTempFile, TempPath};
use url::Url;

use crate::error::{Error, Result};

/// Random-access bytes with a known length.
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Display name, usually the file name.
    fn name(&self) -> &str;
}

pub struct FileSource {
    file: Mutex<File>,
    len: u64,
    name: String,
    _temp: Option<TempPath>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Source(format!("file not found: {}", path.display())),
            _ => Error::Source(format!("open {}: {e}", path.display())),
        })?;
        let metadata = file
            .metadata()
            .map_err(|e| Error::Source(format!("stat {}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(Error::Source(format!("not a regular file: {}", path.display())));
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            file: Mutex::new(file),
            len: metadata.len(),
            name,
            _temp: None,
        })
    }

    fn from_temp(temp: TempPath, name: String) -> Result<Self> {
        let mut source = Self::open(&temp)?;
        source.name = name;
        source._temp = Some(temp);
        Ok(source)
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).filter(|end| *end <= self.len).ok_or_else(|| {
            Error::Source(format!(
                "range {offset}+{len} is outside {} ({} bytes)",
                self.name, self.len
            ))
        })?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::Source(format!("seek {} to {offset}: {e}", self.name)))?;
        let mut buf = vec![0u8; (end - offset) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| Error::Source(format!("read {} at {offset}: {e}", self.name)))?;
        Ok(buf)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory bytes, for tests and generated content.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).ok();
        let end = offset.checked_add(len).and_then(|end| usize::try_from(end).ok());
        match (start, end) {
            (Some(start), Some(end)) if end <= self.bytes.len() => {
                Ok(self.bytes[start..end].to_vec())
            }
            _ => Err(Error::Source(format!(
                "range {offset}+{len} is outside {} ({} bytes)",
                self.name,
                self.bytes.len()
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A parsed `--file` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// Plain path, `@path` or `file://path`.
    Local(PathBuf),
    Http(String),
    /// Read through the bucket's virtual-hosted HTTPS endpoint. Objects must
    /// be public or carry their own authorization.
    S3 { bucket: String, key: String },
}

impl FileRef {
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(rest) = value.strip_prefix("s3://") {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(FileRef::S3 {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                _ => Err(Error::Source(format!("expected s3://bucket/key, got {value}"))),
            };
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(FileRef::Http(value.to_string()));
        }
        let path = value
            .strip_prefix('@')
            .or_else(|| value.strip_prefix("file://"))
            .unwrap_or(value);
        if path.is_empty() {
            return Err(Error::Source("empty file reference".to_string()));
        }
        Ok(FileRef::Local(PathBuf::from(path)))
    }

    /// URL a remote reference is downloaded from.
    pub fn download_url(&self) -> Result<Option<Url>> {
        match self {
            FileRef::Local(_) => Ok(None),
            FileRef::Http(url) => Url::parse(url)
                .map(Some)
                .map_err(|e| Error::Source(format!("invalid URL {url}: {e}"))),
            FileRef::S3 { bucket, key } => {
                Url::parse(&format!("https://{bucket}.s3.amazonaws.com/"))
                    .and_then(|base| base.join(key))
                    .map(Some)
                    .map_err(|e| {
                        Error::Source(format!("invalid S3 location s3://{bucket}/{key}: {e}"))
                    })
            }
        }
    }
}

/// Open the byte source behind a file reference.
pub fn resolve(reference: &str, timeout: Option<Duration>) -> Result<Box<dyn ByteSource>> {
    let parsed = FileRef::parse(reference)?;
    let source = match (&parsed, parsed.download_url()?) {
        (FileRef::Local(path), _) => FileSource::open(path)?,
        (_, Some(url)) => download(&url, timeout)?,
        (_, None) => return Err(Error::Source(format!("cannot resolve {reference}"))),
    };
    if source.is_empty() {
        return Err(Error::Source(format!("{reference} is empty")));
    }
    Ok(Box::new(source))
}

fn download(url: &Url, timeout: Option<Duration>) -> Result<FileSource> {
    debug!("downloading {url}");
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build()
        .new_agent();
    let mut response = agent
        .get(url.as_str())
        .call()
        .map_err(|e| Error::Source(format!("download {url}: {e}")))?;
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(Error::Source(format!("download {url}: HTTP {status}")));
    }

    let mut file =
        NamedTempFile::new().map_err(|e| Error::Source(format!("create temp file: {e}")))?;
    let copied = io::copy(&mut response.body_mut().as_reader(), &mut file)
        .map_err(|e| Error::Source(format!("download {url}: {e}")))?;
    debug!("downloaded {copied} bytes from {url}");

    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string();
    FileSource::from_temp(file.into_temp_path(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_recognizes_every_form() {
        let local = |path: &str| FileRef::Local(PathBuf::from(path));
        assert_eq!(FileRef::parse("clip.mp4").unwrap(), local("clip.mp4"));
        assert_eq!(FileRef::parse("@/tmp/a.png").unwrap(), local("/tmp/a.png"));
        assert_eq!(FileRef::parse("file:///tmp/a.png").unwrap(), local("/tmp/a.png"));
        assert_eq!(
            FileRef::parse("https://cdn.example.com/a.png").unwrap(),
            FileRef::Http("https://cdn.example.com/a.png".to_string())
        );
        assert_eq!(
            FileRef::parse("s3://media/ads/spring clip.mp4").unwrap(),
            FileRef::S3 {
                bucket: "media".to_string(),
                key: "ads/spring clip.mp4".to_string()
            }
        );
        assert!(FileRef::parse("s3://bucket-only").is_err());
        assert!(FileRef::parse("@").is_err());
    }

    #[test]
    fn s3_references_map_to_virtual_hosted_urls() {
        let url = FileRef::parse("s3://media/ads/spring clip.mp4")
            .unwrap()
            .download_url()
            .unwrap()
            .unwrap();
        assert_eq!(url.as_str(), "https://media.s3.amazonaws.com/ads/spring%20clip.mp4");
    }

    #[test]
    fn file_source_reads_ranges() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 10);
        assert_eq!(source.read_range(3, 4).unwrap(), b"3456");
        assert_eq!(source.read_range(8, 2).unwrap(), b"89");
        assert!(source.read_range(8, 3).is_err());
    }

    #[test]
    fn missing_and_empty_files_are_source_errors() {
        let err = resolve("/definitely/not/here.mp4", None).err().unwrap();
        assert!(err.to_string().contains("file not found"), "{err}");

        let empty = NamedTempFile::new().unwrap();
        let err = resolve(&format!("@{}", empty.path().display()), None).err().unwrap();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn memory_source_bounds_are_checked() {
        let source = MemorySource::new("mem", vec![1u8, 2, 3]);
        assert_eq!(source.read_range(1, 2).unwrap(), vec![2, 3]);
        assert!(source.read_range(2, 2).is_err());
    }
}
