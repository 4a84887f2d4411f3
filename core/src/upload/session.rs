//! Upload sessions built from the register response.

use log::warn;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::params::Urn;

use super::{MediaKind, UploadOptions};

/// Half-open byte range `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    pub index: usize,
    pub range: ByteRange,
    pub url: String,
    pub etag: Option<String>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub kind: MediaKind,
    pub owner: Urn,
    pub size: u64,
    pub asset: String,
    pub upload_token: String,
    /// Ordered by index, which is also byte order.
    pub chunks: Vec<UploadChunk>,
    pub completed: bool,
}

/// Split `size` bytes into upload ranges: one range below `threshold`,
/// otherwise `ceil(size / chunk_size)` contiguous ranges with only the last
/// one shorter.
pub fn plan_chunks(size: u64, threshold: u64, chunk_size: u64) -> Vec<ByteRange> {
    if size < threshold || chunk_size == 0 {
        return vec![ByteRange { offset: 0, len: size }];
    }
    let mut ranges = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut offset = 0;
    while offset < size {
        let len = chunk_size.min(size - offset);
        ranges.push(ByteRange { offset, len });
        offset += len;
    }
    ranges
}

/// Check that `ranges`, in order, cover `[0, size)` without gaps or overlap.
pub fn validate_ranges(ranges: &[ByteRange], size: u64) -> Result<()> {
    let mut expected = 0;
    for (index, range) in ranges.iter().enumerate() {
        if range.len == 0 {
            return Err(Error::Response(format!("upload range {index} is empty")));
        }
        if range.offset != expected {
            let problem = if range.offset < expected { "overlaps" } else { "leaves a gap before" };
            return Err(Error::Response(format!(
                "upload range {index} starting at byte {} {problem} byte {expected}",
                range.offset
            )));
        }
        expected = range.end();
    }
    if expected != size {
        return Err(Error::Response(format!(
            "upload ranges cover {expected} bytes, file has {size}"
        )));
    }
    Ok(())
}

struct Instruction {
    url: String,
    range: Option<ByteRange>,
}

impl UploadSession {
    /// Build a session from an `initializeUpload` response.
    ///
    /// Images always upload in one request. For videos the local plan says
    /// how many URLs to expect; when the server disagrees its instructions
    /// win, as long as their ranges still tile the file.
    pub fn from_register(
        kind: MediaKind,
        owner: Urn,
        size: u64,
        response: &Value,
        options: &UploadOptions,
    ) -> Result<Self> {
        let value = response.get("value").unwrap_or(response);
        let asset = value
            .get(kind.field())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Response(format!("register response lacks value.{}", kind.field()))
            })?
            .to_string();
        let upload_token = value
            .get("uploadToken")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let instructions = parse_instructions(value)?;
        let planned = match kind {
            MediaKind::Image => vec![ByteRange { offset: 0, len: size }],
            MediaKind::Video => plan_chunks(size, options.chunk_threshold, options.chunk_size),
        };
        if planned.len() == 1 && instructions.len() > 1 {
            return Err(Error::Response(format!(
                "expected a single upload URL for {size} bytes, got {}",
                instructions.len()
            )));
        }
        if instructions.len() != planned.len() {
            warn!(
                "server returned {} upload URL(s), planned {}; following the server",
                instructions.len(),
                planned.len()
            );
        }

        let mut pairs = Vec::with_capacity(instructions.len());
        for (index, instruction) in instructions.into_iter().enumerate() {
            let range = match instruction.range {
                Some(range) => range,
                None if index == 0 && planned.len() == 1 => ByteRange { offset: 0, len: size },
                None => planned.get(index).copied().ok_or_else(|| {
                    Error::Response(format!("upload instruction {index} has no byte range"))
                })?,
            };
            pairs.push((range, instruction.url));
        }
        pairs.sort_by_key(|(range, _)| range.offset);
        let ranges: Vec<ByteRange> = pairs.iter().map(|(range, _)| *range).collect();
        validate_ranges(&ranges, size)?;

        let chunks = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (range, url))| UploadChunk {
                index,
                range,
                url,
                etag: None,
                acknowledged: false,
            })
            .collect();
        Ok(Self {
            kind,
            owner,
            size,
            asset,
            upload_token,
            chunks,
            completed: false,
        })
    }

    pub fn is_chunked(&self) -> bool {
        self.chunks.len() > 1
    }

    pub fn acknowledge(&mut self, index: usize, etag: Option<String>) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.etag = etag;
            chunk.acknowledged = true;
        }
    }

    pub fn pending(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.acknowledged).count()
    }

    /// Part ETags in index order, as finalize expects them.
    pub fn part_ids(&self) -> Vec<String> {
        self.chunks.iter().filter_map(|chunk| chunk.etag.clone()).collect()
    }
}

fn parse_instructions(value: &Value) -> Result<Vec<Instruction>> {
    if let Some(list) = value.get("uploadInstructions").and_then(Value::as_array) {
        if list.is_empty() {
            return Err(Error::Response("register response has no upload instructions".to_string()));
        }
        return list
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let url = item
                    .get("uploadUrl")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Response(format!("upload instruction {index} lacks uploadUrl"))
                    })?
                    .to_string();
                let first = item.get("firstByte").and_then(Value::as_u64);
                let last = item.get("lastByte").and_then(Value::as_u64);
                let range = match (first, last) {
                    (Some(first), Some(last)) if last >= first => Some(ByteRange {
                        offset: first,
                        len: last - first + 1,
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(Error::Response(format!(
                            "upload instruction {index} has an invalid byte range"
                        )))
                    }
                };
                Ok(Instruction { url, range })
            })
            .collect();
    }
    let url = value
        .get("uploadUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Response("register response lacks an upload URL".to_string()))?;
    Ok(vec![Instruction {
        url: url.to_string(),
        range: None,
    }])
}
