use std::io::BufRead;

use crate::error::{Error, Result};
use crate::types::{Key, SeqNum};

/// Width of every offset line in the header. Offsets are written
/// left-justified and space padded so the header length never depends on
/// the offset values.
pub const OFFSET_WIDTH: usize = 10;

/// Location of the optional bloom filter section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomHandle {
    /// Distinct keys the filter was built over.
    pub elements: u64,
    /// Byte offset of the bit line.
    pub offset: u64,
}

/// The header sits at the start of every sorted run file.
/// It tells the reader where each section starts.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ entries + tombstones count           │  line 1
/// │ tombstone count                      │  line 2
/// │ min key                              │  line 3
/// │ max key                              │  line 4
/// │ first sequence                       │  line 5
/// │ entry section offset      (10 chars) │  line 6
/// │ tombstone section offset  (10 chars) │  line 7
/// │ key index offset          (10 chars) │  line 8
/// │ [bloom element count      (10 chars)]│  line 9
/// │ [bloom offset             (10 chars)]│  line 10
/// └──────────────────────────────────────┘
/// ```
///
/// The bloom pair is present iff the entry section does not start right
/// after line 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub record_count: u64,
    pub tombstone_count: u64,
    pub min_key: Key,
    pub max_key: Key,
    pub sequence_start: SeqNum,
    pub entry_offset: u64,
    pub tombstone_offset: u64,
    pub index_offset: u64,
    pub bloom: Option<BloomHandle>,
}

impl Header {
    /// Number of point entries (records minus range tombstones).
    pub fn entry_count(&self) -> u64 {
        self.record_count - self.tombstone_count
    }

    /// Encode the header. Fails if an offset does not fit its field.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        for scalar in [
            self.record_count.to_string(),
            self.tombstone_count.to_string(),
            self.min_key.to_string(),
            self.max_key.to_string(),
            self.sequence_start.to_string(),
        ] {
            out.push_str(&scalar);
            out.push('\n');
        }
        let mut fixed = vec![self.entry_offset, self.tombstone_offset, self.index_offset];
        if let Some(bloom) = self.bloom {
            fixed.push(bloom.elements);
            fixed.push(bloom.offset);
        }
        for value in fixed {
            let field = format!("{:<width$}", value, width = OFFSET_WIDTH);
            if field.len() > OFFSET_WIDTH {
                return Err(Error::Corruption(format!(
                    "offset {value} does not fit in {OFFSET_WIDTH} characters"
                )));
            }
            out.push_str(&field);
            out.push('\n');
        }
        Ok(out)
    }

    /// Decode the header from the start of a run file.
    ///
    /// Returns the header and the number of bytes it occupies, which always
    /// equals `entry_offset`.
    pub fn decode<R: BufRead>(reader: &mut R) -> Result<(Self, u64)> {
        let mut consumed = 0u64;
        let mut line = String::new();
        let mut next_line = |reader: &mut R, consumed: &mut u64| -> Result<String> {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 || !line.ends_with('\n') {
                return Err(Error::Corruption("run header truncated".into()));
            }
            *consumed += n as u64;
            Ok(line.trim_end().to_string())
        };

        let record_count = parse(&next_line(reader, &mut consumed)?)?;
        let tombstone_count = parse(&next_line(reader, &mut consumed)?)?;
        let min_key = parse(&next_line(reader, &mut consumed)?)?;
        let max_key = parse(&next_line(reader, &mut consumed)?)?;
        let sequence_start = parse(&next_line(reader, &mut consumed)?)?;
        let entry_offset = parse(&next_line(reader, &mut consumed)?)?;
        let tombstone_offset = parse(&next_line(reader, &mut consumed)?)?;
        let index_offset = parse(&next_line(reader, &mut consumed)?)?;

        let bloom = if consumed < entry_offset {
            let elements = parse(&next_line(reader, &mut consumed)?)?;
            let offset = parse(&next_line(reader, &mut consumed)?)?;
            Some(BloomHandle { elements, offset })
        } else {
            None
        };

        if consumed != entry_offset {
            return Err(Error::Corruption(format!(
                "entry section at {entry_offset} but header ends at {consumed}"
            )));
        }
        if tombstone_count > record_count
            || tombstone_offset < entry_offset
            || index_offset < tombstone_offset
        {
            return Err(Error::Corruption("run header offsets out of order".into()));
        }

        let header = Header {
            record_count,
            tombstone_count,
            min_key,
            max_key,
            sequence_start,
            entry_offset,
            tombstone_offset,
            index_offset,
            bloom,
        };
        Ok((header, consumed))
    }
}

fn parse<T: std::str::FromStr>(field: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::malformed("header", field))
}

/// An entry in the run's key index.
/// Maps a key to the byte offset of its newest version's entry line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Key,
    pub offset: u64,
}

impl IndexEntry {
    /// Encode this index entry as `"<key> <offset>\n"`.
    pub fn encode(&self, out: &mut String) {
        out.push_str(&self.key.to_string());
        out.push(' ');
        out.push_str(&self.offset.to_string());
        out.push('\n');
    }

    /// Decode an index entry from one line.
    pub fn decode(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(offset), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(Error::malformed("key index", line));
        };
        let key = key.parse().map_err(|_| Error::malformed("key index", line))?;
        let offset = offset
            .parse()
            .map_err(|_| Error::malformed("key index", line))?;
        Ok(IndexEntry { key, offset })
    }
}
