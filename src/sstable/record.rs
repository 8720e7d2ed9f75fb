use crate::error::{Error, Result};
use crate::types::{Entry, RangeTombstone, ValueType};

/// Append one entry line: `<seq> <0|1> <key> [v1 v2 ...]\n`.
///
/// Flag 1 marks a point tombstone, which never carries values.
pub fn encode_entry(entry: &Entry, out: &mut String) {
    out.push_str(&entry.sequence.to_string());
    out.push(' ');
    out.push(match entry.value_type {
        ValueType::Put => '0',
        ValueType::Delete => '1',
    });
    out.push(' ');
    out.push_str(&entry.key.to_string());
    for item in &entry.value {
        out.push(' ');
        out.push_str(&item.to_string());
    }
    out.push('\n');
}

/// Parse one entry line. The trailing newline is optional.
pub fn decode_entry(line: &str) -> Result<Entry> {
    let bad = || Error::malformed("entry", line);
    let mut fields = line.split_whitespace();

    let sequence = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let value_type = match fields.next().ok_or_else(bad)? {
        "0" => ValueType::Put,
        "1" => ValueType::Delete,
        _ => return Err(bad()),
    };
    let key = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let value = fields
        .map(|f| f.parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| bad())?;

    if value_type == ValueType::Delete && !value.is_empty() {
        return Err(bad());
    }
    Ok(Entry {
        key,
        sequence,
        value_type,
        value,
    })
}

/// Append one range tombstone line: `<seq> <start> <end>\n`.
pub fn encode_tombstone(tombstone: &RangeTombstone, out: &mut String) {
    out.push_str(&tombstone.sequence.to_string());
    out.push(' ');
    out.push_str(&tombstone.start.to_string());
    out.push(' ');
    out.push_str(&tombstone.end.to_string());
    out.push('\n');
}

/// Parse one range tombstone line. Exactly three fields.
pub fn decode_tombstone(line: &str) -> Result<RangeTombstone> {
    let bad = || Error::malformed("range tombstone", line);
    let mut fields = line.split_whitespace();
    let (Some(seq), Some(start), Some(end), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(bad());
    };
    Ok(RangeTombstone {
        sequence: seq.parse().map_err(|_| bad())?,
        start: start.parse().map_err(|_| bad())?,
        end: end.parse().map_err(|_| bad())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_line_layout() {
        let mut out = String::new();
        encode_entry(&Entry::put(-3, vec![5, -1, 7], 12), &mut out);
        encode_entry(&Entry::tombstone(4, 13), &mut out);
        encode_entry(&Entry::put(9, vec![], 14), &mut out);
        assert_eq!(out, "12 0 -3 5 -1 7\n13 1 4\n14 0 9\n");
    }

    #[test]
    fn entry_line_decodes() {
        let entry = decode_entry("12 0 -3 5 -1 7\n").unwrap();
        assert_eq!(entry, Entry::put(-3, vec![5, -1, 7], 12));
        assert_eq!(decode_entry("13 1 4").unwrap(), Entry::tombstone(4, 13));
        assert_eq!(decode_entry("14 0 9").unwrap(), Entry::put(9, vec![], 14));
    }

    #[test]
    fn entry_line_rejects_bad_flag() {
        assert!(decode_entry("1 2 3").is_err());
        assert!(decode_entry("1 x 3").is_err());
    }

    #[test]
    fn entry_line_rejects_tombstone_with_values() {
        assert!(decode_entry("1 1 3 4").is_err());
    }

    #[test]
    fn entry_line_rejects_missing_fields() {
        assert!(decode_entry("").is_err());
        assert!(decode_entry("1 0").is_err());
        assert!(decode_entry("1 0 4 five").is_err());
    }

    #[test]
    fn tombstone_line_roundtrip() {
        let mut out = String::new();
        encode_tombstone(&RangeTombstone::new(-10, 20, 8), &mut out);
        assert_eq!(out, "8 -10 20\n");
        assert_eq!(
            decode_tombstone(&out).unwrap(),
            RangeTombstone::new(-10, 20, 8)
        );
    }

    #[test]
    fn tombstone_line_needs_three_fields() {
        assert!(decode_tombstone("8 1").is_err());
        assert!(decode_tombstone("8 1 2 3").is_err());
        assert!(decode_tombstone("8 a 2").is_err());
    }
}
