//! Shared decompressing XML reader helper for the `metadata` parsers.
//!
//! Grounded on `dralley-rpmrepo_metadata`'s `RpmMetadata` trait and its
//! `CompressionType` enum: this core only needs gzip (repodata is never
//! shipped any other way in the scope of this crate), so the niffler-style
//! multi-codec sniffing is narrowed to a single `flate2` gzip path, chosen
//! by file extension.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use quick_xml::Reader;

use crate::error::{Result, SackError};

/// Open `path`, transparently inflating it if its name ends in `.gz`, and
/// wrap the result in a streaming [`quick_xml::Reader`].
pub fn open_xml(path: &Path) -> Result<Reader<BufReader<Box<dyn Read>>>> {
    let file = File::open(path).map_err(|e| SackError::io(path, e))?;
    let reader: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut xml = Reader::from_reader(BufReader::new(reader));
    xml.config_mut().trim_text(true);
    Ok(xml)
}

/// Read an attribute's decoded string value by local name, ignoring any
/// XML namespace prefix.
pub fn attr(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let key = a.key.local_name();
        if key.as_ref() == name.as_bytes() {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Parse the `rpm:entry` `flags="LT|GT|EQ|..."` attribute into [`CmpFlags`](crate::reldep::CmpFlags).
pub fn flags_from_str(s: &str) -> crate::reldep::CmpFlags {
    use crate::reldep::CmpFlags;
    match s {
        "EQ" => CmpFlags::EQ,
        "LT" => CmpFlags::LT,
        "GT" => CmpFlags::GT,
        "LE" => CmpFlags::LT | CmpFlags::EQ,
        "GE" => CmpFlags::GT | CmpFlags::EQ,
        "NE" => CmpFlags::NEQ,
        _ => CmpFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reldep::CmpFlags;

    #[test]
    fn flags_from_str_maps_ge() {
        assert_eq!(flags_from_str("GE"), CmpFlags::GT | CmpFlags::EQ);
    }

    #[test]
    fn flags_from_str_unknown_is_empty() {
        assert_eq!(flags_from_str("bogus"), CmpFlags::empty());
    }
}
