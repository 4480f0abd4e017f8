//! Scans the legacy Berkeley-DB `Packages` file for RPM header blobs and
//! decodes the tags that make up a [`crate::pool::PackageRecord`],
//! without depending on a Berkeley DB implementation.
//!
//! Grounded on general RPM header-format knowledge (the same header
//! encoding used inside an actual `.rpm` package's lead+signature+header
//! region); no crate in the corpus reads rpmdb headers directly, so this
//! module is hand-derived, scoped strictly to tag extraction as §4.1
//! directs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, SackError};
use crate::evr::Evr;
use crate::nevra::Nevra;
use crate::pool::{PackageDeps, PackageFile, PackageRecord};
use crate::reldep::{CmpFlags, Reldep};
use crate::repository::SYSTEM_REPO_NAME;

const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];

// RPM header tag numbers (§4.1).
const TAG_NAME: i32 = 1000;
const TAG_VERSION: i32 = 1001;
const TAG_RELEASE: i32 = 1002;
const TAG_EPOCH: i32 = 1003;
const TAG_SUMMARY: i32 = 1004;
const TAG_DESCRIPTION: i32 = 1005;
const TAG_URL: i32 = 1020;
const TAG_ARCH: i32 = 1022;
const TAG_SOURCERPM: i32 = 1044;
const TAG_PROVIDENAME: i32 = 1047;
const TAG_REQUIREFLAGS: i32 = 1048;
const TAG_REQUIRENAME: i32 = 1049;
const TAG_REQUIREVERSION: i32 = 1050;
const TAG_OBSOLETENAME: i32 = 1090;
const TAG_CONFLICTNAME: i32 = 1054;
const TAG_PROVIDEFLAGS: i32 = 1112;
const TAG_PROVIDEVERSION: i32 = 1113;
const TAG_DIRINDEXES: i32 = 1116;
const TAG_BASENAMES: i32 = 1117;
const TAG_DIRNAMES: i32 = 1118;
const TAG_RECOMMENDNAME: i32 = 5046;
const TAG_SUGGESTNAME: i32 = 5049;
const TAG_SUPPLEMENTNAME: i32 = 5052;
const TAG_ENHANCENAME: i32 = 5055;
// Flags/version siblings of the weak-dependency name tags and
// conflict/obsolete flags/versions share the same +1/+2 offset scheme
// used by requires/provides; hawkey only needs the name lists for these
// beyond requires/provides, so only the name tags are decoded here.

const RPM_STRING: u32 = 6;
const RPM_BIN: u32 = 7;
const RPM_STRING_ARRAY: u32 = 8;
const RPM_I18NSTRING: u32 = 9;
const RPM_INT8: u32 = 2;
const RPM_INT16: u32 = 3;
const RPM_INT32: u32 = 4;
const RPM_INT64: u32 = 5;
const RPM_CHAR: u32 = 1;

/// One decoded header-index entry's payload.
#[derive(Debug, Clone)]
enum TagValue {
    Str(String),
    StrArray(Vec<String>),
    Int32(Vec<i32>),
    Int16(Vec<i32>),
    Int8(Vec<i32>),
}

impl TagValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn as_str_array(&self) -> Option<&[String]> {
        match self {
            TagValue::StrArray(v) => Some(v),
            _ => None,
        }
    }

    fn as_int_array(&self) -> Option<Vec<i64>> {
        match self {
            TagValue::Int32(v) | TagValue::Int16(v) | TagValue::Int8(v) => {
                Some(v.iter().map(|&x| x as i64).collect())
            }
            _ => None,
        }
    }

    fn as_int(&self) -> Option<i64> {
        self.as_int_array().and_then(|v| v.first().copied())
    }
}

/// One decoded RPM header: a tag-number to value map.
struct Header {
    tags: HashMap<i32, TagValue>,
}

impl Header {
    fn get(&self, tag: i32) -> Option<&TagValue> {
        self.tags.get(&tag)
    }
}

/// Scan `path` (the rpmdb `Packages` file) for RPM header blobs and
/// decode each into a [`PackageRecord`].
pub fn scan_packages(path: &Path) -> Result<Vec<PackageRecord>> {
    let data = fs::read(path).map_err(|e| SackError::io(path, e))?;
    let mut records = Vec::new();

    let mut offset = 0;
    while offset + 16 <= data.len() {
        if data[offset..offset + 4] == HEADER_MAGIC {
            match decode_header(&data, offset) {
                Some((header, consumed)) => {
                    if let Some(record) = header_to_record(&header) {
                        records.push(record);
                    }
                    offset += consumed.max(1);
                }
                None => offset += 1,
            }
        } else {
            offset += 1;
        }
    }

    Ok(records)
}

/// Decode one header starting at `offset` (which must point at the
/// 8-byte magic+reserved prefix). Returns the header and the number of
/// bytes consumed, so the scanner can skip past it instead of
/// re-scanning its interior for a magic that happens to recur in data.
fn decode_header(data: &[u8], offset: usize) -> Option<(Header, usize)> {
    // 4 bytes magic, 4 bytes reserved, 4 bytes index count, 4 bytes data length.
    if offset + 16 > data.len() {
        return None;
    }
    let index_count = u32_be(&data[offset + 8..offset + 12])? as usize;
    let data_length = u32_be(&data[offset + 12..offset + 16])? as usize;

    let index_start = offset + 16;
    let index_bytes = index_count.checked_mul(16)?;
    let store_start = index_start.checked_add(index_bytes)?;
    let store_end = store_start.checked_add(data_length)?;
    if store_end > data.len() {
        return None;
    }
    let store = &data[store_start..store_end];

    let mut tags = HashMap::new();
    for i in 0..index_count {
        let entry = &data[index_start + i * 16..index_start + (i + 1) * 16];
        let tag = i32::from_be_bytes(entry[0..4].try_into().ok()?);
        let rpm_type = u32_be(&entry[4..8])?;
        let entry_offset = u32_be(&entry[8..12])? as usize;
        let count = u32_be(&entry[12..16])? as usize;
        if let Some(value) = decode_value(store, rpm_type, entry_offset, count) {
            tags.insert(tag, value);
        }
    }

    Some((Header { tags }, store_end - offset))
}

fn decode_value(store: &[u8], rpm_type: u32, offset: usize, count: usize) -> Option<TagValue> {
    match rpm_type {
        RPM_STRING | RPM_I18NSTRING => {
            let s = read_cstr(store, offset)?;
            Some(TagValue::Str(s))
        }
        RPM_STRING_ARRAY => {
            let mut out = Vec::with_capacity(count);
            let mut pos = offset;
            for _ in 0..count {
                let s = read_cstr(store, pos)?;
                pos += s.len() + 1;
                out.push(s);
            }
            Some(TagValue::StrArray(out))
        }
        RPM_INT32 => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = offset + i * 4;
                out.push(i32::from_be_bytes(store.get(start..start + 4)?.try_into().ok()?));
            }
            Some(TagValue::Int32(out))
        }
        RPM_INT16 => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let start = offset + i * 2;
                out.push(i16::from_be_bytes(store.get(start..start + 2)?.try_into().ok()?) as i32);
            }
            Some(TagValue::Int16(out))
        }
        RPM_INT8 | RPM_CHAR => {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                out.push(*store.get(offset + i)? as i32);
            }
            Some(TagValue::Int8(out))
        }
        RPM_INT64 | RPM_BIN => None,
        _ => None,
    }
}

fn read_cstr(store: &[u8], offset: usize) -> Option<String> {
    let end = store[offset..].iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&store[offset..offset + end]).into_owned())
}

fn u32_be(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

/// Build a [`PackageRecord`] from a decoded header's tags, skipping
/// headers missing the required name/version/release/arch fields (the
/// scanner may also land on the rpmdb's own bookkeeping blobs).
fn header_to_record(header: &Header) -> Option<PackageRecord> {
    let name = header.get(TAG_NAME)?.as_str()?.to_string();
    let version = header.get(TAG_VERSION)?.as_str()?.to_string();
    let release = header.get(TAG_RELEASE)?.as_str()?.to_string();
    let arch = header.get(TAG_ARCH).and_then(|v| v.as_str()).map(String::from);
    let epoch = header.get(TAG_EPOCH).and_then(|v| v.as_int()).map(|e| e as u32);

    let nevra = Nevra {
        name: name.clone(),
        epoch,
        version: Some(version),
        release: Some(release),
        arch,
    };

    let summary = header
        .get(TAG_SUMMARY)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let description = header
        .get(TAG_DESCRIPTION)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let url = header
        .get(TAG_URL)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let sourcerpm = header
        .get(TAG_SOURCERPM)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let provides = reldep_list(header, TAG_PROVIDENAME, TAG_PROVIDEFLAGS, TAG_PROVIDEVERSION);
    let conflicts = reldep_list(header, TAG_CONFLICTNAME, 1053, 1055);
    let obsoletes = reldep_list(header, TAG_OBSOLETENAME, 1114, 1115);
    let requires_reldeps = reldep_list(header, TAG_REQUIRENAME, TAG_REQUIREFLAGS, TAG_REQUIREVERSION);
    let requires = requires_reldeps
        .into_iter()
        .map(crate::pool::ReqExpr::Single)
        .collect();
    let recommends = name_only_reqs(header, TAG_RECOMMENDNAME);
    let suggests = name_only_reqs(header, TAG_SUGGESTNAME);
    let supplements = name_only_reqs(header, TAG_SUPPLEMENTNAME);
    let enhances = name_only_reqs(header, TAG_ENHANCENAME);

    let files = file_list(header);

    Some(PackageRecord {
        nevra,
        repo: SYSTEM_REPO_NAME.to_string(),
        summary,
        description,
        url,
        license: String::new(),
        sourcerpm,
        location: String::new(),
        checksum: None,
        size_installed: 0,
        build_time: 0,
        files,
        deps: PackageDeps {
            requires,
            provides,
            conflicts,
            obsoletes,
            recommends,
            suggests,
            enhances,
            supplements,
        },
        installed: true,
    })
}

/// Decode a name/flags/version triple of tags (requires/provides/
/// conflicts/obsoletes all share this layout) into [`Reldep`]s.
fn reldep_list(header: &Header, name_tag: i32, flags_tag: i32, version_tag: i32) -> Vec<Reldep> {
    let Some(names) = header.get(name_tag).and_then(|v| v.as_str_array()) else {
        return Vec::new();
    };
    let flags = header.get(flags_tag).and_then(|v| v.as_int_array());
    let versions = header.get(version_tag).and_then(|v| v.as_str_array());

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let flag_bits = flags.as_ref().and_then(|f| f.get(i)).copied().unwrap_or(0);
            let version = versions.and_then(|v| v.get(i));
            match version.filter(|v| !v.is_empty()) {
                Some(v) if flag_bits != 0 => {
                    Reldep::versioned(name.clone(), rpm_sense_to_cmp_flags(flag_bits), Evr::parse(v))
                }
                _ => Reldep::bare(name.clone()),
            }
        })
        .collect()
}

fn name_only_reqs(header: &Header, name_tag: i32) -> Vec<crate::pool::ReqExpr> {
    header
        .get(name_tag)
        .and_then(|v| v.as_str_array())
        .map(|names| {
            names
                .iter()
                .map(|n| crate::pool::ReqExpr::Single(Reldep::bare(n.clone())))
                .collect()
        })
        .unwrap_or_default()
}

/// RPM sense bits: `RPMSENSE_LESS=1<<1, GREATER=1<<2, EQUAL=1<<3`.
fn rpm_sense_to_cmp_flags(bits: i64) -> CmpFlags {
    let mut flags = CmpFlags::empty();
    if bits & (1 << 1) != 0 {
        flags |= CmpFlags::LT;
    }
    if bits & (1 << 2) != 0 {
        flags |= CmpFlags::GT;
    }
    if bits & (1 << 3) != 0 {
        flags |= CmpFlags::EQ;
    }
    flags
}

/// Reconstruct the file list from `BASENAMES`/`DIRNAME`/`DIRINDEXES`.
fn file_list(header: &Header) -> Vec<PackageFile> {
    let Some(basenames) = header.get(TAG_BASENAMES).and_then(|v| v.as_str_array()) else {
        return Vec::new();
    };
    let Some(dirnames) = header.get(TAG_DIRNAMES).and_then(|v| v.as_str_array()) else {
        return Vec::new();
    };
    let Some(dirindexes) = header.get(TAG_DIRINDEXES).and_then(|v| v.as_int_array()) else {
        return Vec::new();
    };

    basenames
        .iter()
        .zip(dirindexes.iter())
        .filter_map(|(base, &dir_idx)| {
            let dir = dirnames.get(dir_idx as usize)?;
            Some(PackageFile {
                path: format!("{dir}{base}"),
                kind: crate::pool::FileKind::File,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_entry(tag: i32, s: &str, store: &mut Vec<u8>, index: &mut Vec<u8>) {
        let offset = store.len() as u32;
        store.extend_from_slice(s.as_bytes());
        store.push(0);
        index.extend_from_slice(&tag.to_be_bytes());
        index.extend_from_slice(&RPM_STRING.to_be_bytes());
        index.extend_from_slice(&offset.to_be_bytes());
        index.extend_from_slice(&1u32.to_be_bytes());
    }

    fn build_header(entries: Vec<(i32, &str)>) -> Vec<u8> {
        let mut store = Vec::new();
        let mut index = Vec::new();
        for (tag, value) in &entries {
            string_entry(*tag, value, &mut store, &mut index);
        }
        let mut blob = Vec::new();
        blob.extend_from_slice(&HEADER_MAGIC);
        blob.extend_from_slice(&[0, 0, 0, 0]);
        blob.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        blob.extend_from_slice(&(store.len() as u32).to_be_bytes());
        blob.extend_from_slice(&index);
        blob.extend_from_slice(&store);
        blob
    }

    #[test]
    fn scans_single_header_blob() {
        let blob = build_header(vec![
            (TAG_NAME, "foo"),
            (TAG_VERSION, "1.2"),
            (TAG_RELEASE, "3"),
            (TAG_ARCH, "x86_64"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        fs::write(&path, &blob).unwrap();
        let records = scan_packages(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].nevra.name, "foo");
        assert_eq!(records[0].nevra.arch.as_deref(), Some("x86_64"));
        assert!(records[0].installed);
        assert_eq!(records[0].repo, SYSTEM_REPO_NAME);
    }

    #[test]
    fn scans_two_consecutive_headers() {
        let mut blob = build_header(vec![
            (TAG_NAME, "foo"),
            (TAG_VERSION, "1.2"),
            (TAG_RELEASE, "3"),
        ]);
        blob.extend(build_header(vec![
            (TAG_NAME, "bar"),
            (TAG_VERSION, "4.5"),
            (TAG_RELEASE, "6"),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        fs::write(&path, &blob).unwrap();
        let records = scan_packages(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].nevra.name, "foo");
        assert_eq!(records[1].nevra.name, "bar");
    }

    #[test]
    fn skips_incomplete_header_without_name() {
        let blob = build_header(vec![(TAG_VERSION, "1.2")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        fs::write(&path, &blob).unwrap();
        let records = scan_packages(&path).unwrap();
        assert!(records.is_empty());
    }
}
