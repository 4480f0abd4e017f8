//! `prestodelta.xml(.gz)` parsing: delta-RPM metadata, keyed by the
//! target NEVRA. Applying a delta against an older package is out of
//! scope for this core; only the metadata describing one is parsed.

use std::path::Path;

use quick_xml::events::Event;

use crate::error::{Result, SackError};
use crate::evr::Evr;
use crate::metadata::xmlutil::{attr, open_xml};
use crate::nevra::Nevra;

/// One `<delta>` entry: the old version it's relative to, and where to
/// fetch/verify the delta payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeltaRpm {
    /// Target package NEVRA (the `<newpackage>` this delta produces).
    pub target: Nevra,
    /// EVR of the old package this delta is relative to.
    pub old_evr: Evr,
    /// Relative path to the delta payload.
    pub filename: String,
    /// Size of the delta payload in bytes.
    pub size: u64,
    /// `(checksum-type, hex-digest)` of the delta payload.
    pub checksum: Option<(String, String)>,
}

/// Parse a `prestodelta.xml(.gz)` file into its delta records.
pub fn parse(path: &Path) -> Result<Vec<DeltaRpm>> {
    let mut xml = open_xml(path)?;
    let mut out = Vec::new();
    let mut buf = Vec::new();

    let mut target: Option<Nevra> = None;
    let mut old_evr = Evr {
        epoch: None,
        version: String::new(),
        release: String::new(),
    };
    let mut filename = String::new();
    let mut size: u64 = 0;
    let mut checksum: Option<(String, String)> = None;
    let mut in_delta = false;
    let mut in_checksum = false;
    let mut text_target: Option<&'static str> = None;

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| SackError::Failed(format!("prestodelta.xml: {e}")))?
        {
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"newpackage" => {
                        target = Some(Nevra {
                            name: attr(&e, "name").unwrap_or_default(),
                            epoch: attr(&e, "epoch").and_then(|s| s.parse::<u32>().ok()),
                            version: attr(&e, "version"),
                            release: attr(&e, "release"),
                            arch: attr(&e, "arch"),
                        });
                    }
                    b"delta" => {
                        in_delta = true;
                        old_evr = Evr {
                            epoch: attr(&e, "oldepoch").and_then(|s| s.parse::<u32>().ok()),
                            version: attr(&e, "oldversion").unwrap_or_default(),
                            release: attr(&e, "oldrelease").unwrap_or_default(),
                        };
                        filename.clear();
                        size = 0;
                        checksum = None;
                    }
                    b"filename" if in_delta => text_target = Some("filename"),
                    b"size" if in_delta => text_target = Some("size"),
                    b"checksum" if in_delta => {
                        in_checksum = true;
                        let kind = attr(&e, "type").unwrap_or_default();
                        checksum = Some((kind, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SackError::Failed(format!("prestodelta.xml: {e}")))?;
                if in_checksum {
                    if let Some((_, digest)) = checksum.as_mut() {
                        digest.push_str(&text);
                    }
                } else {
                    match text_target {
                        Some("filename") => filename.push_str(&text),
                        Some("size") => size = text.trim().parse().unwrap_or(0),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"filename" | b"size" => text_target = None,
                    b"checksum" => in_checksum = false,
                    b"delta" => {
                        if let Some(target) = target.clone() {
                            out.push(DeltaRpm {
                                target,
                                old_evr: old_evr.clone(),
                                filename: filename.clone(),
                                size,
                                checksum: checksum.clone(),
                            });
                        }
                        in_delta = false;
                    }
                    b"newpackage" => target = None,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("prestodelta.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<?xml version="1.0"?>
<prestodelta>
  <newpackage name="foo" epoch="0" version="1.3" release="1" arch="x86_64">
    <delta oldepoch="0" oldversion="1.2" oldrelease="1">
      <filename>drpms/foo-1.2-1_1.3-1.x86_64.drpm</filename>
      <sequence>abcdef0123456789</sequence>
      <size>4096</size>
      <checksum type="sha256">deadbeef</checksum>
    </delta>
  </newpackage>
</prestodelta>
"#
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_delta_relative_to_old_evr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let deltas = parse(&path).unwrap();
        assert_eq!(deltas.len(), 1);
        let delta = &deltas[0];
        assert_eq!(delta.target.name, "foo");
        assert_eq!(delta.target.version.as_deref(), Some("1.3"));
        assert_eq!(delta.old_evr.version, "1.2");
        assert_eq!(delta.size, 4096);
        assert_eq!(delta.checksum.as_ref().unwrap().1, "deadbeef");
    }
}
