//! `repomd.xml` parsing: the index of a repository's metadata files.
//!
//! Grounded on `dralley-rpmrepo_metadata`'s `RepomdXml`/`Data` shape,
//! narrowed to the four data kinds this core consumes (§4.6).

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::Event;

use crate::error::{Result, SackError};
use crate::metadata::xmlutil::{attr, open_xml};

/// One `<data type="…">` entry from `repomd.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdData {
    /// Checksum type, e.g. `"sha256"`.
    pub checksum_type: String,
    /// Hex checksum digest.
    pub checksum: String,
    /// Location of the data file, relative to the repo base.
    pub location: String,
}

/// Parsed `repomd.xml`: a map from data-kind name (`"primary"`,
/// `"filelists"`, `"updateinfo"`, `"prestodelta"`, or any other kind the
/// repo happens to list) to its [`RepomdData`] entry.
#[derive(Debug, Clone, Default)]
pub struct Repomd {
    pub data: HashMap<String, RepomdData>,
}

impl Repomd {
    /// Parse a `repomd.xml` file at `path`.
    pub fn parse(path: &Path) -> Result<Repomd> {
        let mut xml = open_xml(path)?;
        let mut repomd = Repomd::default();

        let mut buf = Vec::new();
        let mut current_type: Option<String> = None;
        let mut checksum_type = String::new();
        let mut checksum = String::new();
        let mut location = String::new();
        let mut in_checksum = false;

        loop {
            match xml
                .read_event_into(&mut buf)
                .map_err(|e| SackError::Failed(format!("repomd.xml: {e}")))?
            {
                Event::Start(e) if e.local_name().as_ref() == b"data" => {
                    current_type = attr(&e, "type");
                    checksum_type.clear();
                    checksum.clear();
                    location.clear();
                }
                Event::Start(e) if e.local_name().as_ref() == b"checksum" => {
                    in_checksum = true;
                    if let Some(t) = attr(&e, "type") {
                        checksum_type = t;
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"checksum" => {
                    in_checksum = false;
                }
                Event::Text(t) if in_checksum => {
                    checksum.push_str(
                        &t.unescape()
                            .map_err(|e| SackError::Failed(format!("repomd.xml: {e}")))?,
                    );
                }
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"location" => {
                    if let Some(href) = attr(&e, "href") {
                        location = href;
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"data" => {
                    if let Some(kind) = current_type.take() {
                        repomd.data.insert(
                            kind,
                            RepomdData {
                                checksum_type: checksum_type.clone(),
                                checksum: checksum.clone(),
                                location: location.clone(),
                            },
                        );
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(repomd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("repomd.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<?xml version="1.0"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>1</revision>
  <data type="primary">
    <checksum type="sha256">abc123</checksum>
    <location href="repodata/primary.xml.gz"/>
  </data>
  <data type="filelists">
    <checksum type="sha256">def456</checksum>
    <location href="repodata/filelists.xml.gz"/>
  </data>
  <data type="group_gz">
    <checksum type="sha256">000</checksum>
    <location href="repodata/comps.xml.gz"/>
  </data>
</repomd>
"#
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_known_and_skips_unknown_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let repomd = Repomd::parse(&path).unwrap();
        assert_eq!(repomd.data.len(), 3);
        let primary = &repomd.data["primary"];
        assert_eq!(primary.checksum_type, "sha256");
        assert_eq!(primary.checksum, "abc123");
        assert_eq!(primary.location, "repodata/primary.xml.gz");
        assert!(repomd.data.contains_key("group_gz"));
    }
}
