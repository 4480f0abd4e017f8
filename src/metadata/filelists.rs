//! `filelists.xml(.gz)` parsing: per-package file lists, joined back onto
//! already-interned `primary.xml` records by `pkgid`.

use std::path::Path;

use quick_xml::events::Event;

use crate::error::{Result, SackError};
use crate::metadata::xmlutil::{attr, open_xml};
use crate::pool::{FileKind, PackageFile};

/// Parse a `filelists.xml(.gz)` file, returning each package's file list
/// keyed by the same `pkgid` that `primary.xml` used for that package.
pub fn parse(path: &Path) -> Result<Vec<(String, Vec<PackageFile>)>> {
    let mut xml = open_xml(path)?;
    let mut out = Vec::new();
    let mut buf = Vec::new();

    let mut pkgid = String::new();
    let mut files: Vec<PackageFile> = Vec::new();
    let mut in_package = false;
    let mut current_kind: Option<FileKind> = None;

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| SackError::Failed(format!("filelists.xml: {e}")))?
        {
            Event::Start(e) if e.local_name().as_ref() == b"package" => {
                in_package = true;
                pkgid = attr(&e, "pkgid").unwrap_or_default();
                files = Vec::new();
            }
            Event::Start(e) if in_package && e.local_name().as_ref() == b"file" => {
                current_kind = Some(match attr(&e, "type").as_deref() {
                    Some("dir") => FileKind::Dir,
                    Some("ghost") => FileKind::Ghost,
                    _ => FileKind::File,
                });
            }
            Event::Text(t) if in_package && current_kind.is_some() => {
                let text = t
                    .unescape()
                    .map_err(|e| SackError::Failed(format!("filelists.xml: {e}")))?;
                files.push(PackageFile {
                    path: text.into_owned(),
                    kind: current_kind.unwrap(),
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"file" => {
                current_kind = None;
            }
            Event::End(e) if e.local_name().as_ref() == b"package" => {
                if in_package {
                    out.push((pkgid.clone(), std::mem::take(&mut files)));
                }
                in_package = false;
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
        let path = dir.join("filelists.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<?xml version="1.0"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
  <package pkgid="abcd1234" name="foo" arch="x86_64">
    <version epoch="0" ver="1.2" rel="3"/>
    <file>/usr/bin/foo</file>
    <file type="dir">/usr/share/foo</file>
    <file type="ghost">/var/log/foo.log</file>
  </package>
</filelists>
"#
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_file_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let lists = parse(&path).unwrap();
        assert_eq!(lists.len(), 1);
        let (pkgid, files) = &lists[0];
        assert_eq!(pkgid, "abcd1234");
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].kind, FileKind::File);
        assert_eq!(files[1].kind, FileKind::Dir);
        assert_eq!(files[2].kind, FileKind::Ghost);
        assert_eq!(files[0].path, "/usr/bin/foo");
    }
}
