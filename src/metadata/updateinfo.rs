//! `updateinfo.xml(.gz)` parsing: errata records, independent of the
//! package pool (advisories reference packages by name/EVR/arch, not by
//! `SolvableId`).

use std::path::Path;

use quick_xml::events::Event;

use crate::advisory::{Advisory, AdvisoryPkg, AdvisoryRef, AdvisoryRefType, AdvisoryType};
use crate::error::{Result, SackError};
use crate::metadata::xmlutil::{attr, open_xml};

/// Parse an `updateinfo.xml(.gz)` file into its advisory records.
pub fn parse(path: &Path) -> Result<Vec<Advisory>> {
    let mut xml = open_xml(path)?;
    let mut out = Vec::new();
    let mut buf = Vec::new();

    let mut id = String::new();
    let mut title = String::new();
    let mut kind = AdvisoryType::Unknown;
    let mut description = String::new();
    let mut rights: Option<String> = None;
    let mut updated: i64 = 0;
    let mut packages = Vec::new();
    let mut references = Vec::new();

    let mut in_update = false;
    let mut in_package = false;
    let mut pkg_name = String::new();
    let mut pkg_evr = String::new();
    let mut pkg_arch = String::new();
    let mut pkg_filename = String::new();
    let mut text_target: Option<&'static str> = None;

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| SackError::Failed(format!("updateinfo.xml: {e}")))?
        {
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"update" => {
                        in_update = true;
                        id.clear();
                        title.clear();
                        description.clear();
                        rights = None;
                        updated = 0;
                        packages = Vec::new();
                        references = Vec::new();
                        kind = match attr(&e, "type").as_deref() {
                            Some("security") => AdvisoryType::Security,
                            Some("bugfix") => AdvisoryType::Bugfix,
                            Some("enhancement") => AdvisoryType::Enhancement,
                            _ => AdvisoryType::Unknown,
                        };
                    }
                    b"id" if in_update => text_target = Some("id"),
                    b"title" if in_update => text_target = Some("title"),
                    b"description" if in_update => text_target = Some("description"),
                    b"rights" if in_update => text_target = Some("rights"),
                    b"issued" | b"updated" if in_update => {
                        if let Some(date) = attr(&e, "date") {
                            updated = parse_timestamp(&date);
                        }
                    }
                    b"reference" if in_update => {
                        let kind = match attr(&e, "type").as_deref() {
                            Some("bugzilla") => AdvisoryRefType::Bugzilla,
                            Some("cve") => AdvisoryRefType::Cve,
                            Some("vendor") => AdvisoryRefType::Vendor,
                            _ => AdvisoryRefType::Unknown,
                        };
                        references.push(AdvisoryRef {
                            kind,
                            id: attr(&e, "id").unwrap_or_default(),
                            title: attr(&e, "title"),
                            url: attr(&e, "href"),
                        });
                    }
                    b"package" if in_update => {
                        in_package = true;
                        pkg_name = attr(&e, "name").unwrap_or_default();
                        pkg_evr = package_evr(&e);
                        pkg_arch = attr(&e, "arch").unwrap_or_default();
                        pkg_filename.clear();
                    }
                    b"filename" if in_package => text_target = Some("filename"),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(target) = text_target {
                    let text = t
                        .unescape()
                        .map_err(|e| SackError::Failed(format!("updateinfo.xml: {e}")))?;
                    match target {
                        "id" => id.push_str(&text),
                        "title" => title.push_str(&text),
                        "description" => description.push_str(&text),
                        "rights" => {
                            rights.get_or_insert_with(String::new).push_str(&text);
                        }
                        "filename" => pkg_filename.push_str(&text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"id" | b"title" | b"description" | b"rights" | b"filename" => {
                        text_target = None
                    }
                    b"package" if in_package => {
                        packages.push(AdvisoryPkg {
                            name: std::mem::take(&mut pkg_name),
                            evr: std::mem::take(&mut pkg_evr),
                            arch: std::mem::take(&mut pkg_arch),
                            filename: std::mem::take(&mut pkg_filename),
                        });
                        in_package = false;
                    }
                    b"update" => {
                        if in_update {
                            out.push(Advisory {
                                id: id.clone(),
                                title: title.clone(),
                                kind,
                                description: description.clone(),
                                rights: rights.clone(),
                                updated,
                                packages: std::mem::take(&mut packages),
                                references: std::mem::take(&mut references),
                            });
                        }
                        in_update = false;
                    }
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

/// Reconstruct `"[epoch:]version-release"` from an updateinfo `<package>`
/// element's separate `epoch`/`version`/`release` attributes.
fn package_evr(e: &quick_xml::events::BytesStart<'_>) -> String {
    let epoch = attr(e, "epoch").filter(|e| e != "0" && !e.is_empty());
    let version = attr(e, "version").unwrap_or_default();
    let release = attr(e, "release").unwrap_or_default();
    match epoch {
        Some(epoch) => format!("{epoch}:{version}-{release}"),
        None => format!("{version}-{release}"),
    }
}

fn parse_timestamp(date: &str) -> i64 {
    date.parse::<i64>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("updateinfo.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<?xml version="1.0"?>
<updates>
  <update type="security">
    <id>RHSA-2024:1234</id>
    <title>Fix foo</title>
    <issued date="1690000000"/>
    <description>A security fix.</description>
    <references>
      <reference type="cve" id="CVE-2024-0001" title="foo flaw" href="https://example.com/cve"/>
    </references>
    <pkglist>
      <collection>
        <package name="foo" version="1.3" release="1" arch="x86_64" epoch="0" src="foo-1.3-1.src.rpm">
          <filename>foo-1.3-1.x86_64.rpm</filename>
        </package>
      </collection>
    </pkglist>
  </update>
</updates>
"#
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_advisory_with_refs_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let advisories = parse(&path).unwrap();
        assert_eq!(advisories.len(), 1);
        let adv = &advisories[0];
        assert_eq!(adv.id, "RHSA-2024:1234");
        assert_eq!(adv.kind, AdvisoryType::Security);
        assert_eq!(adv.updated, 1690000000);
        assert_eq!(adv.references.len(), 1);
        assert_eq!(adv.references[0].kind, AdvisoryRefType::Cve);
        assert!(adv.mentions("foo"));
        assert_eq!(adv.packages[0].evr, "1.3-1");
        assert_eq!(adv.packages[0].filename, "foo-1.3-1.x86_64.rpm");
    }
}
