//! `primary.xml(.gz)` parsing: the main per-package record stream.
//!
//! Grounded on `dralley-rpmrepo_metadata`'s `Package`/`PrimaryXml` shape
//! (field names, `rpm:entry` dependency lists) narrowed to the fields
//! §4.6 calls for.

use std::path::Path;

use quick_xml::events::Event;

use crate::error::{Result, SackError};
use crate::evr::Evr;
use crate::metadata::xmlutil::{attr, flags_from_str, open_xml};
use crate::nevra::Nevra;
use crate::pool::{PackageDeps, PackageRecord, ReqExpr};
use crate::reldep::Reldep;

/// Which `rpm:entry` list is currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepList {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
    Recommends,
    Suggests,
    Enhances,
    Supplements,
}

/// Parse a `primary.xml(.gz)` file into package records, keyed by
/// `pkgid` (the package's primary checksum, used by `filelists.xml` to
/// join its file lists back onto the same record).
pub fn parse(path: &Path, repo_name: &str) -> Result<Vec<(String, PackageRecord)>> {
    let mut xml = open_xml(path)?;
    let mut out = Vec::new();
    let mut buf = Vec::new();

    let mut name = String::new();
    let mut arch = String::new();
    let mut epoch: Option<u32> = None;
    let mut version = String::new();
    let mut release = String::new();
    let mut checksum: Option<(String, String)> = None;
    let mut pkgid = String::new();
    let mut summary = String::new();
    let mut description = String::new();
    let mut url = String::new();
    let mut license = String::new();
    let mut sourcerpm = String::new();
    let mut location = String::new();
    let mut size_installed: u64 = 0;
    let mut build_time: i64 = 0;
    let mut deps = PackageDeps::default();

    let mut in_package = false;
    let mut in_checksum = false;
    let mut in_summary = false;
    let mut in_description = false;
    let mut in_url = false;
    let mut current_list: Option<DepList> = None;
    let mut text_target: Option<&'static str> = None;

    macro_rules! flush_package {
        () => {
            if in_package {
                let nevra = Nevra {
                    name: name.clone(),
                    epoch,
                    version: Some(version.clone()),
                    release: Some(release.clone()),
                    arch: Some(arch.clone()),
                };
                let record = PackageRecord {
                    nevra,
                    repo: repo_name.to_string(),
                    summary: summary.clone(),
                    description: description.clone(),
                    url: url.clone(),
                    license: license.clone(),
                    sourcerpm: sourcerpm.clone(),
                    location: location.clone(),
                    checksum: checksum.clone(),
                    size_installed,
                    build_time,
                    files: Vec::new(),
                    deps: deps.clone(),
                    installed: false,
                };
                out.push((pkgid.clone(), record));
            }
        };
    }

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| SackError::Failed(format!("primary.xml: {e}")))?
        {
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"package" => {
                        in_package = true;
                        name.clear();
                        arch.clear();
                        epoch = None;
                        version.clear();
                        release.clear();
                        checksum = None;
                        pkgid.clear();
                        summary.clear();
                        description.clear();
                        url.clear();
                        license.clear();
                        sourcerpm.clear();
                        location.clear();
                        size_installed = 0;
                        build_time = 0;
                        deps = PackageDeps::default();
                    }
                    b"name" if in_package => text_target = Some("name"),
                    b"arch" if in_package => text_target = Some("arch"),
                    b"version" if in_package => {
                        epoch = attr(&e, "epoch").and_then(|s| s.parse::<u32>().ok());
                        if let Some(v) = attr(&e, "ver") {
                            version = v;
                        }
                        if let Some(r) = attr(&e, "rel") {
                            release = r;
                        }
                    }
                    b"checksum" => {
                        in_checksum = true;
                        let kind = attr(&e, "type").unwrap_or_default();
                        checksum = Some((kind, String::new()));
                    }
                    b"summary" => {
                        in_summary = true;
                        summary.clear();
                    }
                    b"description" => {
                        in_description = true;
                        description.clear();
                    }
                    b"url" => {
                        in_url = true;
                        url.clear();
                    }
                    b"location" => {
                        if let Some(href) = attr(&e, "href") {
                            location = href;
                        }
                    }
                    b"size" => {
                        if let Some(installed) = attr(&e, "installed") {
                            size_installed = installed.parse().unwrap_or(0);
                        }
                    }
                    b"time" => {
                        if let Some(build) = attr(&e, "build") {
                            build_time = build.parse().unwrap_or(0);
                        }
                    }
                    b"license" => text_target = Some("license"),
                    b"sourcerpm" => text_target = Some("sourcerpm"),
                    b"provides" => current_list = Some(DepList::Provides),
                    b"requires" => current_list = Some(DepList::Requires),
                    b"conflicts" => current_list = Some(DepList::Conflicts),
                    b"obsoletes" => current_list = Some(DepList::Obsoletes),
                    b"recommends" => current_list = Some(DepList::Recommends),
                    b"suggests" => current_list = Some(DepList::Suggests),
                    b"enhances" => current_list = Some(DepList::Enhances),
                    b"supplements" => current_list = Some(DepList::Supplements),
                    b"entry" => {
                        let Some(entry_name) = attr(&e, "name") else {
                            continue;
                        };
                        let flags = attr(&e, "flags").map(|f| flags_from_str(&f));
                        let entry_epoch = attr(&e, "epoch").and_then(|s| s.parse::<u32>().ok());
                        let entry_ver = attr(&e, "ver");
                        let entry_rel = attr(&e, "rel");
                        let entry_evr = entry_ver.map(|ver| Evr {
                            epoch: entry_epoch,
                            version: ver,
                            release: entry_rel.unwrap_or_default(),
                        });
                        match current_list {
                            Some(DepList::Provides) => deps
                                .provides
                                .push(entry_as_reldep(&entry_name, flags, entry_evr)),
                            Some(DepList::Conflicts) => deps
                                .conflicts
                                .push(entry_as_reldep(&entry_name, flags, entry_evr)),
                            Some(DepList::Obsoletes) => deps
                                .obsoletes
                                .push(entry_as_reldep(&entry_name, flags, entry_evr)),
                            Some(DepList::Requires) => {
                                deps.requires.push(ReqExpr::parse(&entry_name, flags, entry_evr))
                            }
                            Some(DepList::Recommends) => deps
                                .recommends
                                .push(ReqExpr::parse(&entry_name, flags, entry_evr)),
                            Some(DepList::Suggests) => deps
                                .suggests
                                .push(ReqExpr::parse(&entry_name, flags, entry_evr)),
                            Some(DepList::Enhances) => deps
                                .enhances
                                .push(ReqExpr::parse(&entry_name, flags, entry_evr)),
                            Some(DepList::Supplements) => deps
                                .supplements
                                .push(ReqExpr::parse(&entry_name, flags, entry_evr)),
                            None => {}
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SackError::Failed(format!("primary.xml: {e}")))?;
                if in_checksum {
                    if let Some((_, digest)) = checksum.as_mut() {
                        digest.push_str(&text);
                    }
                    pkgid = text.to_string();
                } else if in_summary {
                    summary.push_str(&text);
                } else if in_description {
                    description.push_str(&text);
                } else if in_url {
                    url.push_str(&text);
                } else {
                    match text_target {
                        Some("name") => name.push_str(&text),
                        Some("arch") => arch.push_str(&text),
                        Some("license") => license.push_str(&text),
                        Some("sourcerpm") => sourcerpm.push_str(&text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"package" => {
                        flush_package!();
                        in_package = false;
                    }
                    b"checksum" => in_checksum = false,
                    b"summary" => in_summary = false,
                    b"description" => in_description = false,
                    b"url" => in_url = false,
                    b"name" | b"arch" | b"license" | b"sourcerpm" => text_target = None,
                    b"provides" | b"requires" | b"conflicts" | b"obsoletes" | b"recommends"
                    | b"suggests" | b"enhances" | b"supplements" => current_list = None,
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

fn entry_as_reldep(name: &str, flags: Option<crate::reldep::CmpFlags>, evr: Option<Evr>) -> Reldep {
    match (flags, evr) {
        (Some(flags), Some(evr)) => Reldep::versioned(name.to_string(), flags, evr),
        _ => Reldep::bare(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("primary.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"<?xml version="1.0"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
  <package type="rpm">
    <name>foo</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="1.2" rel="3"/>
    <checksum type="sha256" pkgid="YES">abcd1234</checksum>
    <summary>Foo the package</summary>
    <description>A longer description.</description>
    <url>https://example.com/foo</url>
    <time file="1690000000" build="1689999000"/>
    <size package="1000" installed="2000" archive="3000"/>
    <location href="Packages/foo-1.2-3.x86_64.rpm"/>
    <format>
      <rpm:license>GPL</rpm:license>
      <rpm:sourcerpm>foo-1.2-3.src.rpm</rpm:sourcerpm>
      <rpm:provides>
        <rpm:entry name="foo" flags="EQ" epoch="0" ver="1.2" rel="3"/>
      </rpm:provides>
      <rpm:requires>
        <rpm:entry name="libc.so.6"/>
        <rpm:entry name="(pkgconfig(bar) or pkgconfig(baz))"/>
      </rpm:requires>
    </format>
  </package>
</metadata>
"#
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_package_fields_and_deps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path());
        let records = parse(&path, "fedora").unwrap();
        assert_eq!(records.len(), 1);
        let (pkgid, record) = &records[0];
        assert_eq!(pkgid, "abcd1234");
        assert_eq!(record.nevra.name, "foo");
        assert_eq!(record.nevra.arch.as_deref(), Some("x86_64"));
        assert_eq!(record.summary, "Foo the package");
        assert_eq!(record.size_installed, 2000);
        assert_eq!(record.deps.provides.len(), 1);
        assert_eq!(record.deps.requires.len(), 2);
        match &record.deps.requires[1] {
            ReqExpr::Or(alts) => assert_eq!(alts.len(), 2),
            _ => panic!("expected rich Or requirement"),
        }
    }
}
