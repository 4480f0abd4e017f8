//! Streaming parsers for already-fetched repository metadata XML.
//!
//! Each submodule parses one extension file in isolation; joining the
//! results onto a [`crate::pool::RpmPool`] (interning `primary` records,
//! attaching `filelists` file lists by `pkgid`, collecting `updateinfo`
//! advisories, recording `prestodelta` entries) is [`crate::sack::Sack`]'s
//! job, not these parsers'.

pub mod filelists;
pub mod prestodelta;
pub mod primary;
pub mod repomd;
pub mod updateinfo;
mod xmlutil;

pub use prestodelta::DeltaRpm;
pub use repomd::{Repomd, RepomdData};
