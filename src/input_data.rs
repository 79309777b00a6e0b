//! Code for loading an input path into memory and splitting it into object-file
//! members. An `ar` archive contributes every member that is itself an ELF file;
//! a bare ELF object contributes a single member named after the file. Everything
//! downstream borrows from the buffer owned here.

use crate::archive::ArchiveIterator;
use crate::error::Result;
use crate::file_kind::FileKind;
use anyhow::bail;
use anyhow::Context as _;
use std::ops::Range;
use std::path::Path;

pub struct InputData {
    bytes: Vec<u8>,
    members: Vec<Member>,
}

struct Member {
    name: String,
    bytes: Range<usize>,
}

impl InputData {
    pub fn load(path: &Path) -> Result<InputData> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file `{}`", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(&name, bytes)
            .with_context(|| format!("Could not load library `{}`", path.display()))
    }

    /// `name` is used for the member name when `bytes` is a bare object rather
    /// than an archive.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<InputData> {
        let mut members = Vec::new();
        match FileKind::identify_bytes(&bytes)? {
            FileKind::ElfObject => {
                members.push(Member {
                    name: name.to_owned(),
                    bytes: 0..bytes.len(),
                });
            }
            FileKind::Archive => {
                for entry in ArchiveIterator::from_archive_bytes(&bytes)? {
                    let entry = entry?;
                    // Only ELF members are interesting. This also skips archive
                    // index and extended-filename pseudo-members.
                    if !entry.entry_data.starts_with(&object::elf::ELFMAG) {
                        continue;
                    }
                    members.push(Member {
                        name: String::from_utf8_lossy(entry.ident).into_owned(),
                        bytes: entry.data_offset..entry.data_offset + entry.entry_data.len(),
                    });
                }
            }
        }
        if members.is_empty() {
            bail!("No object files found");
        }
        tracing::debug!(member_count = members.len(), "loaded input");
        Ok(InputData { bytes, members })
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.members
            .iter()
            .map(|member| (member.name.as_str(), &self.bytes[member.bytes.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_is_a_single_member() {
        let bytes = b"\x7fELF\x01\x01\x01rest-of-object".to_vec();
        let input = InputData::from_bytes("prog.o", bytes.clone()).unwrap();
        let members: Vec<_> = input.members().collect();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "prog.o");
        assert_eq!(members[0].1, &bytes[..]);
    }

    #[test]
    fn non_elf_members_are_skipped() {
        let mut bytes = b"!<arch>\n".to_vec();
        // A fake index member followed by one ELF member.
        bytes.extend_from_slice(b"/               0           0     0     644     4         `\n");
        bytes.extend_from_slice(b"idx!");
        bytes.extend_from_slice(b"a.o/            0           0     0     644     8         `\n");
        bytes.extend_from_slice(b"\x7fELF\x01\x01\x01\x00");
        let input = InputData::from_bytes("lib.a", bytes).unwrap();
        let members: Vec<_> = input.members().collect();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "a.o");
        assert!(members[0].1.starts_with(b"\x7fELF"));
    }

    #[test]
    fn archive_with_no_objects_is_an_error() {
        let mut bytes = b"!<arch>\n".to_vec();
        bytes.extend_from_slice(b"t.txt/          0           0     0     644     2         `\n");
        bytes.extend_from_slice(b"hi");
        assert!(InputData::from_bytes("lib.a", bytes).is_err());
    }

    #[test]
    fn unrecognised_magic_is_an_error() {
        assert!(InputData::from_bytes("x", b"garbage".to_vec()).is_err());
    }
}
