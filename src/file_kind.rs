//! Code for identifying what sort of file we're dealing with based on the bytes of the file.

use crate::error::Result;
use anyhow::bail;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum FileKind {
    ElfObject,
    Archive,
}

impl FileKind {
    pub(crate) fn identify_bytes(bytes: &[u8]) -> Result<FileKind> {
        if bytes.starts_with(&object::archive::MAGIC) {
            Ok(FileKind::Archive)
        } else if bytes.starts_with(&object::elf::ELFMAG) {
            Ok(FileKind::ElfObject)
        } else {
            bail!("Couldn't identify file type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_archives_and_objects() {
        assert_eq!(
            FileKind::identify_bytes(b"!<arch>\nrest").unwrap(),
            FileKind::Archive
        );
        assert_eq!(
            FileKind::identify_bytes(b"\x7fELF\x01\x01\x01").unwrap(),
            FileKind::ElfObject
        );
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(FileKind::identify_bytes(b"not an object").is_err());
        assert!(FileKind::identify_bytes(b"").is_err());
    }
}
