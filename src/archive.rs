//! Code to read ar files. We only need the System V subset that compilers emit for
//! static object libraries: fixed-width ASCII entry headers with inline member data.
//! GNU extended-filename tables get no special handling; they simply come out as
//! non-ELF members and are discarded by the loader.

use crate::error::Result;
use anyhow::bail;
use bytemuck::Pod;
use bytemuck::Zeroable;

pub(crate) struct ArchiveEntry<'data> {
    /// The member name with the header's space padding and a single trailing '/'
    /// already removed.
    pub(crate) ident: &'data [u8],

    pub(crate) entry_data: &'data [u8],

    /// The offset in the archive at which the data is from.
    pub(crate) data_offset: usize,
}

pub(crate) struct ArchiveIterator<'data> {
    data: &'data [u8],
    offset: usize,
}

#[derive(Zeroable, Pod, Clone, Copy)]
#[repr(C)]
struct EntryHeader {
    ident: [u8; 16],
    _timestamp: [u8; 12],
    _owner_id: [u8; 6],
    _group_id: [u8; 6],
    _mode: [u8; 8],
    size: [u8; 10],
    end: [u8; 2],
}

const _ASSERTS: () = {
    assert!(size_of::<EntryHeader>() == 60);
};

const HEADER_SIZE: usize = size_of::<EntryHeader>();

const ENTRY_TERMINATOR: [u8; 2] = *b"`\n";

impl<'data> ArchiveIterator<'data> {
    /// Create an iterator from the bytes of the whole archive, starting with the
    /// archive magic.
    pub(crate) fn from_archive_bytes(data: &'data [u8]) -> Result<Self> {
        let magic = object::archive::MAGIC;
        if let Some(data) = data.strip_prefix(&magic) {
            Ok(Self {
                data,
                offset: magic.len(),
            })
        } else {
            bail!("Missing archive header");
        }
    }

    fn next_result(&mut self) -> Result<Option<ArchiveEntry<'data>>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        if self.data.len() < HEADER_SIZE {
            bail!("Short entry header");
        }
        let (header, rest) = self.data.split_at(HEADER_SIZE);
        let header: &'data EntryHeader = bytemuck::from_bytes(header);
        if header.end != ENTRY_TERMINATOR {
            bail!("Invalid entry terminator");
        }
        let size = parse_decimal_size(&header.size)?;
        self.data = rest;
        self.offset += HEADER_SIZE;
        if self.data.len() < size {
            bail!(
                "Entry size is {size}, but only {} bytes left",
                self.data.len()
            );
        }
        let entry = ArchiveEntry {
            ident: trim_ident(&header.ident),
            entry_data: &self.data[..size],
            data_offset: self.offset,
        };
        // Entries start on even offsets; a pad byte follows odd-sized data.
        let size_with_padding = size.next_multiple_of(2).min(self.data.len());
        self.data = &self.data[size_with_padding..];
        self.offset += size_with_padding;
        Ok(Some(entry))
    }
}

fn parse_decimal_size(field: &[u8; 10]) -> Result<usize> {
    let text = core::str::from_utf8(field).map_err(|_| anyhow::anyhow!("Invalid size field"))?;
    let text = text.trim_end();
    if text.is_empty() {
        bail!("Invalid size field");
    }
    Ok(text.parse()?)
}

/// Member names are space padded to 16 bytes and System V ar appends a '/' so that
/// names may contain trailing spaces. Cut at the first space, then drop one '/'.
fn trim_ident(ident: &[u8; 16]) -> &[u8] {
    let end = ident.iter().position(|&b| b == b' ').unwrap_or(ident.len());
    let ident = &ident[..end];
    ident.strip_suffix(b"/").unwrap_or(ident)
}

impl<'data> Iterator for ArchiveIterator<'data> {
    type Item = Result<ArchiveEntry<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_result().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{name:<16}").as_bytes());
        out.extend_from_slice(format!("{:<12}", 0).as_bytes());
        out.extend_from_slice(format!("{:<6}", 0).as_bytes());
        out.extend_from_slice(format!("{:<6}", 0).as_bytes());
        out.extend_from_slice(format!("{:<8}", 644).as_bytes());
        out.extend_from_slice(format!("{size:<10}").as_bytes());
        out.extend_from_slice(b"`\n");
        out
    }

    fn archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = b"!<arch>\n".to_vec();
        for (name, data) in members {
            out.extend_from_slice(&header(name, data.len()));
            out.extend_from_slice(data);
            if data.len() % 2 == 1 {
                out.push(b'\n');
            }
        }
        out
    }

    fn read_all(data: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        ArchiveIterator::from_archive_bytes(data)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (entry.ident.to_owned(), entry.entry_data.to_owned())
            })
            .collect()
    }

    #[test]
    fn iterates_members_with_padding() {
        let data = archive(&[("a.o/", b"odd"), ("b.o/", b"even")]);
        let entries = read_all(&data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (b"a.o".to_vec(), b"odd".to_vec()));
        assert_eq!(entries[1], (b"b.o".to_vec(), b"even".to_vec()));
    }

    #[test]
    fn strips_one_trailing_slash_only() {
        assert_eq!(trim_ident(b"name.o/         "), b"name.o");
        assert_eq!(trim_ident(b"//              "), b"/");
        assert_eq!(trim_ident(b"no_slash        "), b"no_slash");
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(ArchiveIterator::from_archive_bytes(b"!<thin>\n").is_err());
    }

    #[test]
    fn rejects_truncated_member() {
        let mut data = archive(&[("a.o/", b"payload")]);
        data.truncate(data.len() - 4);
        let result: Result<Vec<_>> = ArchiveIterator::from_archive_bytes(&data)
            .unwrap()
            .collect();
        assert!(result.is_err());
    }
}
