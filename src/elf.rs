use crate::error::Result;
use anyhow::bail;
use object::read::elf::FileHeader as _;
use object::read::elf::SectionHeader as _;
use object::LittleEndian;

pub(crate) type FileHeader = object::elf::FileHeader32<LittleEndian>;
pub(crate) type SectionHeader = object::elf::SectionHeader32<LittleEndian>;
pub(crate) type Symbol = object::elf::Sym32<LittleEndian>;
pub(crate) type Rel = object::elf::Rel32<LittleEndian>;

type SectionTable<'data> = object::read::elf::SectionTable<'data, FileHeader>;
type SymbolTable<'data> = object::read::elf::SymbolTable<'data, FileHeader>;

/// Read-only view of one ELF32 relocatable object. Section and symbol accessors
/// borrow straight from the input bytes; nothing here is mutated after parse.
pub(crate) struct File<'data> {
    pub(crate) data: &'data [u8],
    pub(crate) sections: SectionTable<'data>,
    pub(crate) symbols: SymbolTable<'data>,
}

impl<'data> std::fmt::Debug for File<'data> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("data", &self.data).finish()
    }
}

impl<'data> File<'data> {
    pub(crate) fn parse(data: &'data [u8]) -> Result<Self> {
        if !data.starts_with(&object::elf::ELFMAG) {
            bail!("Not an ELF file");
        }
        let class = data.get(4usize).copied().unwrap_or(0);
        if class != object::elf::ELFCLASS32 {
            bail!("Unsupported ELF class {class}, expected ELF32");
        }
        if data.get(5usize).copied() != Some(object::elf::ELFDATA2LSB) {
            bail!("Only little endian is currently supported");
        }
        let header = FileHeader::parse(data)?;
        let e = LittleEndian;

        let file_type = header.e_type.get(e);
        if file_type != object::elf::ET_REL {
            bail!("Unexpected ELF type {file_type}");
        }
        let segment_count = header.e_phnum.get(e);
        if segment_count != 0 {
            bail!("Unexpected segment count {segment_count}");
        }

        let sections = header.sections(e, data)?;
        let mut symbols = SymbolTable::default();
        for (section_index, section) in sections.enumerate() {
            if section.sh_type(e) == object::elf::SHT_SYMTAB {
                symbols = SymbolTable::parse(e, data, &sections, section_index, section)?;
                break;
            }
        }

        Ok(Self {
            data,
            sections,
            symbols,
        })
    }

    pub(crate) fn raw_section_data(&self, section: &SectionHeader) -> Result<&'data [u8]> {
        Ok(section.data(LittleEndian, self.data)?)
    }

    /// Relocation entries of a `SHT_REL` section. This format carries no addends;
    /// the addend lives in the opcode word being patched.
    pub(crate) fn rel_entries(&self, section: &SectionHeader) -> Result<&'data [Rel]> {
        Ok(section
            .rel(LittleEndian, self.data)?
            .map_or(&[][..], |(rel, _)| rel))
    }

    pub(crate) fn symbol(&self, index: object::SymbolIndex) -> Result<&'data Symbol> {
        Ok(self.symbols.symbol(index)?)
    }

    pub(crate) fn symbol_name(&self, symbol: &Symbol) -> Result<&'data [u8]> {
        Ok(self.symbols.symbol_name(LittleEndian, symbol)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 52-byte ELF32 header with no sections. Enough to drive the load checks.
    fn minimal_header(class: u8, endian: u8, e_type: u16, phnum: u16) -> Vec<u8> {
        let mut data = vec![0u8; 52];
        data[..4].copy_from_slice(&object::elf::ELFMAG);
        data[4usize] = class;
        data[5usize] = endian;
        data[6usize] = 1;
        data[16..18].copy_from_slice(&e_type.to_le_bytes());
        data[18..20].copy_from_slice(&8u16.to_le_bytes()); // e_machine
        data[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
        data[40..42].copy_from_slice(&52u16.to_le_bytes()); // e_ehsize
        data[44..46].copy_from_slice(&phnum.to_le_bytes());
        data[46..48].copy_from_slice(&40u16.to_le_bytes()); // e_shentsize
        data
    }

    #[test]
    fn accepts_minimal_relocatable() {
        let data = minimal_header(
            object::elf::ELFCLASS32,
            object::elf::ELFDATA2LSB,
            object::elf::ET_REL,
            0,
        );
        let file = File::parse(&data).unwrap();
        assert_eq!(file.sections.enumerate().count(), 0);
    }

    #[test]
    fn rejects_elf64() {
        let data = minimal_header(
            object::elf::ELFCLASS64,
            object::elf::ELFDATA2LSB,
            object::elf::ET_REL,
            0,
        );
        let err = File::parse(&data).unwrap_err();
        assert!(err.to_string().contains("ELF class"));
    }

    #[test]
    fn rejects_big_endian() {
        let data = minimal_header(
            object::elf::ELFCLASS32,
            object::elf::ELFDATA2MSB,
            object::elf::ET_REL,
            0,
        );
        assert!(File::parse(&data).is_err());
    }

    #[test]
    fn rejects_executables() {
        let data = minimal_header(
            object::elf::ELFCLASS32,
            object::elf::ELFDATA2LSB,
            object::elf::ET_EXEC,
            0,
        );
        let err = File::parse(&data).unwrap_err();
        assert!(err.to_string().contains("ELF type"));
    }

    #[test]
    fn rejects_objects_with_segments() {
        let data = minimal_header(
            object::elf::ELFCLASS32,
            object::elf::ELFDATA2LSB,
            object::elf::ET_REL,
            1,
        );
        let err = File::parse(&data).unwrap_err();
        assert!(err.to_string().contains("segment count"));
    }
}
