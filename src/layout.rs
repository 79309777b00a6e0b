//! Per-object layout and relocation. For each object this assigns every loadable
//! section an address above the running cursor, patches the section bytes
//! according to its relocation entries, copies the result into the output image
//! and finalises the addresses of the object's exportable symbols.
//!
//! Section bytes are always patched in a working copy. The parsed object keeps
//! its original bytes, which is what lets the host run the whole thing again and
//! get the same result once addresses have settled.

use crate::arch::Arch;
use crate::arch::RelocationData;
use crate::arch::SymbolKind;
use crate::diagnostics::Diagnostics;
use crate::elf;
use crate::error::Result;
use crate::labels::fold_label_name;
use crate::labels::LabelId;
use crate::labels::LabelTable;
use hashbrown::HashMap;
use object::read::elf::SectionHeader as _;
use object::LittleEndian;

/// A loadable section paired with the relocation section that targets it, if any.
pub(crate) struct SectionRecord<'data> {
    /// Index in the object's section table. Relocation entries and symbols refer
    /// to sections by this index.
    pub(crate) index: usize,
    pub(crate) header: &'data elf::SectionHeader,
    pub(crate) rel: Option<&'data elf::SectionHeader>,
}

/// Bookkeeping for one exportable symbol. `relative_address` starts out
/// section-relative and may be rewritten by the backend at bind time;
/// `relocated_address` is recomputed every pass.
pub(crate) struct SymbolRecord {
    pub(crate) name: String,
    pub(crate) section: u16,
    pub(crate) relative_address: u32,
    pub(crate) relocated_address: u32,
    pub(crate) size: u32,
    pub(crate) kind: SymbolKind,
    pub(crate) label: Option<LabelId>,
}

pub(crate) struct ObjectRecord<'data> {
    pub(crate) name: String,
    pub(crate) object: elf::File<'data>,
    pub(crate) sections: Vec<SectionRecord<'data>>,
    pub(crate) symbols: Vec<SymbolRecord>,
}

impl<'data> ObjectRecord<'data> {
    pub(crate) fn parse(name: String, data: &'data [u8]) -> Result<Self> {
        let object = elf::File::parse(data)?;
        let e = LittleEndian;

        let mut sections = Vec::new();
        for (index, header) in object.sections.enumerate() {
            if header.sh_flags(e) & object::elf::SHF_ALLOC == 0 {
                continue;
            }
            let sh_type = header.sh_type(e);
            if sh_type != object::elf::SHT_PROGBITS && sh_type != object::elf::SHT_NOBITS {
                continue;
            }
            let rel = object
                .sections
                .enumerate()
                .find(|(_, candidate)| {
                    candidate.sh_type(e) == object::elf::SHT_REL
                        && candidate.sh_info(e) as usize == index.0
                })
                .map(|(_, candidate)| candidate);
            sections.push(SectionRecord {
                index: index.0,
                header,
                rel,
            });
        }

        let mut symbols = Vec::new();
        for symbol in object.symbols.iter() {
            let kind = SymbolKind::from_st_type(symbol.st_type());
            if kind == SymbolKind::None {
                continue;
            }
            let symbol_name = object.symbol_name(symbol)?;
            symbols.push(SymbolRecord {
                name: fold_label_name(symbol_name),
                section: symbol.st_shndx.get(e),
                relative_address: symbol.st_value.get(e),
                relocated_address: 0,
                size: symbol.st_size.get(e),
                kind,
                label: None,
            });
        }

        Ok(ObjectRecord {
            name,
            object,
            sections,
            symbols,
        })
    }
}

/// Sections with no declared alignment occur in practice; both 0 and 1 mean
/// "place anywhere".
fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    value.next_multiple_of(alignment)
}

/// Lays out and relocates one object, advancing `relocation_address` past
/// everything it placed. Returns false if any diagnostic-worthy problem was hit;
/// the rest of the object is still processed.
pub(crate) fn relocate_object(
    file: &mut ObjectRecord,
    arch: &dyn Arch,
    labels: &mut dyn LabelTable,
    output: &mut Vec<u8>,
    relocation_address: &mut u32,
    data_changed: &mut bool,
    diagnostics: &mut Diagnostics,
) -> bool {
    let e = LittleEndian;
    let start = *relocation_address;

    // Assign every loadable section an address, in section-table order.
    let mut relocation_offsets: HashMap<usize, u32> = HashMap::new();
    for entry in &file.sections {
        *relocation_address = align_up(*relocation_address, entry.header.sh_addralign(e));
        relocation_offsets.insert(entry.index, *relocation_address);
        *relocation_address += entry.header.sh_size(e);
    }

    let data_start = output.len();
    output.resize(data_start + (*relocation_address - start) as usize, 0);

    let mut ok = true;
    for entry in &file.sections {
        if entry.header.sh_type(e) == object::elf::SHT_NOBITS {
            // The zero fill from the resize above is all a NOBITS section needs.
            continue;
        }
        let section_address = relocation_offsets[&entry.index];

        let mut section_data = match file.object.raw_section_data(entry.header) {
            Ok(data) => data.to_vec(),
            Err(error) => {
                diagnostics.error(format!(
                    "Cannot read section {} of {}: {error}",
                    entry.index, file.name
                ));
                ok = false;
                continue;
            }
        };

        if let Some(rel_header) = entry.rel {
            match file.object.rel_entries(rel_header) {
                Ok(entries) => {
                    for rel in entries {
                        ok &= apply_relocation(
                            &file.object,
                            rel,
                            section_address,
                            &relocation_offsets,
                            &mut section_data,
                            arch,
                            labels,
                            diagnostics,
                        );
                    }
                }
                Err(error) => {
                    diagnostics.error(format!(
                        "Cannot read relocations for section {} of {}: {error}",
                        entry.index, file.name
                    ));
                    ok = false;
                }
            }
        }

        let out_start = data_start + (section_address - start) as usize;
        output[out_start..out_start + section_data.len()].copy_from_slice(&section_data);
        tracing::trace!(
            section = entry.index,
            address = section_address,
            size = section_data.len(),
            "placed section"
        );
    }

    finalise_symbols(
        file,
        &relocation_offsets,
        labels,
        output,
        relocation_address,
        data_changed,
    );

    ok
}

fn apply_relocation(
    object: &elf::File,
    rel: &elf::Rel,
    section_address: u32,
    relocation_offsets: &HashMap<usize, u32>,
    section_data: &mut [u8],
    arch: &dyn Arch,
    labels: &mut dyn LabelTable,
    diagnostics: &mut Diagnostics,
) -> bool {
    let e = LittleEndian;
    let offset = rel.r_offset.get(e) as usize;

    let symbol_index = rel.r_sym(e);
    if symbol_index == 0 {
        diagnostics.warning(format!("Invalid symbol num {symbol_index:06X}"));
        return false;
    }
    let symbol = match object.symbol(object::SymbolIndex(symbol_index as usize)) {
        Ok(symbol) => symbol,
        Err(_) => {
            diagnostics.error(format!("Invalid symbol num {symbol_index:06X}"));
            return false;
        }
    };

    let Some(opcode_bytes) = section_data.get(offset..offset + 4) else {
        diagnostics.error(format!(
            "Relocation offset {offset:#X} lies outside its section"
        ));
        return false;
    };
    let mut data = RelocationData {
        opcode: u32::from_le_bytes(opcode_bytes.try_into().unwrap()),
        opcode_offset: section_address + offset as u32,
        ..RelocationData::default()
    };
    arch.set_symbol_address(
        &mut data,
        symbol.st_value.get(e),
        SymbolKind::from_st_type(symbol.st_type()),
    );

    let symbol_section = symbol.st_shndx.get(e);
    if data.target_symbol_kind == SymbolKind::None && symbol_section == object::elf::SHN_UNDEF {
        // External; resolve through the host's symbol table.
        let name = match object.symbol_name(symbol) {
            Ok(name) => fold_label_name(name),
            Err(error) => {
                diagnostics.error(format!("Cannot read name of symbol {symbol_index}: {error}"));
                return false;
            }
        };
        let Some(label) = labels.get_label(&name) else {
            diagnostics.error(format!("Invalid external symbol {name}"));
            return false;
        };
        if !labels.is_defined(label) {
            diagnostics.error(format!("Undefined external symbol {name}"));
            return false;
        }
        data.relocation_base = labels.value(label);
        data.target_symbol_kind = if labels.is_data(label) {
            SymbolKind::Object
        } else {
            SymbolKind::Function
        };
        data.target_symbol_info = labels.info(label);
    } else {
        let section_offset = relocation_offsets
            .get(&(symbol_section as usize))
            .copied()
            .unwrap_or(0);
        data.relocation_base = section_offset.wrapping_add(data.symbol_address);
    }

    if let Err(error) = arch.relocate_opcode(rel.r_type(e), &mut data) {
        diagnostics.error(error.to_string());
        return false;
    }
    section_data[offset..offset + 4].copy_from_slice(&data.opcode.to_le_bytes());
    true
}

/// Computes the final address of every exportable symbol of `file` and pushes it
/// into the bound label. COMMON symbols get their storage allocated here, above
/// everything laid out so far; their `relative_address` holds the alignment
/// constraint.
fn finalise_symbols(
    file: &mut ObjectRecord,
    relocation_offsets: &HashMap<usize, u32>,
    labels: &mut dyn LabelTable,
    output: &mut Vec<u8>,
    relocation_address: &mut u32,
    data_changed: &mut bool,
) {
    for symbol in &mut file.symbols {
        let old_address = symbol.relocated_address;

        symbol.relocated_address = match symbol.section {
            object::elf::SHN_ABS => symbol.relative_address,
            object::elf::SHN_COMMON => {
                let common_start = *relocation_address;
                let address = align_up(common_start, symbol.relative_address);
                *relocation_address = address + symbol.size;
                let grow = (*relocation_address - common_start) as usize;
                output.resize(output.len() + grow, 0);
                address
            }
            section_index => {
                let section_offset = relocation_offsets
                    .get(&(section_index as usize))
                    .copied()
                    .unwrap_or(0);
                symbol.relative_address.wrapping_add(section_offset)
            }
        };

        if let Some(label) = symbol.label {
            labels.set_value(label, symbol.relocated_address);
        }
        if old_address != symbol.relocated_address {
            *data_changed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_handles_missing_alignment() {
        assert_eq!(align_up(13, 0), 13);
        assert_eq!(align_up(13, 1), 13);
    }

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 4), 20);
    }
}
