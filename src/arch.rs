//! The contract between the relocation engine and the architecture backend. The
//! engine decides where everything goes; the backend knows how an address gets
//! encoded into an instruction word for its ISA.

use crate::error::Result;

/// The symbol classes the engine distinguishes. Everything else in the ELF type
/// space is `None` as far as relocation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolKind {
    #[default]
    None,
    Object,
    Function,
}

impl SymbolKind {
    pub(crate) fn from_st_type(st_type: u8) -> SymbolKind {
        match st_type {
            object::elf::STT_OBJECT => SymbolKind::Object,
            object::elf::STT_FUNC => SymbolKind::Function,
            _ => SymbolKind::None,
        }
    }
}

/// The exchange record passed to the backend for each relocation. The engine fills
/// in the opcode word, its final address and the resolved base; the backend may
/// adjust `symbol_address` (e.g. to encode an instruction-set bit) and rewrites
/// `opcode`.
#[derive(Debug, Clone, Default)]
pub struct RelocationData {
    pub opcode: u32,
    /// Address the opcode will occupy in the final image.
    pub opcode_offset: u32,
    pub relocation_base: u32,
    pub symbol_address: u32,
    pub target_symbol_kind: SymbolKind,
    /// ISA-private per-symbol state, carried between the backend and the label table.
    pub target_symbol_info: u64,
}

pub trait Arch {
    /// Gives the backend a chance to adjust a symbol's raw section-relative
    /// address before the engine uses it. Implementations must write
    /// `data.symbol_address` (adjusted or not) and record `kind` in
    /// `data.target_symbol_kind`; the engine reads the latter to tell external
    /// references apart from section-relative ones.
    fn set_symbol_address(&self, data: &mut RelocationData, address: u32, kind: SymbolKind);

    /// Patches `data.opcode` according to `reloc_type`. Failures are reported to
    /// the host via the diagnostic queue; they don't abort the pass.
    fn relocate_opcode(&self, reloc_type: u32, data: &mut RelocationData) -> Result<()>;
}
