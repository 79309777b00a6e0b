//! Relocation engine for ELF32 relocatable objects.
//!
//! Given a `.o` file or an `ar` archive of them, this crate lays the loadable
//! sections out contiguously above a caller-supplied base address, applies the
//! machine-specific relocation records through a pluggable [`Arch`] backend,
//! resolves external references against the host assembler's global symbol
//! table, and publishes the final address of every defined symbol back to that
//! table. The result is a flat byte image, not an ELF file.
//!
//! Addresses can shift between assembler passes, so the engine is built to run
//! repeatedly: each [`Relocator::relocate`] call recomputes the image from the
//! original section bytes and reports through [`Relocator::data_changed`]
//! whether anything moved. The host loops until that settles.

pub(crate) mod arch;
pub(crate) mod archive;
pub(crate) mod diagnostics;
pub(crate) mod elf;
pub mod error;
pub(crate) mod file_kind;
pub(crate) mod hash;
pub(crate) mod input_data;
pub(crate) mod labels;
pub(crate) mod layout;
pub(crate) mod relocator;
pub(crate) mod symbol_data;

pub use crate::arch::Arch;
pub use crate::arch::RelocationData;
pub use crate::arch::SymbolKind;
pub use crate::diagnostics::Diagnostic;
pub use crate::diagnostics::Diagnostics;
pub use crate::diagnostics::Severity;
pub use crate::error::Result;
pub use crate::input_data::InputData;
pub use crate::labels::LabelId;
pub use crate::labels::LabelTable;
pub use crate::relocator::Relocator;
pub use crate::symbol_data::DataWidth;
pub use crate::symbol_data::SymbolDataSink;
