use crate::arch::Arch;
use crate::arch::RelocationData;
use crate::arch::SymbolKind;
use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::hash::hash_bytes;
use crate::input_data::InputData;
use crate::labels::LabelTable;
use crate::layout;
use crate::layout::ObjectRecord;
use crate::symbol_data::DataWidth;
use crate::symbol_data::SymbolDataSink;
use anyhow::Context as _;

/// Imports relocatable objects into the host assembler's address space.
///
/// The host drives it in this order: [`Relocator::new`] once per input,
/// [`Relocator::export_symbols`] to claim labels, then [`Relocator::relocate`]
/// repeatedly until [`Relocator::data_changed`] stays false, and finally
/// [`Relocator::write_symbols`] when debug output is wanted. The parsed objects
/// borrow from the [`InputData`], and the architecture backend is borrowed for
/// the relocator's whole life.
pub struct Relocator<'data> {
    arch: &'data dyn Arch,
    files: Vec<ObjectRecord<'data>>,
    output: Vec<u8>,
    data_changed: bool,
    diagnostics: Diagnostics,
}

impl<'data> std::fmt::Debug for Relocator<'data> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relocator")
            .field("files", &self.files.len())
            .field("output", &self.output)
            .field("data_changed", &self.data_changed)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl<'data> Relocator<'data> {
    pub fn new(input: &'data InputData, arch: &'data dyn Arch) -> Result<Self> {
        let mut files = Vec::new();
        for (name, bytes) in input.members() {
            let file = ObjectRecord::parse(name.to_owned(), bytes)
                .with_context(|| format!("Could not load object file {name}"))?;
            tracing::debug!(
                file = name,
                sections = file.sections.len(),
                symbols = file.symbols.len(),
                "parsed object"
            );
            files.push(file);
        }
        Ok(Self {
            arch,
            files,
            output: Vec::new(),
            data_changed: false,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Claims a label in the host's symbol table for every exportable symbol of
    /// every object. Safe to call once per assembler pass; symbols that already
    /// hold a label are skipped. Returns false if any claim failed, with the
    /// details queued as diagnostics.
    pub fn export_symbols(&mut self, labels: &mut dyn LabelTable) -> bool {
        let mut ok = true;
        for file in &mut self.files {
            for symbol in &mut file.symbols {
                if symbol.label.is_some() {
                    continue;
                }

                let Some(label) = labels.get_label(&symbol.name) else {
                    self.diagnostics
                        .error(format!("Invalid label name \"{}\"", symbol.name));
                    ok = false;
                    continue;
                };
                if labels.is_defined(label) {
                    self.diagnostics
                        .error(format!("Label \"{}\" already defined", symbol.name));
                    ok = false;
                    continue;
                }

                // Let the backend adjust the address and attach its per-symbol
                // info before anything references the label. The real value is
                // filled in by the relocation pass.
                let mut data = RelocationData {
                    symbol_address: symbol.relative_address,
                    ..RelocationData::default()
                };
                self.arch
                    .set_symbol_address(&mut data, symbol.relative_address, symbol.kind);
                symbol.relative_address = data.symbol_address;

                labels.set_info(label, data.target_symbol_info);
                labels.set_update_info(label, false);
                labels.set_value(label, 0);
                labels.set_defined(label, true);
                symbol.label = Some(label);
            }
        }
        ok
    }

    /// One convergence pass: lays out all objects starting at `*memory_address`,
    /// applies relocations and updates every bound label. On return
    /// `*memory_address` holds the number of bytes consumed. Returns false if any
    /// diagnostics were queued during the pass.
    #[tracing::instrument(skip_all, name = "Relocate")]
    pub fn relocate(&mut self, labels: &mut dyn LabelTable, memory_address: &mut u32) -> bool {
        let old_hash = hash_bytes(&self.output);
        self.output.clear();
        self.data_changed = false;

        let mut ok = true;
        let start = *memory_address;
        for file in &mut self.files {
            ok &= layout::relocate_object(
                file,
                self.arch,
                labels,
                &mut self.output,
                memory_address,
                &mut self.data_changed,
                &mut self.diagnostics,
            );
        }

        if hash_bytes(&self.output) != old_hash {
            self.data_changed = true;
        }
        *memory_address -= start;
        tracing::debug!(
            consumed = *memory_address,
            data_changed = self.data_changed,
            "relocation pass done"
        );
        ok
    }

    /// Emits every exportable symbol's final address and extent into `sink`.
    pub fn write_symbols(&self, sink: &mut dyn SymbolDataSink) {
        for file in &self.files {
            for symbol in &file.symbols {
                sink.add_label(symbol.relocated_address, &symbol.name);
                match symbol.kind {
                    SymbolKind::Object => {
                        sink.add_data(symbol.relocated_address, symbol.size, DataWidth::Byte);
                    }
                    SymbolKind::Function => {
                        sink.start_function(symbol.relocated_address);
                        sink.end_function(symbol.relocated_address + symbol.size);
                    }
                    SymbolKind::None => {}
                }
            }
        }
    }

    /// The flat image built by the last pass, indexed by final address minus the
    /// pass base address.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Whether the last pass produced different addresses or bytes than the pass
    /// before it. The host re-runs `relocate` while this is set, up to its own
    /// convergence bound.
    pub fn data_changed(&self) -> bool {
        self.data_changed
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }
}
