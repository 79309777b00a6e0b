//! The contract with the host assembler's global symbol table. The engine never
//! owns labels; it holds `LabelId` handles into a table somebody else keeps alive,
//! and another assembler pass may redefine a label between relocation passes.

/// Non-owning handle to a label in the host's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// Every name crossing this boundary has already been folded to ASCII
/// lowercase by the engine.
pub trait LabelTable {
    /// Create-or-fetch by name. `None` means the table rejected the name.
    fn get_label(&mut self, name: &str) -> Option<LabelId>;

    fn is_defined(&self, label: LabelId) -> bool;
    fn value(&self, label: LabelId) -> u32;
    fn info(&self, label: LabelId) -> u64;
    /// Whether the label describes data rather than code.
    fn is_data(&self, label: LabelId) -> bool;

    fn set_value(&mut self, label: LabelId, value: u32);
    fn set_info(&mut self, label: LabelId, info: u64);
    fn set_defined(&mut self, label: LabelId, defined: bool);
    /// When false, later writes to the label must leave its info untouched.
    fn set_update_info(&mut self, label: LabelId, update: bool);
}

/// Symbol names are compared case-insensitively by the assembler, so every name
/// is folded once on the way in. The fold is ASCII-only, applied byte-wise;
/// non-ASCII bytes pass through unchanged and invalid UTF-8 is replaced.
pub(crate) fn fold_label_name(name: &[u8]) -> String {
    let mut name = String::from_utf8_lossy(name).into_owned();
    name.make_ascii_lowercase();
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_ascii_only() {
        assert_eq!(fold_label_name(b"Main"), "main");
        assert_eq!(fold_label_name(b"ALREADY_LOWER"), "already_lower");
        assert_eq!(fold_label_name("Grüße".as_bytes()), "grüße");
    }
}
