//! Scoped symbol table: lexical blocks, forward-reference function
//! records, and per-block "has-return" tracking (§4.1, §4.6).

use std::collections::HashMap;

use crate::diagnostics::CompileError;
use crate::types::Type;

/// Signature of a `Func`-typed symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub return_type: Type,
    pub param_names: Vec<String>,
    pub param_ids: Vec<String>,
    pub param_types: Vec<Type>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        debug_assert_eq!(self.param_names.len(), self.param_ids.len());
        debug_assert_eq!(self.param_names.len(), self.param_types.len());
        self.param_names.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub ty: Type,
    pub codename: String,
    pub initialized: bool,
    pub immutable: bool,
    pub signature: Option<Signature>,
}

impl SymbolEntry {
    pub fn variable(ty: Type, codename: impl Into<String>, immutable: bool, initialized: bool) -> Self {
        SymbolEntry { ty, codename: codename.into(), initialized, immutable, signature: None }
    }

    pub fn function(codename: impl Into<String>, signature: Signature, initialized: bool) -> Self {
        SymbolEntry {
            ty: Type::Func,
            codename: codename.into(),
            initialized,
            immutable: true,
            signature: Some(signature),
        }
    }
}

struct Block {
    vars: HashMap<String, SymbolEntry>,
    has_return: bool,
}

impl Block {
    fn new() -> Self {
        Block { vars: HashMap::new(), has_return: false }
    }
}

/// A call site recorded against a forward-referenced function, used to
/// diagnose `SemRedef` if the function is never defined (§4.6).
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub name: String,
    pub line: u32,
    pub column: u32,
}

pub struct SymbolTable {
    global: HashMap<String, SymbolEntry>,
    blocks: Vec<Block>,
    must_be_defined: Vec<PendingCall>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { global: HashMap::new(), blocks: Vec::new(), must_be_defined: Vec::new() }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(Block::new());
    }

    /// Pop the innermost block, returning whether it had a return.
    pub fn pop_block(&mut self) -> bool {
        self.blocks.pop().map(|b| b.has_return).unwrap_or(false)
    }

    pub fn insert_local(
        &mut self,
        name: &str,
        entry: SymbolEntry,
        line: u32,
        column: u32,
    ) -> Result<(), CompileError> {
        let block = self.blocks.last_mut().expect("insert_local requires an open block");
        if block.vars.contains_key(name) {
            return Err(CompileError::redef(
                line,
                column,
                format!("'{name}' is already declared in this block"),
            ));
        }
        block.vars.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn insert_global(
        &mut self,
        name: &str,
        entry: SymbolEntry,
        line: u32,
        column: u32,
    ) -> Result<(), CompileError> {
        if self.global.contains_key(name) {
            return Err(CompileError::redef(line, column, format!("'{name}' is already declared")));
        }
        self.global.insert(name.to_string(), entry);
        Ok(())
    }

    /// Overwrite (or insert) a global entry unconditionally. Used by
    /// forward-reference reconciliation and by the built-in loader.
    pub fn set_global(&mut self, name: &str, entry: SymbolEntry) {
        self.global.insert(name.to_string(), entry);
    }

    /// Lookup searching inner block -> outer blocks -> global.
    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        for block in self.blocks.iter().rev() {
            if let Some(e) = block.vars.get(name) {
                return Some(e);
            }
        }
        self.global.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        for block in self.blocks.iter_mut().rev() {
            if block.vars.contains_key(name) {
                return block.vars.get_mut(name);
            }
        }
        self.global.get_mut(name)
    }

    /// Lookup restricted to the innermost block (used to diagnose shadowing
    /// within one block while permitting it across nested blocks).
    pub fn lookup_local(&self, name: &str) -> Option<&SymbolEntry> {
        self.blocks.last().and_then(|b| b.vars.get(name))
    }

    pub fn lookup_global(&self, name: &str) -> Option<&SymbolEntry> {
        self.global.get(name)
    }

    pub fn lookup_global_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        self.global.get_mut(name)
    }

    pub fn block_set_return(&mut self, flag: bool) {
        if let Some(block) = self.blocks.last_mut() {
            block.has_return = flag;
        }
    }

    pub fn block_has_return(&self) -> bool {
        self.blocks.last().map(|b| b.has_return).unwrap_or(false)
    }

    pub fn record_pending_call(&mut self, name: &str, line: u32, column: u32) {
        self.must_be_defined.push(PendingCall { name: name.to_string(), line, column });
    }

    pub fn clear_pending_call(&mut self, name: &str) {
        self.must_be_defined.retain(|c| c.name != name);
    }

    /// After the parse concludes, any entry whose function was never
    /// defined is reported as `SemRedef` (§4.6).
    pub fn check_all_defined(&self) -> Result<(), CompileError> {
        for call in &self.must_be_defined {
            if !self.global.get(&call.name).map(|e| e.initialized).unwrap_or(false) {
                return Err(CompileError::redef(
                    call.line,
                    call.column,
                    format!("function '{}' is called but never defined", call.name),
                ));
            }
        }
        Ok(())
    }

    pub fn in_local_scope(&self) -> bool {
        !self.blocks.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redef_in_same_block_is_rejected() {
        let mut st = SymbolTable::new();
        st.push_block();
        st.insert_local("x", SymbolEntry::variable(Type::Int, "LF@x$1", false, true), 1, 1).unwrap();
        let err = st
            .insert_local("x", SymbolEntry::variable(Type::Int, "LF@x$2", false, true), 2, 1)
            .unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn shadowing_across_blocks_is_allowed_and_outer_survives() {
        let mut st = SymbolTable::new();
        st.push_block();
        st.insert_local("x", SymbolEntry::variable(Type::Int, "outer", false, true), 1, 1).unwrap();
        st.push_block();
        st.insert_local("x", SymbolEntry::variable(Type::Str, "inner", false, true), 2, 1).unwrap();
        assert_eq!(st.lookup("x").unwrap().codename, "inner");
        st.pop_block();
        assert_eq!(st.lookup("x").unwrap().codename, "outer");
    }

    #[test]
    fn lookup_falls_through_to_global() {
        let mut st = SymbolTable::new();
        st.set_global("g", SymbolEntry::variable(Type::Int, "GF@g$1", false, true));
        st.push_block();
        assert_eq!(st.lookup("g").unwrap().codename, "GF@g$1");
    }

    #[test]
    fn undefined_forward_call_is_reported_at_end() {
        let mut st = SymbolTable::new();
        st.set_global(
            "foo",
            SymbolEntry::function(
                "foo",
                Signature { return_type: Type::Int, param_names: vec![], param_ids: vec![], param_types: vec![] },
                false,
            ),
        );
        st.record_pending_call("foo", 5, 1);
        let err = st.check_all_defined().unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn defined_forward_call_clears_pending() {
        let mut st = SymbolTable::new();
        st.set_global(
            "foo",
            SymbolEntry::function(
                "foo",
                Signature { return_type: Type::Int, param_names: vec![], param_ids: vec![], param_types: vec![] },
                true,
            ),
        );
        st.record_pending_call("foo", 5, 1);
        assert!(st.check_all_defined().is_ok());
    }
}
