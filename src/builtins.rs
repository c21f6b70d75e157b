//! Built-in function loader (§4.7).
//!
//! Seeds the global scope with built-in signatures before parsing begins,
//! and generates inline stack-VM code for the simple built-ins at their
//! call sites. Only `substring` has its own emitted subroutine and
//! therefore requires a pushed frame.

use crate::emitter::{Emitter, TMP1, TMP2};
use crate::symtab::{Signature, SymbolEntry, SymbolTable};
use crate::types::Type;

/// Names of every built-in, for quick membership tests by the parser.
pub const BUILTIN_NAMES: &[&str] = &[
    "readString",
    "readInt",
    "readDouble",
    "write",
    "Int2Double",
    "Double2Int",
    "length",
    "ord",
    "chr",
    "substring",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Only `substring` pushes its own frame; every other built-in is inlined
/// at the call site with no `CREATEFRAME`/`PUSHFRAME`, so the caller must
/// not emit a matching `POPFRAME` for them.
pub fn creates_own_frame(name: &str) -> bool {
    name == "substring"
}

fn sig(return_type: Type, param_names: &[&str], param_types: &[Type]) -> Signature {
    Signature {
        return_type,
        param_names: param_names.iter().map(|s| s.to_string()).collect(),
        param_ids: param_names.iter().map(|s| s.to_string()).collect(),
        param_types: param_types.to_vec(),
    }
}

/// Seed the symbol table's global scope with every built-in signature.
pub fn seed_builtins(symtab: &mut SymbolTable) {
    symtab.set_global(
        "readString",
        SymbolEntry::function("readString", sig(Type::StrOpt, &[], &[]), true),
    );
    symtab.set_global("readInt", SymbolEntry::function("readInt", sig(Type::IntOpt, &[], &[]), true));
    symtab.set_global(
        "readDouble",
        SymbolEntry::function("readDouble", sig(Type::DoubleOpt, &[], &[]), true),
    );
    // write is variadic and unlabeled; arity/types are checked specially by
    // the call-site parser rather than through a fixed Signature.
    symtab.set_global("write", SymbolEntry::function("write", sig(Type::Void, &[], &[]), true));
    symtab.set_global(
        "Int2Double",
        SymbolEntry::function("Int2Double", sig(Type::Double, &["i"], &[Type::Int]), true),
    );
    symtab.set_global(
        "Double2Int",
        SymbolEntry::function("Double2Int", sig(Type::Int, &["d"], &[Type::Double]), true),
    );
    symtab.set_global("length", SymbolEntry::function("length", sig(Type::Int, &["s"], &[Type::Str]), true));
    symtab.set_global("ord", SymbolEntry::function("ord", sig(Type::Int, &["s"], &[Type::Str]), true));
    symtab.set_global("chr", SymbolEntry::function("chr", sig(Type::Str, &["i"], &[Type::Int]), true));
    symtab.set_global(
        "substring",
        SymbolEntry::function(
            "substring",
            sig(
                Type::StrOpt,
                &["of", "startingAt", "endingBefore"],
                &[Type::Str, Type::Int, Type::Int],
            ),
            true,
        ),
    );
}

/// Emit inline code for a simple (non-`substring`) built-in call, given the
/// already-pushed-argument codenames. Returns the codenames in call order.
///
/// `write` is variadic: each argument is emitted as its own `WRITE`
/// instruction as soon as it is parsed (matching the original's eager
/// emission; a later malformed argument may leave a partial sequence of
/// `WRITE`s in the buffer, but that buffer is only printed on success).
pub fn emit_write_arg(emitter: &mut Emitter, arg_codename: &str) {
    emitter.emit(&["WRITE", arg_codename]);
}

/// Emit inline code for the other scalar built-ins. `args` holds exactly the
/// codenames required by that built-in's signature, in declared order.
pub fn emit_inline_call(emitter: &mut Emitter, name: &str, args: &[String]) {
    match name {
        "Int2Double" => {
            emitter.emit(&["PUSHS", args[0].as_str()]);
            emitter.emit(&["INT2FLOATS"]);
        }
        "Double2Int" => {
            emitter.emit(&["PUSHS", args[0].as_str()]);
            emitter.emit(&["FLOAT2INTS"]);
        }
        "length" => {
            let tmp1 = format!("GF@{TMP1}");
            emitter.emit(&["STRLEN", tmp1.as_str(), args[0].as_str()]);
            emitter.emit(&["PUSHS", tmp1.as_str()]);
        }
        "ord" => {
            let tmp1 = format!("GF@{TMP1}");
            let tmp2 = format!("GF@{TMP2}");
            let empty_label = emitter.new_label("ord", "empty");
            emitter.emit(&["MOVE", tmp1.as_str(), "int@0"]);
            emitter.emit(&["STRLEN", tmp2.as_str(), args[0].as_str()]);
            emitter.emit(&["JUMPIFEQ", empty_label.as_str(), tmp2.as_str(), "int@0"]);
            emitter.emit(&["STRI2INT", tmp1.as_str(), args[0].as_str(), "int@0"]);
            emitter.emit(&["LABEL", empty_label.as_str()]);
            emitter.emit(&["PUSHS", tmp1.as_str()]);
        }
        "chr" => {
            emitter.emit(&["PUSHS", args[0].as_str()]);
            emitter.emit(&["INT2CHARS"]);
        }
        "readString" => {
            let tmp1 = format!("GF@{TMP1}");
            emitter.emit(&["READ", tmp1.as_str(), "string"]);
            emitter.emit(&["PUSHS", tmp1.as_str()]);
        }
        "readInt" => {
            let tmp1 = format!("GF@{TMP1}");
            emitter.emit(&["READ", tmp1.as_str(), "int"]);
            emitter.emit(&["PUSHS", tmp1.as_str()]);
        }
        "readDouble" => {
            let tmp1 = format!("GF@{TMP1}");
            emitter.emit(&["READ", tmp1.as_str(), "float"]);
            emitter.emit(&["PUSHS", tmp1.as_str()]);
        }
        other => unreachable!("{other} is not an inline built-in"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_every_builtin_name() {
        let mut st = SymbolTable::new();
        seed_builtins(&mut st);
        for name in BUILTIN_NAMES {
            assert!(st.lookup_global(name).is_some(), "{name} should be seeded");
        }
    }

    #[test]
    fn substring_is_the_only_frame_creating_builtin() {
        assert!(creates_own_frame("substring"));
        assert!(!creates_own_frame("length"));
        assert!(!creates_own_frame("write"));
    }

    #[test]
    fn length_emits_strlen_then_pushs() {
        let mut e = Emitter::new();
        emit_inline_call(&mut e, "length", &["GF@s$0".to_string()]);
        e.emit(&["NOP_MARKER"]);
        let program = e.finish();
        assert!(program.contains("STRLEN GF@tmp1 GF@s$0"));
        assert!(program.contains("PUSHS GF@tmp1"));
    }

    #[test]
    fn ord_guards_empty_string_with_unique_label() {
        let mut e = Emitter::new();
        emit_inline_call(&mut e, "ord", &["GF@s$0".to_string()]);
        let program = e.finish();
        assert!(program.contains("JUMPIFEQ ord&empty1 GF@tmp2 int@0"));
        assert!(program.contains("LABEL ord&empty1"));
    }
}
