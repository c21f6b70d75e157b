//! End-to-end scenarios and cross-cutting invariants (spec §8), run
//! against the public `compile` entry point.

use std::collections::HashSet;

use ifj23c::{compile, CompilerConfig};

fn run(src: &str) -> String {
    compile(src, &CompilerConfig::default()).expect("program should compile")
}

#[test]
fn scenario_arithmetic_precedence() {
    let out = run("let x = 5 + 2 * 3");
    assert!(out.contains("PUSHS int@5"));
    assert!(out.contains("PUSHS int@2"));
    assert!(out.contains("PUSHS int@3"));
    assert!(out.contains("MULS"));
    assert!(out.contains("ADDS"));
    assert!(!out.contains("while") && !out.contains("LOOP"));
}

#[test]
fn scenario_literal_promotion_on_declaration() {
    let out = run("let y : Double = 5 + 1");
    assert!(out.contains("INT2FLOAT"));
}

#[test]
fn scenario_if_let_shadowing() {
    let out = run("let a : Int? = nil\nif let a {\nwrite(a)\n} else {\nwrite(0)\n}");
    assert!(out.contains("JUMPIFEQ iflet&else1"));
    assert!(out.contains("WRITE"));
}

#[test]
fn scenario_forward_reference_reconciles() {
    let out = run("foo(5)\nfunc foo(_ n: Int) -> Int {\nreturn n\n}");
    assert!(out.contains("CALL !foo"));

    let err = compile(
        "foo(5)\nfunc foo(wrong n: Int) -> Int {\nreturn n\n}",
        &CompilerConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), 4);
}

#[test]
fn scenario_loop_hoists_declaration_before_entry_label() {
    let out = run("var x = 0\nwhile x < 10 {\nvar t = x\nx = x + 1\n}");
    let defvar_pos = out.find("DEFVAR GF@t$1").expect("t should be declared");
    let label_pos = out.find("LABEL while&start1").expect("loop entry label should exist");
    assert!(defvar_pos < label_pos, "hoisted declaration must precede the loop entry label");

    let between = &out[label_pos..out.find("JUMP while&start1").unwrap()];
    assert!(!between.contains("DEFVAR"), "no DEFVAR may appear between entry label and back-edge");
}

#[test]
fn scenario_string_concatenation() {
    let out = run("let s = \"a\" + \" b\"");
    assert!(out.contains("CONCAT GF@tmp3 GF@tmp1 GF@tmp2"));
    assert!(out.contains("PUSHS GF@tmp3"));
}

#[test]
fn invariant_labels_are_emitted_at_most_once() {
    let out = run(
        "var i = 0\nwhile i < 3 {\ni = i + 1\n}\nvar j = 0\nwhile j < 3 {\nj = j + 1\n}\nif i < j {\nwrite(1)\n} else {\nwrite(2)\n}",
    );
    let mut seen: HashSet<&str> = HashSet::new();
    for line in out.lines() {
        if let Some(name) = line.strip_prefix("LABEL ") {
            assert!(seen.insert(name), "label {name} emitted more than once");
        }
    }
}

#[test]
fn invariant_defvar_codenames_are_emitted_at_most_once() {
    let out = run("var a = 1\nvar b = 2\nwhile a < 10 {\nvar c = a\na = a + c\n}");
    let mut seen: HashSet<&str> = HashSet::new();
    for line in out.lines() {
        if let Some(name) = line.strip_prefix("DEFVAR ") {
            assert!(seen.insert(name), "DEFVAR {name} emitted more than once");
        }
    }
}

#[test]
fn invariant_double_round_trips_through_hex_float() {
    let out = run("let pi = 3.5");
    assert!(out.contains("float@0x1."));
}

#[test]
fn invariant_program_has_fixed_section_order() {
    let out = run("write(\"hi\")");
    let header = out.find(".IFJcode23").unwrap();
    let jump_main = out.find("JUMP !main").unwrap();
    let label_main = out.find("LABEL !main").unwrap();
    let exit = out.find("EXIT int@0").unwrap();
    assert!(header < jump_main);
    assert!(jump_main < label_main);
    assert!(label_main < exit);
}

#[test]
fn scope_shadowing_does_not_clobber_outer_binding() {
    let out = run("let x = 1\nif true {\nlet x = 2\nwrite(x)\n} else {\nwrite(0)\n}\nwrite(x)");
    assert!(out.contains("PUSHS int@1"));
    assert!(out.contains("PUSHS int@2"));
}

#[test]
fn if_return_unification_lets_both_arms_satisfy_a_function() {
    let out = run("func f() -> Int {\nif true {\nreturn 1\n} else {\nreturn 2\n}\n}");
    assert!(out.contains("LABEL !f"));
}

#[test]
fn substring_helper_is_inlined_only_when_called() {
    let without = run("write(\"hi\")");
    assert!(!without.contains("LABEL !substring"));

    let with = run("let s = substring(of: \"hello\", startingAt: 0, endingBefore: 3)\nwrite(s)");
    assert!(with.contains("LABEL !substring"));
}

#[test]
fn unreachable_builtin_combo_reports_type_error_for_bad_argument() {
    let err = compile("write(1)\nlength(5)", &CompilerConfig::default()).unwrap_err();
    assert_eq!(err.code(), 6);
}
