//! Code emitter: buffers instruction lines into *global* or *function*
//! streams, mints unique labels and variable codenames, and defers
//! loop-hoisted declarations (§4.2).

use std::collections::HashMap;
use std::fmt::Write as _;

/// Three reserved scratch registers used by the expression analyzer for
/// binary operator lowering and promotion (§4.4).
pub const TMP1: &str = "tmp1";
pub const TMP2: &str = "tmp2";
pub const TMP3: &str = "tmp3";

const SUBSTRING_HELPER: &str = include_str!("substring.ifjcode");

pub struct Emitter {
    global: Vec<String>,
    functions: Vec<String>,
    /// `DEFVAR` lines declared while inside the outermost loop, recorded
    /// by codename so a single loop never hoists the same variable twice.
    pending_hoists: Vec<(String, String)>,
    hoisted_codenames: std::collections::HashSet<String>,
    in_function: bool,
    loop_depth: u32,
    outermost_loop_label: Option<String>,
    label_counters: HashMap<(String, String), u64>,
    var_counters: HashMap<(String, String), u64>,
    substring_used: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            global: Vec::new(),
            functions: Vec::new(),
            pending_hoists: Vec::new(),
            hoisted_codenames: std::collections::HashSet::new(),
            in_function: false,
            loop_depth: 0,
            outermost_loop_label: None,
            label_counters: HashMap::new(),
            var_counters: HashMap::new(),
            substring_used: false,
        }
    }

    fn active_buffer(&mut self) -> &mut Vec<String> {
        if self.in_function {
            &mut self.functions
        } else {
            &mut self.global
        }
    }

    /// Append one instruction line, built from whitespace-separated parts.
    pub fn emit(&mut self, parts: &[&str]) {
        let line = parts.join(" ");
        self.active_buffer().push(line);
    }

    pub fn enter_function(&mut self) {
        self.in_function = true;
    }

    pub fn exit_function(&mut self) {
        self.in_function = false;
    }

    /// Enter a `while` loop, returning `true` if this is the outermost one.
    pub fn enter_loop(&mut self, entry_label: &str) -> bool {
        let outermost = self.loop_depth == 0;
        if outermost {
            self.outermost_loop_label = Some(entry_label.to_string());
        }
        self.loop_depth += 1;
        outermost
    }

    pub fn is_inside_loop(&self) -> bool {
        self.loop_depth > 0
    }

    /// Leave a `while` loop. When the outermost loop closes, splices all
    /// pending hoisted `DEFVAR`s immediately before its entry label.
    pub fn exit_loop(&mut self) {
        self.loop_depth -= 1;
        if self.loop_depth == 0 {
            if let Some(label) = self.outermost_loop_label.take() {
                self.flush_loop_hoists(&label);
            }
        }
    }

    /// Declare a variable. Inside the outermost loop the `DEFVAR` is
    /// deferred to the pending-hoist set instead of being emitted in place.
    pub fn declare_var(&mut self, codename: &str) {
        let defvar = format!("DEFVAR {codename}");
        if self.is_inside_loop() {
            if self.hoisted_codenames.insert(codename.to_string()) {
                self.pending_hoists.push((codename.to_string(), defvar));
            }
        } else {
            self.active_buffer().push(defvar);
        }
    }

    fn flush_loop_hoists(&mut self, loop_entry_label: &str) {
        if self.pending_hoists.is_empty() {
            return;
        }
        let label_line = format!("LABEL {loop_entry_label}");
        let buffer = if self.in_function { &mut self.functions } else { &mut self.global };
        let insert_at = buffer.iter().position(|l| *l == label_line).unwrap_or(buffer.len());
        let hoisted: Vec<String> = self.pending_hoists.drain(..).map(|(_, line)| line).collect();
        for (i, line) in hoisted.into_iter().enumerate() {
            buffer.insert(insert_at + i, line);
        }
    }

    /// Mint a unique label of the form `<scope>&<kind><n>`.
    pub fn new_label(&mut self, scope: &str, kind: &str) -> String {
        let key = (scope.to_string(), kind.to_string());
        let n = self.label_counters.entry(key).or_insert(1);
        let label = format!("{scope}&{kind}{n}");
        *n += 1;
        label
    }

    /// Mint a unique variable codename of the form `<frame>@<id>$<n>`.
    /// `frame` is conventionally `"GF"` (global) or `"LF"` (local).
    pub fn new_var_codename(&mut self, frame: &str, id: &str) -> String {
        let key = (frame.to_string(), id.to_string());
        let n = self.var_counters.entry(key).or_insert(1);
        let codename = format!("{frame}@{id}${n}");
        *n += 1;
        codename
    }

    pub fn mark_substring_used(&mut self) {
        self.substring_used = true;
    }

    pub fn emit_fn_prologue(&mut self, name: &str, param_ids: &[String]) {
        self.functions.push(format!("LABEL {name}"));
        self.functions.push("CREATEFRAME".to_string());
        self.functions.push("PUSHFRAME".to_string());
        for id in param_ids {
            if id == "_" {
                continue;
            }
            self.functions.push(format!("DEFVAR LF@{id}%"));
            self.functions.push(format!("POPS LF@{id}%"));
        }
    }

    /// Push call arguments in reverse declared order and emit `CALL`.
    pub fn emit_fn_call(&mut self, name: &str, args: &[String]) {
        for arg in args.iter().rev() {
            self.active_buffer().push(format!("PUSHS {arg}"));
        }
        self.active_buffer().push(format!("CALL {name}"));
    }

    /// Assemble the final program in the fixed printing order of §4.2.
    pub fn finish(mut self) -> String {
        debug_assert!(self.pending_hoists.is_empty(), "loop hoists must be flushed before finish");
        let mut out = String::new();
        writeln!(out, ".IFJcode23").unwrap();
        writeln!(out, "DEFVAR GF@{TMP1}").unwrap();
        writeln!(out, "DEFVAR GF@{TMP2}").unwrap();
        writeln!(out, "DEFVAR GF@{TMP3}").unwrap();
        writeln!(out, "JUMP !main").unwrap();
        if self.substring_used {
            out.push_str(SUBSTRING_HELPER);
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        for line in self.functions.drain(..) {
            writeln!(out, "{line}").unwrap();
        }
        writeln!(out, "LABEL !main").unwrap();
        for line in self.global.drain(..) {
            writeln!(out, "{line}").unwrap();
        }
        write!(out, "EXIT int@0").unwrap();
        out
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode an integer literal as IFJcode syntax: `int@<decimal>`.
pub fn const_int(value: i64) -> String {
    format!("int@{value}")
}

/// Encode a double literal as IFJcode syntax using C99 hex-float form:
/// `float@<hexfloat>`.
pub fn const_double(value: f64) -> String {
    format!("float@{}", format_hex_float(value))
}

/// Encode a string literal, escaping bytes `<= 32`, `#`, and `\` as
/// `\DDD` (three-digit decimal ASCII code).
pub fn const_string(value: &str) -> String {
    let mut escaped = String::new();
    for byte in value.bytes() {
        if byte <= 32 || byte == b'#' || byte == b'\\' {
            write!(escaped, "\\{byte:03}").unwrap();
        } else {
            escaped.push(byte as char);
        }
    }
    format!("string@{escaped}")
}

pub fn const_nil() -> String {
    "nil@nil".to_string()
}

pub fn const_bool(value: bool) -> String {
    format!("bool@{value}")
}

/// Format a finite `f64` in C99 hex-float notation, e.g. `0x1.8000000000000p+1`.
/// Every mantissa digit is emitted (no trailing-zero stripping) so the
/// encoding round-trips bit-exactly.
pub fn format_hex_float(value: f64) -> String {
    if value == 0.0 {
        return if value.is_sign_negative() { "-0x0p+0".to_string() } else { "0x0p+0".to_string() };
    }
    let bits = value.to_bits();
    let sign = (bits >> 63) & 1;
    let exp_biased = ((bits >> 52) & 0x7FF) as i64;
    let mantissa = bits & 0x000F_FFFF_FFFF_FFFF;
    let sign_str = if sign == 1 { "-" } else { "" };

    if exp_biased == 0x7FF {
        return if mantissa == 0 {
            format!("{sign_str}inf")
        } else {
            "nan".to_string()
        };
    }

    if exp_biased == 0 {
        // Subnormal: leading digit 0, unbiased exponent fixed at -1022.
        format!("{sign_str}0x0.{mantissa:013x}p-1022")
    } else {
        let exp = exp_biased - 1023;
        format!("{sign_str}0x1.{mantissa:013x}p{exp:+}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal inverse of [`format_hex_float`], used only to prove the
    /// round-trip property of §8; not exposed outside tests.
    fn parse_hex_float(s: &str) -> f64 {
        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1.0_f64, rest),
            None => (1.0_f64, s),
        };
        let rest = rest.strip_prefix("0x").expect("hex float must start with 0x");
        let mut split = rest.splitn(2, 'p');
        let mantissa_part = split.next().unwrap();
        let exp: i32 = split.next().unwrap().parse().unwrap();
        let mut mant_split = mantissa_part.splitn(2, '.');
        let int_part = mant_split.next().unwrap();
        let frac_part = mant_split.next().unwrap_or("");
        let int_val = u64::from_str_radix(int_part, 16).unwrap() as f64;
        let mut frac_val = 0.0_f64;
        let mut scale = 1.0 / 16.0;
        for c in frac_part.chars() {
            frac_val += c.to_digit(16).unwrap() as f64 * scale;
            scale /= 16.0;
        }
        sign * (int_val + frac_val) * 2f64.powi(exp)
    }

    #[test]
    fn hex_float_round_trips_bit_exact() {
        for v in [0.0_f64, 1.0, 3.0, 0.5, -2.5, 0.1, 123456.789, 1e300, 1e-300, -0.0] {
            let encoded = format_hex_float(v);
            let decoded = parse_hex_float(&encoded);
            assert_eq!(decoded.to_bits(), v.to_bits(), "round trip failed for {v} -> {encoded}");
        }
    }

    #[test]
    fn int_literal_encoding() {
        assert_eq!(const_int(42), "int@42");
        assert_eq!(const_int(-7), "int@-7");
    }

    #[test]
    fn string_literal_escapes_control_bytes_and_specials() {
        assert_eq!(const_string("a b"), "string@a\\032b");
        assert_eq!(const_string("#"), "string@\\035");
        assert_eq!(const_string("\\"), "string@\\092");
        assert_eq!(const_string("ok"), "string@ok");
    }

    #[test]
    fn bool_and_nil_literals() {
        assert_eq!(const_bool(true), "bool@true");
        assert_eq!(const_bool(false), "bool@false");
        assert_eq!(const_nil(), "nil@nil");
    }

    #[test]
    fn labels_and_codenames_are_unique_per_key() {
        let mut e = Emitter::new();
        assert_eq!(e.new_label("while", "else"), "while&else1");
        assert_eq!(e.new_label("while", "else"), "while&else2");
        assert_eq!(e.new_label("while", "end"), "while&end1");
        assert_eq!(e.new_var_codename("GF", "x"), "GF@x$1");
        assert_eq!(e.new_var_codename("GF", "x"), "GF@x$2");
    }

    #[test]
    fn hoisted_declarations_land_before_loop_entry_label() {
        let mut e = Emitter::new();
        let entry = e.new_label("while", "start");
        assert!(e.enter_loop(&entry));
        e.emit(&["LABEL", entry.as_str()]);
        e.declare_var("LF@t$0");
        e.emit(&["POPS", "LF@t$0"]);
        e.emit(&["JUMP", entry.as_str()]);
        e.exit_loop();

        let program = e.finish();
        let defvar_pos = program.find("DEFVAR LF@t$0").unwrap();
        let label_pos = program.find(&format!("LABEL {entry}")).unwrap();
        assert!(defvar_pos < label_pos, "hoisted DEFVAR must precede the loop's entry label");
    }

    #[test]
    fn finish_order_matches_spec() {
        let mut e = Emitter::new();
        e.emit(&["PUSHS", "int@1"]);
        let program = e.finish();
        let lines: Vec<&str> = program.lines().collect();
        assert_eq!(lines[0], ".IFJcode23");
        assert!(lines.contains(&"JUMP !main"));
        assert!(lines.contains(&"LABEL !main"));
        assert!(program.trim_end().ends_with("EXIT int@0"));
    }
}
