//! Compiler configuration surface.
//!
//! A small builder-style struct, in the same spirit as this codebase's
//! existing extensibility surface: plain data plus `with_*` methods rather
//! than a flags bitmask.

/// Controls ambient, non-semantic behavior of a compilation run.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// When `true`, the `substring` runtime helper is always inlined into
    /// the emitted program even if the source never calls `substring`.
    /// Default: `false` (inline only on demand, per §4.2).
    pub always_inline_substring: bool,

    /// Log verbosity passed through to `tracing`, as a standard
    /// `RUST_LOG`-style filter directive (e.g. `"warn"`, `"debug"`).
    pub log_filter: String,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig { always_inline_substring: false, log_filter: "warn".to_string() }
    }

    pub fn with_always_inline_substring(mut self, value: bool) -> Self {
        self.always_inline_substring = value;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_does_not_force_substring_inline() {
        assert!(!CompilerConfig::default().always_inline_substring);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = CompilerConfig::new().with_always_inline_substring(true).with_log_filter("debug");
        assert!(cfg.always_inline_substring);
        assert_eq!(cfg.log_filter, "debug");
    }
}
