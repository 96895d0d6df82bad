//! Rule-application configuration.
//!
//! The matching algorithm itself (spec: anchored BFS isomorphism) has no
//! tunables beyond what the pattern graphs and constraints already express.
//! `Config` still exists, in the ambient-stack tradition of the crates this
//! one is modeled on, to carry the one genuine per-rule knob (`benefit`) and
//! a couple of diagnostics toggles that the driver layer (outside this
//! core) typically wants.

/// Per-rule configuration passed to `drr_core::rule::Rule::new`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Relative profitability of this rule, used by a driver to order rules
    /// that could both match the same anchor opcode. The core itself never
    /// reads this value; it is opaque payload carried for the caller.
    pub benefit: i32,
    /// When set, the applier logs a `tracing::warn!` for every source-pattern
    /// output tensor name that has no corresponding result-pattern output
    /// (spec: a warning, not a hard error). Disabling this is useful in
    /// fuzzing/property tests that intentionally author incomplete rules.
    pub warn_on_uncovered_output: bool,
}

impl Config {
    /// Starts building a [`Config`] with the given rule benefit.
    #[must_use]
    pub const fn builder(benefit: i32) -> ConfigBuilder {
        ConfigBuilder {
            benefit,
            warn_on_uncovered_output: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder(1).build()
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    benefit: i32,
    warn_on_uncovered_output: bool,
}

impl ConfigBuilder {
    /// Overrides whether uncovered-output warnings are logged.
    #[must_use]
    pub const fn warn_on_uncovered_output(mut self, warn: bool) -> Self {
        self.warn_on_uncovered_output = warn;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub const fn build(self) -> Config {
        Config {
            benefit: self.benefit,
            warn_on_uncovered_output: self.warn_on_uncovered_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_on_uncovered_output() {
        let cfg = Config::default();
        assert_eq!(cfg.benefit, 1);
        assert!(cfg.warn_on_uncovered_output);
    }

    #[test]
    fn builder_overrides_warning_toggle() {
        let cfg = Config::builder(5).warn_on_uncovered_output(false).build();
        assert_eq!(cfg.benefit, 5);
        assert!(!cfg.warn_on_uncovered_output);
    }
}
