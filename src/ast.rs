//! Parsed makefile structures.
//!
//! A [`Rule`] couples one or more targets with their sources and a raw
//! recipe; the [`Makefile`] aggregate keeps rules in declaration order and
//! maps every target name to the rule that builds it. Multi-target rules
//! are a single unit: all of a rule's targets share one recipe execution.

use std::collections::HashMap;

use crate::location::Location;

/// A single rule: targets, sources, and the recipe that produces them.
///
/// Targets and sources are fully expanded strings by the time a rule is
/// constructed. Recipe lines are stored verbatim, indentation included,
/// and are only expanded when the engine runs them.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Names this rule produces, in declaration order. Never empty.
    pub targets: Vec<String>,
    /// Prerequisites, in declaration order. May be empty.
    pub sources: Vec<String>,
    /// Raw command lines, unexpanded.
    pub recipe: Vec<String>,
    /// Where the rule header appeared.
    pub origin: Location,
}

/// The parsed makefile: rules in declaration order plus a target map.
#[derive(Debug, Default)]
pub struct Makefile {
    rules: Vec<Rule>,
    by_target: HashMap<String, usize>,
}

impl Makefile {
    /// Append a rule, registering every target it declares.
    ///
    /// When a target name appears in more than one rule, the later rule
    /// wins the mapping, matching traditional make behaviour.
    pub fn add_rule(&mut self, rule: Rule) {
        let index = self.rules.len();
        for target in &rule.targets {
            self.by_target.insert(target.clone(), index);
        }
        self.rules.push(rule);
    }

    /// Look up the rule that builds `target`.
    #[must_use]
    pub fn rule_for(&self, target: &str) -> Option<&Rule> {
        self.by_target.get(target).map(|&index| &self.rules[index])
    }

    /// The first target of the first rule, built when no target is named.
    #[must_use]
    pub fn default_target(&self) -> Option<&str> {
        self.rules
            .first()
            .and_then(|rule| rule.targets.first())
            .map(String::as_str)
    }

    /// Whether the makefile declares any rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
