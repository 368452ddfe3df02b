// Shelver - core/classifier.rs
//
// File classification: maps a file to a category label, and a category to
// the directory name files of that category are relocated into.
//
// `Classifier` is the seam the organizer consumes. `RoutingPolicy` is the
// configurable implementation: an ordered rule list (first match wins) with a
// default category so classification is total.

use crate::util::constants;
use crate::util::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// Assigns a category label to a file. Must be total and side-effect free.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &Path, file_name: &str) -> String;

    /// Directory name (relative to the destination root) for `category`.
    fn destination_dir<'a>(&'a self, category: &'a str) -> &'a str {
        category
    }

    /// Category and planned destination for `source` under `dest_root`.
    /// `None` when `source` has no file name.
    fn route(&self, source: &Path, dest_root: &Path) -> Option<(String, PathBuf)> {
        let name = source.file_name()?;
        let category = self.classify(source, &name.to_string_lossy());
        let dir = self.destination_dir(&category);
        // Only a plain directory name may become a path component.
        let dir = if is_single_component(dir) {
            dir.to_string()
        } else {
            sanitise_component(dir)
        };
        let destination = dest_root.join(dir).join(name);
        Some((category, destination))
    }
}

// =============================================================================
// Rule definitions (as written in config)
// =============================================================================

/// One `[[policy.rules]]` table. A rule matches when ANY of its matchers does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub category: String,

    /// Extensions without the leading dot, compared case-insensitively.
    pub extensions: Vec<String>,

    /// Case-insensitive substrings of the file name.
    pub contains: Vec<String>,

    /// File-name glob, e.g. `invoice_*.pdf`.
    pub glob: Option<String>,

    /// File-name regular expression.
    pub regex: Option<String>,
}

// =============================================================================
// Compiled rules
// =============================================================================

#[derive(Debug, Clone)]
enum RuleMatcher {
    Extensions(HashSet<String>),
    Contains(Vec<String>),
    Glob(glob::Pattern),
    Regex(Regex),
}

impl RuleMatcher {
    fn matches(&self, file_name: &str, lower_name: &str, lower_ext: Option<&str>) -> bool {
        match self {
            RuleMatcher::Extensions(set) => lower_ext.is_some_and(|ext| set.contains(ext)),
            RuleMatcher::Contains(needles) => {
                needles.iter().any(|n| lower_name.contains(n.as_str()))
            }
            RuleMatcher::Glob(pattern) => pattern.matches_with(
                file_name,
                glob::MatchOptions {
                    case_sensitive: false,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                },
            ),
            RuleMatcher::Regex(re) => re.is_match(file_name),
        }
    }
}

/// A compiled classification rule.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    category: String,
    matchers: Vec<RuleMatcher>,
}

impl PolicyRule {
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Rule matching any of the given extensions.
    pub fn by_extensions<S: AsRef<str>>(category: &str, extensions: &[S]) -> Self {
        Self {
            category: category.to_string(),
            matchers: vec![RuleMatcher::Extensions(
                extensions
                    .iter()
                    .map(|e| normalise_extension(e.as_ref()))
                    .collect(),
            )],
        }
    }

    /// Compile a rule from its config form. `index` is used in error messages.
    pub fn compile(index: usize, spec: &RuleSpec) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            index,
            reason: reason.to_string(),
        };

        let category = spec.category.trim();
        if category.is_empty() {
            return Err(invalid("category must not be empty"));
        }

        let mut matchers = Vec::new();
        if !spec.extensions.is_empty() {
            matchers.push(RuleMatcher::Extensions(
                spec.extensions.iter().map(|e| normalise_extension(e)).collect(),
            ));
        }
        if !spec.contains.is_empty() {
            matchers.push(RuleMatcher::Contains(
                spec.contains.iter().map(|s| s.to_lowercase()).collect(),
            ));
        }
        if let Some(pattern) = &spec.glob {
            let compiled = glob::Pattern::new(pattern)
                .map_err(|e| invalid(&format!("invalid glob '{pattern}': {e}")))?;
            matchers.push(RuleMatcher::Glob(compiled));
        }
        if let Some(pattern) = &spec.regex {
            if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
                return Err(invalid(&format!(
                    "regex longer than {} characters",
                    constants::MAX_REGEX_PATTERN_LENGTH
                )));
            }
            let compiled = Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                index,
                pattern: pattern.clone(),
                source,
            })?;
            matchers.push(RuleMatcher::Regex(compiled));
        }

        if matchers.is_empty() {
            return Err(invalid(
                "rule needs at least one of extensions, contains, glob, regex",
            ));
        }

        Ok(Self {
            category: category.to_string(),
            matchers,
        })
    }

    fn matches(&self, file_name: &str, lower_name: &str, lower_ext: Option<&str>) -> bool {
        self.matchers
            .iter()
            .any(|m| m.matches(file_name, lower_name, lower_ext))
    }
}

// =============================================================================
// RoutingPolicy
// =============================================================================

/// Ordered, first-match-wins classification plus category routing.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    rules: Vec<PolicyRule>,
    default_category: String,
    destinations: HashMap<String, String>,
}

impl RoutingPolicy {
    pub fn new(
        rules: Vec<PolicyRule>,
        default_category: impl Into<String>,
        destinations: HashMap<String, String>,
    ) -> Self {
        Self {
            rules,
            default_category: default_category.into(),
            destinations,
        }
    }

    /// The built-in extension table with default category `other`.
    pub fn builtin() -> Self {
        let rules = constants::DEFAULT_EXTENSION_TABLE
            .iter()
            .map(|(category, exts)| PolicyRule::by_extensions(category, exts))
            .collect();
        Self::new(rules, constants::DEFAULT_CATEGORY, HashMap::new())
    }

    /// Build a policy from config values.
    ///
    /// Invalid rules and unusable destination names are returned as errors
    /// and left out; the rest of the policy still applies. An empty rule list
    /// falls back to the built-in extension table.
    pub fn from_config(
        default_category: &str,
        specs: &[RuleSpec],
        destinations: &HashMap<String, String>,
    ) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();

        let mut rules: Vec<PolicyRule> = Vec::new();
        for (index, spec) in specs.iter().enumerate().take(constants::MAX_POLICY_RULES) {
            match PolicyRule::compile(index, spec) {
                Ok(rule) => rules.push(rule),
                Err(e) => errors.push(e),
            }
        }
        if specs.len() > constants::MAX_POLICY_RULES {
            errors.push(ConfigError::InvalidRule {
                index: constants::MAX_POLICY_RULES,
                reason: format!(
                    "only the first {} rules are used ({} given)",
                    constants::MAX_POLICY_RULES,
                    specs.len()
                ),
            });
        }
        if specs.is_empty() {
            rules = Self::builtin().rules;
        }

        let default_category = match default_category.trim() {
            "" => constants::DEFAULT_CATEGORY.to_string(),
            c => c.to_string(),
        };

        let mut routed = HashMap::new();
        for (category, dir) in destinations {
            if is_single_component(dir) {
                routed.insert(category.clone(), dir.clone());
            } else {
                errors.push(ConfigError::InvalidRule {
                    index: 0,
                    reason: format!(
                        "destination for '{category}' must be a single directory name, got '{dir}'"
                    ),
                });
            }
        }

        (Self::new(rules, default_category, routed), errors)
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Classifier for RoutingPolicy {
    /// Configured directory name, falling back to the category itself.
    fn destination_dir<'a>(&'a self, category: &'a str) -> &'a str {
        self.destinations
            .get(category)
            .map(String::as_str)
            .unwrap_or(category)
    }

    fn classify(&self, path: &Path, file_name: &str) -> String {
        let lower_name = file_name.to_lowercase();
        let lower_ext = Path::new(&lower_name)
            .extension()
            .map(|e| e.to_string_lossy().into_owned());

        let category = self
            .rules
            .iter()
            .find(|r| r.matches(file_name, &lower_name, lower_ext.as_deref()))
            .map(|r| r.category.clone())
            .unwrap_or_else(|| self.default_category.clone());

        tracing::trace!(path = %path.display(), category = %category, "Classified");
        category
    }
}

fn normalise_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn sanitise_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.trim_matches('.') {
        "" => constants::DEFAULT_CATEGORY.to_string(),
        s => s.to_string(),
    }
}
