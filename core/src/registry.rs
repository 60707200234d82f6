//! Category taxonomy
//!
//! The registry is validated once at construction and is read-only afterwards,
//! so it can be shared behind an `Arc` by concurrent classification calls
//! without synchronization.
//!
//! Parent links are stored by name in a flat map and checked for dangling
//! references and cycles up front; nothing holds object references between
//! categories.

use crate::errors::{Result, RoutecatError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Minimum number of examples a category must carry
pub const MIN_EXAMPLES: usize = 2;

/// One category of the fixed taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    /// Unique machine token (e.g., "billing")
    pub name: String,

    /// Display string
    pub label: String,

    #[serde(default)]
    pub description: String,

    /// Exemplar texts, in order; at least two
    pub examples: Vec<String>,

    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Name of the parent category, if any
    #[serde(default)]
    pub parent: Option<String>,
}

impl CategoryDefinition {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
        examples: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: description.into(),
            examples,
            keywords: BTreeSet::new(),
            parent: None,
        }
    }

    /// Builder: set keywords
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set parent category name
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Validated, immutable category taxonomy
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    /// Categories in registration order
    categories: Vec<CategoryDefinition>,
    /// name -> position in `categories`
    index: HashMap<String, usize>,
}

impl CategoryRegistry {
    /// Validate and register a taxonomy
    ///
    /// Fails with a config error on an empty taxonomy, blank or duplicate
    /// names, fewer than two (non-blank) examples, a parent that does not
    /// exist, or a parent chain that loops back on itself.
    pub fn register(categories: Vec<CategoryDefinition>) -> Result<Self> {
        if categories.is_empty() {
            return Err(RoutecatError::config("category registry is empty"));
        }

        let mut index = HashMap::with_capacity(categories.len());
        for (pos, category) in categories.iter().enumerate() {
            if category.name.trim().is_empty() {
                return Err(RoutecatError::config(format!(
                    "category at position {pos} has a blank name"
                )));
            }
            if index.insert(category.name.clone(), pos).is_some() {
                return Err(RoutecatError::config(format!(
                    "duplicate category name '{}'",
                    category.name
                )));
            }
            if category.examples.len() < MIN_EXAMPLES {
                return Err(RoutecatError::config(format!(
                    "category '{}' has {} example(s), at least {MIN_EXAMPLES} required",
                    category.name,
                    category.examples.len()
                )));
            }
            if category.examples.iter().any(|e| e.trim().is_empty()) {
                return Err(RoutecatError::config(format!(
                    "category '{}' has a blank example",
                    category.name
                )));
            }
        }

        for category in &categories {
            if let Some(parent) = &category.parent
                && !index.contains_key(parent)
            {
                return Err(RoutecatError::config(format!(
                    "category '{}' references unknown parent '{parent}'",
                    category.name
                )));
            }
        }

        let registry = Self { categories, index };
        registry.check_acyclic()?;

        tracing::debug!(
            categories = registry.categories.len(),
            "Category registry validated"
        );

        Ok(registry)
    }

    /// Walk every parent chain; a chain longer than the taxonomy or one that
    /// revisits a name is a cycle.
    fn check_acyclic(&self) -> Result<()> {
        for category in &self.categories {
            let mut seen: HashSet<&str> = HashSet::new();
            seen.insert(category.name.as_str());
            let mut current = category.parent.as_deref();
            while let Some(name) = current {
                if !seen.insert(name) {
                    return Err(RoutecatError::config(format!(
                        "parent chain of category '{}' contains a cycle through '{name}'",
                        category.name
                    )));
                }
                current = self.lookup(name).and_then(|c| c.parent.as_deref());
            }
        }
        Ok(())
    }

    /// Find a category by name
    pub fn lookup(&self, name: &str) -> Option<&CategoryDefinition> {
        self.index.get(name).map(|&pos| &self.categories[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All categories in registration order
    pub fn all(&self) -> &[CategoryDefinition] {
        &self.categories
    }

    /// Registration position of a category; the canonical axis for
    /// confusion matrices and tie-breaking
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Category names in registration order
    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Ancestors of a category, nearest parent first
    pub fn ancestors(&self, name: &str) -> Vec<&CategoryDefinition> {
        let mut out = Vec::new();
        let mut current = self.lookup(name).and_then(|c| c.parent.as_deref());
        while let Some(parent) = current {
            match self.lookup(parent) {
                Some(def) => {
                    out.push(def);
                    current = def.parent.as_deref();
                }
                None => break,
            }
        }
        out
    }

    /// Direct children of a category, in registration order
    pub fn children(&self, name: &str) -> Vec<&CategoryDefinition> {
        self.categories
            .iter()
            .filter(|c| c.parent.as_deref() == Some(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cat(name: &str, examples: &[&str]) -> CategoryDefinition {
        CategoryDefinition::new(
            name,
            name.to_uppercase(),
            format!("{name} requests"),
            examples.iter().map(|e| (*e).to_string()).collect(),
        )
    }

    fn config_message(result: Result<CategoryRegistry>) -> String {
        match result {
            Err(err @ RoutecatError::Config { .. }) => err.to_string(),
            Err(other) => panic!("expected config error, got {other}"),
            Ok(_) => panic!("expected config error, got a registry"),
        }
    }

    #[test]
    fn preserves_registration_order() {
        let registry = CategoryRegistry::register(vec![
            cat("zeta", &["z1", "z2"]),
            cat("alpha", &["a1", "a2"]),
            cat("mid", &["m1", "m2"]),
        ])
        .expect("valid");

        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.index_of("alpha"), Some(1));
        assert_eq!(registry.lookup("mid").map(|c| c.label.as_str()), Some("MID"));
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let msg = config_message(CategoryRegistry::register(vec![
            cat("billing", &["b1", "b2"]),
            cat("billing", &["b3", "b4"]),
        ]));
        assert!(msg.contains("duplicate category name 'billing'"));
    }

    #[test]
    fn rejects_single_example() {
        let msg = config_message(CategoryRegistry::register(vec![cat("billing", &["only"])]));
        assert!(msg.contains("at least 2 required"));
    }

    #[test]
    fn rejects_empty_registry_and_blank_names() {
        config_message(CategoryRegistry::register(Vec::new()));
        config_message(CategoryRegistry::register(vec![cat("  ", &["a", "b"])]));
        config_message(CategoryRegistry::register(vec![cat("x", &["a", " "])]));
    }

    #[test]
    fn rejects_dangling_parent() {
        let msg = config_message(CategoryRegistry::register(vec![
            cat("refund", &["r1", "r2"]).with_parent("billing"),
        ]));
        assert!(msg.contains("unknown parent 'billing'"));
    }

    #[test]
    fn rejects_parent_cycles() {
        config_message(CategoryRegistry::register(vec![
            cat("a", &["a1", "a2"]).with_parent("a"),
        ]));
        config_message(CategoryRegistry::register(vec![
            cat("a", &["a1", "a2"]).with_parent("c"),
            cat("b", &["b1", "b2"]).with_parent("a"),
            cat("c", &["c1", "c2"]).with_parent("b"),
        ]));
    }

    #[test]
    fn ancestors_and_children() {
        let registry = CategoryRegistry::register(vec![
            cat("support", &["s1", "s2"]),
            cat("billing", &["b1", "b2"]).with_parent("support"),
            cat("refund", &["r1", "r2"]).with_parent("billing"),
            cat("invoice", &["i1", "i2"]).with_parent("billing"),
        ])
        .expect("valid");

        let ancestors: Vec<&str> = registry
            .ancestors("refund")
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(ancestors, vec!["billing", "support"]);

        let children: Vec<&str> = registry
            .children("billing")
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(children, vec!["refund", "invoice"]);
        assert!(registry.ancestors("support").is_empty());
    }

    #[test]
    fn deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            categories: Vec<CategoryDefinition>,
        }

        let doc: Doc = toml::from_str(
            r#"
            [[categories]]
            name = "bug"
            label = "Bug report"
            examples = ["it crashes", "error on save"]
            keywords = ["crash", "error"]

            [[categories]]
            name = "feature"
            label = "Feature request"
            description = "asks for new functionality"
            examples = ["please add dark mode", "support csv export"]
            "#,
        )
        .expect("parse");

        let registry = CategoryRegistry::register(doc.categories).expect("valid");
        let bug = registry.lookup("bug").expect("bug");
        assert!(bug.keywords.contains("crash"));
        assert_eq!(bug.description, "");
        assert_eq!(registry.len(), 2);
    }
}
