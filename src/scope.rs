// =============================================================================
// scope.rs — WHAT WE'RE ALLOWED TO LOOK AT
// =============================================================================
//
// Scope is a list of root domains. A name is in scope when it is one of them
// or lives underneath one of them. Every root also gets a hostname pattern,
// and that pattern is the only thing allowed to turn paste text into names.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use regex::Regex;
use tracing::warn;

/// One or more labels, each followed by a dot. The root domain goes after it.
const SUBDOMAIN_PATTERN: &str =
    r"(([a-zA-Z0-9]{1}|[_a-zA-Z0-9]{1}[_a-zA-Z0-9-]{0,61}[a-zA-Z0-9]{1})[.]{1})+";

/// Decides what is in scope and how in-scope hostnames look.
pub trait ScopeMatcher: Send + Sync {
    /// True when `name` is a configured root domain or a subdomain of one.
    fn is_domain_in_scope(&self, name: &str) -> bool;

    /// The configured root domain that covers `name`, if any.
    fn which_domain(&self, name: &str) -> Option<String>;

    /// Pattern matching hostnames under the root domain covering `name`.
    fn domain_regex(&self, name: &str) -> Option<Regex>;
}

/// Scope backed by a fixed list of root domains.
#[derive(Debug, Default)]
pub struct ScopeConfig {
    domains: Vec<String>,
    patterns: RwLock<HashMap<String, Regex>>,
}

impl ScopeConfig {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalised: Vec<String> = Vec::new();
        for domain in domains {
            let domain = normalise(domain.as_ref());
            if !domain.is_empty() && !normalised.contains(&domain) {
                normalised.push(domain);
            }
        }
        Self {
            domains: normalised,
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

impl ScopeMatcher for ScopeConfig {
    fn is_domain_in_scope(&self, name: &str) -> bool {
        self.which_domain(name).is_some()
    }

    fn which_domain(&self, name: &str) -> Option<String> {
        let name = normalise(name);
        if name.is_empty() {
            return None;
        }
        // Longest root wins so nested roots resolve to the most specific one.
        self.domains
            .iter()
            .filter(|root| is_same_or_subdomain(&name, root))
            .max_by_key(|root| root.len())
            .cloned()
    }

    fn domain_regex(&self, name: &str) -> Option<Regex> {
        let root = self.which_domain(name)?;

        if let Some(re) = self.patterns.read().get(&root) {
            return Some(re.clone());
        }

        let pattern = format!("{}{}", SUBDOMAIN_PATTERN, regex::escape(&root));
        match Regex::new(&pattern) {
            Ok(re) => {
                self.patterns.write().insert(root, re.clone());
                Some(re)
            }
            Err(e) => {
                warn!(domain = %root, error = %e, "failed to compile hostname pattern");
                None
            }
        }
    }
}

fn normalise(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}

fn is_same_or_subdomain(name: &str, root: &str) -> bool {
    name == root
        || (name.len() > root.len()
            && name.ends_with(root)
            && name.as_bytes()[name.len() - root.len() - 1] == b'.')
}
