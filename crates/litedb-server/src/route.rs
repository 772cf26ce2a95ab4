//! Route templates and command matching.
//!
//! A template is a path with `{name}` placeholders, e.g.
//! `collections/{collectionName}/indexes/{indexName}`. A command string is
//! a concrete path followed by `:operation`, e.g.
//! `collections/users/indexes/by_name:delete`.
//!
//! Placeholders match any run of characters except `,`, so a single
//! variable may span several path segments. Matching is anchored and
//! case-insensitive, and every variable must bind a non-blank value.

use std::collections::HashMap;
use std::fmt;

use litedb_protocol::Operation;
use regex::Regex;
use thiserror::Error;

/// Capture used for each placeholder. `,` is reserved as a field separator.
const VARIABLE_CAPTURE: &str = "([^,]*)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid route template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },
}

fn invalid(template: &str, reason: impl Into<String>) -> RouteError {
    RouteError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.into(),
    }
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    template: String,
    /// Variable names in declaration order; index `i` is capture group `i + 1`.
    variables: Vec<String>,
    pattern: Regex,
    literal_chars: usize,
}

impl RouteTemplate {
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        let mut variables: Vec<String> = Vec::new();
        let mut pattern = String::from("(?i)^");
        let mut literal = String::new();
        let mut literal_chars = 0;

        let mut chars = template.char_indices();
        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(invalid(template, format!("nested '{{' in variable opened at byte {pos}")));
                            }
                            _ => name.push(inner),
                        }
                    }
                    if !closed {
                        return Err(invalid(template, format!("unclosed '{{' at byte {pos}")));
                    }
                    validate_variable_name(template, &name)?;
                    if variables.contains(&name) {
                        return Err(invalid(template, format!("duplicate variable {name:?}")));
                    }

                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();
                    pattern.push_str(VARIABLE_CAPTURE);
                    variables.push(name);
                }
                '}' => return Err(invalid(template, format!("unmatched '}}' at byte {pos}"))),
                _ => {
                    literal.push(c);
                    literal_chars += 1;
                }
            }
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| invalid(template, e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            variables,
            pattern,
            literal_chars,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of literal (non-placeholder) characters. Used to rank
    /// overlapping routes: more literal text means a more specific route.
    pub fn specificity(&self) -> usize {
        self.literal_chars
    }

    /// Match a full command string (`path:operation`).
    ///
    /// Returns `None` when there is no `:operation` suffix, the path does
    /// not fit the template, any variable binds a blank value, or the
    /// operation token is not recognised.
    pub fn matches(&self, command: &str) -> Option<RouteMatch> {
        let (path, token) = command.rsplit_once(':')?;
        let captures = self.pattern.captures(path.trim())?;

        let mut params = HashMap::with_capacity(self.variables.len());
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1).map_or("", |m| m.as_str());
            if value.trim().is_empty() {
                return None;
            }
            params.insert(name.clone(), value.to_string());
        }

        let operation = token.parse::<Operation>().ok()?;
        Some(RouteMatch { params, operation })
    }
}

fn validate_variable_name(template: &str, name: &str) -> Result<(), RouteError> {
    if name.trim().is_empty() {
        return Err(invalid(template, "empty variable name"));
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, '/' | ':' | ',')) {
        return Err(invalid(template, format!("variable {name:?} contains {bad:?}")));
    }
    Ok(())
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl PartialEq for RouteTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for RouteTemplate {}

impl TryFrom<&str> for RouteTemplate {
    type Error = RouteError;

    fn try_from(template: &str) -> Result<Self, Self::Error> {
        Self::compile(template)
    }
}

/// Variable bindings and operation extracted from one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    params: HashMap<String, String>,
    operation: Operation,
}

impl RouteMatch {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn into_params(self) -> HashMap<String, String> {
        self.params
    }
}
