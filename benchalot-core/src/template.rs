//! Template Expansion
//!
//! Substitutes `{{name}}` and `{{group.field}}` placeholders in strings using
//! a variable-binding map. Identifiers start with a letter or underscore and
//! continue with letters, digits and underscores; a single `.field` segment
//! addresses one field of a compound binding. Braces are matched literally,
//! with no escaping and no nesting.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Regex matching a placeholder with an optional field access.
const PLACEHOLDER: &str = r"\{\{([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\}\}";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER).expect("placeholder regex is valid"))
}

/// Errors from template expansion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The placeholder names a variable that is not bound.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    /// A field was requested on a scalar, or a compound was used without a field.
    #[error("bad field access '{0}': {1}")]
    BadFieldAccess(String, &'static str),
}

/// A scalar matrix value: string, integer, float or boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Arbitrary string value
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A bound value: either a scalar or a compound record of named scalar fields.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    /// Plain scalar, addressed as `{{name}}`
    Scalar(Scalar),
    /// Named fields, addressed as `{{name.field}}`; order is declaration order
    Compound(Vec<(String, Scalar)>),
}

impl BindingValue {
    /// Look up a field of a compound value.
    pub fn field(&self, name: &str) -> Option<&Scalar> {
        match self {
            BindingValue::Scalar(_) => None,
            BindingValue::Compound(fields) => {
                fields.iter().find(|(f, _)| f == name).map(|(_, v)| v)
            }
        }
    }
}

/// An ordered set of variable bindings.
///
/// Insertion order is preserved; it determines column order in the result
/// table and plan listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(Vec<(String, BindingValue)>);

impl Bindings {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Bindings(Vec::new())
    }

    /// Bind `name` to `value`, replacing any previous binding of that name.
    pub fn insert(&mut self, name: impl Into<String>, value: BindingValue) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Whether no variables are bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten to `(column, string value)` pairs, expanding compound values
    /// to `name.field` columns in field declaration order.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (name, value) in &self.0 {
            match value {
                BindingValue::Scalar(s) => out.push((name.clone(), s.to_string())),
                BindingValue::Compound(fields) => {
                    for (field, s) in fields {
                        out.push((format!("{}.{}", name, field), s.to_string()));
                    }
                }
            }
        }
        out
    }
}

impl FromIterator<(String, BindingValue)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (String, BindingValue)>>(iter: T) -> Self {
        let mut b = Bindings::new();
        for (name, value) in iter {
            b.insert(name, value);
        }
        b
    }
}

/// Expand every placeholder in `input` against `bindings`.
///
/// Returns the input with each `{{name}}` / `{{name.field}}` replaced by the
/// string form of the bound value. Fails on the first unresolvable
/// placeholder; text outside placeholders is copied verbatim.
pub fn expand(input: &str, bindings: &Bindings) -> Result<String, TemplateError> {
    let re = placeholder_re();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("group 0 always matches");
        let name = &caps[1];
        out.push_str(&input[last..whole.start()]);
        let value = bindings
            .get(name)
            .ok_or_else(|| TemplateError::UnknownVariable(whole.as_str().to_string()))?;
        match (caps.get(2), value) {
            (None, BindingValue::Scalar(s)) => out.push_str(&s.to_string()),
            (None, BindingValue::Compound(_)) => {
                return Err(TemplateError::BadFieldAccess(
                    name.to_string(),
                    "compound variable requires a field",
                ));
            }
            (Some(field), value) => {
                let scalar = value.field(field.as_str()).ok_or_else(|| match value {
                    BindingValue::Scalar(_) => TemplateError::BadFieldAccess(
                        format!("{}.{}", name, field.as_str()),
                        "scalar variable has no fields",
                    ),
                    BindingValue::Compound(_) => TemplateError::BadFieldAccess(
                        format!("{}.{}", name, field.as_str()),
                        "no such field",
                    ),
                })?;
                out.push_str(&scalar.to_string());
            }
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// List the variable names referenced by placeholders in `input`.
///
/// Field accesses report the base variable name; duplicates are dropped,
/// first-reference order is kept. Used by the output driver to decide how a
/// filename template partitions the result table.
pub fn find_placeholders(input: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_re().captures_iter(input) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
