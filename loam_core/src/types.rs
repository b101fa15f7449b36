//! Type definitions for Loam units
//!
//! The serde structs in the first half mirror the on-disk YAML shape of a
//! unit file; the second half holds the runtime representation a loaded
//! unit is made of.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A parsed unit file: the ordered top-level defs to execute
#[derive(Debug, Clone, Deserialize)]
pub struct UnitSource {
    /// Top-level statements, executed in order
    #[serde(default)]
    pub defs: Vec<Def>,
}

/// One top-level statement of a unit file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Def {
    Let(LetDef),
    Fn(FnDef),
    Class(ClassDef),
    Use(UseDef),
}

/// Variable definition: exactly one of `value` or `expr` must be present
#[derive(Debug, Clone, Deserialize)]
pub struct LetDef {
    #[serde(rename = "let")]
    pub name: String,

    /// Literal value taken verbatim from the YAML
    pub value: Option<serde_yaml::Value>,

    /// Expression evaluated against the namespace built so far
    pub expr: Option<String>,
}

/// Function definition
#[derive(Debug, Clone, Deserialize)]
pub struct FnDef {
    #[serde(rename = "fn")]
    pub name: String,

    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub body: Vec<Step>,
}

/// One step of a function body
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Guard expression; the step is skipped unless it evaluates truthy
    pub when: Option<String>,

    /// Local name the step's value is bound to
    pub bind: Option<String>,

    /// Expression to evaluate
    pub expr: Option<String>,

    /// String template to render, `{name}` placeholders
    pub template: Option<String>,

    /// Expression whose value ends the call
    #[serde(rename = "return")]
    pub ret: Option<String>,
}

/// Class definition: ordered fields, optionally with default expressions
#[derive(Debug, Clone, Deserialize)]
pub struct ClassDef {
    #[serde(rename = "class")]
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// Field of a class
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    /// Default expression, evaluated at instantiation when no value is given
    pub default: Option<String>,
}

/// Nested-unit import, path relative to the importing file
#[derive(Debug, Clone, Deserialize)]
pub struct UseDef {
    #[serde(rename = "use")]
    pub path: String,

    /// Binding name; defaults to the imported file's stem
    #[serde(rename = "as")]
    pub alias: Option<String>,
}

/// Runtime value type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Check if value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Get as float, coercing integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as object (class instances are objects)
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Convert a YAML literal into a runtime value
    pub fn from_yaml(value: &serde_yaml::Value) -> Value {
        match value {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_yaml::Value::String(s) => Value::Str(s.clone()),
            serde_yaml::Value::Sequence(seq) => {
                Value::List(seq.iter().map(Value::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut result = HashMap::new();
                for (k, v) in map {
                    if let serde_yaml::Value::String(key) = k {
                        result.insert(key.clone(), Value::from_yaml(v));
                    }
                }
                Value::Object(result)
            }
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) | Value::Object(_) => write!(f, "{:?}", self),
        }
    }
}

/// A name bound in a loaded unit, tagged by what it is
#[derive(Debug, Clone)]
pub enum Binding {
    Function(Arc<FnDef>),
    Class(Arc<ClassDef>),
    Unit(Arc<Namespace>),
    Value(Value),
}

/// Category of a binding, as reported by the reflective accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Function,
    Class,
    Unit,
    Variable,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingKind::Function => "function",
            BindingKind::Class => "class",
            BindingKind::Unit => "unit",
            BindingKind::Variable => "variable",
        };
        write!(f, "{}", s)
    }
}

impl Binding {
    /// Classify this binding; computed per query, never cached
    pub fn kind(&self) -> BindingKind {
        match self {
            Binding::Function(_) => BindingKind::Function,
            Binding::Class(_) => BindingKind::Class,
            Binding::Unit(_) => BindingKind::Unit,
            Binding::Value(_) => BindingKind::Variable,
        }
    }
}

/// The result of executing a unit file: a symbol table of bindings
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    /// Synthetic identifier the unit is registered under
    name: String,

    table: HashMap<String, Binding>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
        }
    }

    /// The synthetic identifier, e.g. `loaded_geometry`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.table.get(name)
    }

    pub fn insert(&mut self, name: &str, binding: Binding) {
        self.table.insert(name.to_string(), binding);
    }

    /// All bound names, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_source() {
        let yaml = r#"
defs:
  - let: pi
    value: 3.14159
  - fn: area
    params: [r]
    body:
      - expr: "pi * r * r"
  - class: Circle
    fields:
      - name: radius
"#;

        let source: UnitSource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.defs.len(), 3);

        assert!(matches!(source.defs[0], Def::Let(_)));
        assert!(matches!(source.defs[1], Def::Fn(_)));
        assert!(matches!(source.defs[2], Def::Class(_)));

        if let Def::Fn(f) = &source.defs[1] {
            assert_eq!(f.name, "area");
            assert_eq!(f.params, vec!["r"]);
            assert_eq!(f.body.len(), 1);
        }
    }

    #[test]
    fn test_parse_use_def() {
        let yaml = r#"
defs:
  - use: "helpers.loam"
    as: helpers
"#;

        let source: UnitSource = serde_yaml::from_str(yaml).unwrap();
        match &source.defs[0] {
            Def::Use(u) => {
                assert_eq!(u.path, "helpers.loam");
                assert_eq!(u.alias.as_deref(), Some("helpers"));
            }
            other => panic!("expected use def, got {:?}", other),
        }
    }

    #[test]
    fn test_value_from_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("[1, 2.5, yes, text]").unwrap();
        let value = Value::from_yaml(&yaml);

        assert_eq!(
            value,
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Bool(true),
                Value::Str("text".to_string()),
            ])
        );
    }

    #[test]
    fn test_binding_kind() {
        let ns = Namespace::new("loaded_test");
        assert!(ns.is_empty());

        let binding = Binding::Value(Value::Int(1));
        assert_eq!(binding.kind(), BindingKind::Variable);

        let unit = Binding::Unit(Arc::new(ns));
        assert_eq!(unit.kind(), BindingKind::Unit);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }
}
