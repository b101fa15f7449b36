//! Execution of Loam units
//!
//! Top-level defs run in order into a fresh [`Namespace`]; function bodies
//! and field defaults evaluate against that namespace later, at call or
//! instantiation time. The expression language is deliberately small:
//! one comparison or arithmetic operator per expression, no precedence.

use crate::error::{LoamError, Result};
use crate::registry::{self, UnitRegistry};
use crate::types::{Binding, ClassDef, Def, FnDef, Namespace, UnitSource, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Evaluation context: locals shadow the namespace
pub struct EvalContext<'a> {
    namespace: &'a Namespace,
    locals: HashMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(namespace: &'a Namespace) -> Self {
        Self {
            namespace,
            locals: HashMap::new(),
        }
    }

    pub fn with_locals(namespace: &'a Namespace, locals: HashMap<String, Value>) -> Self {
        Self { namespace, locals }
    }

    /// Evaluate an expression: a single comparison, a single arithmetic
    /// operation, or an atom
    pub fn eval_expr(&self, expr: &str) -> Result<Value> {
        let expr = expr.trim();

        for op in [" == ", " != ", " >= ", " <= ", " > ", " < "] {
            if let Some(idx) = expr.find(op) {
                let left = self.eval_atom(expr[..idx].trim())?;
                let right = self.eval_atom(expr[idx + op.len()..].trim())?;
                return compare(op.trim(), &left, &right);
            }
        }

        for op in [" + ", " - ", " * ", " / "] {
            if let Some(idx) = expr.find(op) {
                let left = self.eval_atom(expr[..idx].trim())?;
                let right = self.eval_atom(expr[idx + op.len()..].trim())?;
                return arithmetic(op.trim(), &left, &right);
            }
        }

        self.eval_atom(expr)
    }

    /// Evaluate an atom: a literal or a (possibly dotted) name
    fn eval_atom(&self, atom: &str) -> Result<Value> {
        match atom {
            "null" => return Ok(Value::Null),
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }

        if let Ok(i) = atom.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        if let Ok(f) = atom.parse::<f64>() {
            return Ok(Value::Float(f));
        }

        if atom.len() >= 2 {
            let quoted = (atom.starts_with('\'') && atom.ends_with('\''))
                || (atom.starts_with('"') && atom.ends_with('"'));
            if quoted {
                return Ok(Value::Str(atom[1..atom.len() - 1].to_string()));
            }
        }

        self.lookup(atom)
    }

    /// Resolve a name: locals first, then the namespace; `unit.member`
    /// reaches into a use-bound unit
    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }

        if let Some((unit, member)) = name.split_once('.') {
            if let Some(Binding::Unit(ns)) = self.namespace.get(unit) {
                return match ns.get(member) {
                    Some(Binding::Value(value)) => Ok(value.clone()),
                    Some(other) => Err(LoamError::Type {
                        expected: "variable".to_string(),
                        actual: other.kind().to_string(),
                    }),
                    None => Err(LoamError::Eval(format!("unknown name: {}", name))),
                };
            }
        }

        match self.namespace.get(name) {
            Some(Binding::Value(value)) => Ok(value.clone()),
            Some(other) => Err(LoamError::Type {
                expected: "variable".to_string(),
                actual: other.kind().to_string(),
            }),
            None => Err(LoamError::Eval(format!("unknown name: {}", name))),
        }
    }

    /// Render `{name}` placeholders from locals and namespace variables
    pub fn render_template(&self, template: &str) -> String {
        let mut result = template.to_string();

        for (name, value) in &self.locals {
            let placeholder = format!("{{{}}}", name);
            if result.contains(&placeholder) {
                result = result.replace(&placeholder, &value.to_string());
            }
        }

        for (name, binding) in self.namespace.iter() {
            if let Binding::Value(value) = binding {
                let placeholder = format!("{{{}}}", name);
                if result.contains(&placeholder) {
                    result = result.replace(&placeholder, &value.to_string());
                }
            }
        }

        result
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value> {
    if let (Some(l), Some(r)) = (left.as_float(), right.as_float()) {
        let result = match op {
            "==" => l == r,
            "!=" => l != r,
            ">=" => l >= r,
            "<=" => l <= r,
            ">" => l > r,
            "<" => l < r,
            _ => unreachable!(),
        };
        return Ok(Value::Bool(result));
    }

    match op {
        "==" => Ok(Value::Bool(left == right)),
        "!=" => Ok(Value::Bool(left != right)),
        _ => Err(LoamError::Type {
            expected: "number".to_string(),
            actual: format!("{:?}", left),
        }),
    }
}

fn arithmetic(op: &str, left: &Value, right: &Value) -> Result<Value> {
    if let (Value::Int(l), Value::Int(r)) = (left, right) {
        let overflow = || LoamError::Eval("integer overflow".to_string());
        return match op {
            "+" => l.checked_add(*r).map(Value::Int).ok_or_else(overflow),
            "-" => l.checked_sub(*r).map(Value::Int).ok_or_else(overflow),
            "*" => l.checked_mul(*r).map(Value::Int).ok_or_else(overflow),
            "/" => {
                if *r == 0 {
                    return Err(LoamError::Eval("division by zero".to_string()));
                }
                match l.checked_rem(*r) {
                    None => Err(overflow()),
                    Some(0) => l.checked_div(*r).map(Value::Int).ok_or_else(overflow),
                    Some(_) => Ok(Value::Float(*l as f64 / *r as f64)),
                }
            }
            _ => unreachable!(),
        };
    }

    if op == "+" {
        if let (Value::Str(l), Value::Str(r)) = (left, right) {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }
    }

    let (l, r) = match (left.as_float(), right.as_float()) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            let offender = if left.as_float().is_none() { left } else { right };
            return Err(LoamError::Type {
                expected: "number".to_string(),
                actual: format!("{:?}", offender),
            });
        }
    };

    match op {
        "+" => Ok(Value::Float(l + r)),
        "-" => Ok(Value::Float(l - r)),
        "*" => Ok(Value::Float(l * r)),
        "/" => {
            if r == 0.0 {
                Err(LoamError::Eval("division by zero".to_string()))
            } else {
                Ok(Value::Float(l / r))
            }
        }
        _ => unreachable!(),
    }
}

/// Invoke a function: bind positional then named arguments to parameters,
/// then run the body steps
pub fn call_function(
    func: &FnDef,
    namespace: &Namespace,
    positional: &[Value],
    named: &HashMap<String, Value>,
) -> Result<Value> {
    tracing::debug!(
        "calling {} ({} positional, {} named)",
        func.name,
        positional.len(),
        named.len()
    );

    if positional.len() > func.params.len() {
        return Err(LoamError::Eval(format!(
            "{} takes at most {} arguments, got {}",
            func.name,
            func.params.len(),
            positional.len()
        )));
    }

    let mut locals = HashMap::new();
    for (param, value) in func.params.iter().zip(positional) {
        locals.insert(param.clone(), value.clone());
    }
    for (name, value) in named {
        if !func.params.contains(name) {
            return Err(LoamError::Eval(format!(
                "{} has no parameter '{}'",
                func.name, name
            )));
        }
        if locals.contains_key(name) {
            return Err(LoamError::Eval(format!(
                "duplicate value for parameter '{}'",
                name
            )));
        }
        locals.insert(name.clone(), value.clone());
    }
    for param in &func.params {
        if !locals.contains_key(param) {
            return Err(LoamError::MissingArgument(param.clone()));
        }
    }

    let mut ctx = EvalContext::with_locals(namespace, locals);
    let mut last = Value::Null;

    for step in &func.body {
        if let Some(when) = &step.when {
            if !ctx.eval_expr(when)?.is_truthy() {
                continue;
            }
        }

        if let Some(ret) = &step.ret {
            return ctx.eval_expr(ret);
        }

        let value = if let Some(expr) = &step.expr {
            ctx.eval_expr(expr)?
        } else if let Some(template) = &step.template {
            Value::Str(ctx.render_template(template))
        } else {
            return Err(LoamError::Eval(format!(
                "step in '{}' has no operation",
                func.name
            )));
        };

        if let Some(bind) = &step.bind {
            ctx.locals.insert(bind.clone(), value.clone());
        }
        last = value;
    }

    Ok(last)
}

/// Construct an instance: bind positional then named values to fields,
/// evaluate defaults for the rest
pub fn instantiate_class(
    class: &ClassDef,
    namespace: &Namespace,
    positional: &[Value],
    named: &HashMap<String, Value>,
) -> Result<Value> {
    tracing::debug!("instantiating {}", class.name);

    if positional.len() > class.fields.len() {
        return Err(LoamError::Eval(format!(
            "{} takes at most {} values, got {}",
            class.name,
            class.fields.len(),
            positional.len()
        )));
    }

    let mut fields = HashMap::new();
    for (field, value) in class.fields.iter().zip(positional) {
        fields.insert(field.name.clone(), value.clone());
    }
    for (name, value) in named {
        if !class.fields.iter().any(|f| &f.name == name) {
            return Err(LoamError::Eval(format!(
                "{} has no field '{}'",
                class.name, name
            )));
        }
        if fields.contains_key(name) {
            return Err(LoamError::Eval(format!(
                "duplicate value for field '{}'",
                name
            )));
        }
        fields.insert(name.clone(), value.clone());
    }

    let ctx = EvalContext::new(namespace);
    for field in &class.fields {
        if !fields.contains_key(&field.name) {
            match &field.default {
                Some(default) => {
                    fields.insert(field.name.clone(), ctx.eval_expr(default)?);
                }
                None => return Err(LoamError::MissingArgument(field.name.clone())),
            }
        }
    }

    Ok(Value::Object(fields))
}

/// Read, parse, execute, and register the unit at `path`.
///
/// `stack` holds the canonical paths currently being executed, to cut off
/// circular `use` chains.
pub(crate) fn load_unit(
    path: &Path,
    registry: &UnitRegistry,
    stack: &mut Vec<PathBuf>,
) -> Result<Arc<Namespace>> {
    let load_err = |message: String| LoamError::Load {
        path: path.display().to_string(),
        message,
    };

    if path.extension().and_then(|e| e.to_str()) != Some(registry::UNIT_EXTENSION) {
        return Err(load_err("not a loam unit file".to_string()));
    }

    let canonical = path.canonicalize().map_err(|e| load_err(e.to_string()))?;
    if stack.contains(&canonical) {
        return Err(load_err("circular use chain".to_string()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    let source: UnitSource = serde_yaml::from_str(&content).map_err(|e| load_err(e.to_string()))?;

    let name = registry::synthetic_name(path);
    tracing::debug!("executing unit {} from {}", name, path.display());

    stack.push(canonical);
    let executed = execute_unit(&source, &name, path, registry, stack);
    stack.pop();

    let namespace = Arc::new(executed?);
    registry.insert(&name, namespace.clone());
    Ok(namespace)
}

/// Run the top-level defs of a parsed unit in order
pub(crate) fn execute_unit(
    source: &UnitSource,
    name: &str,
    path: &Path,
    registry: &UnitRegistry,
    stack: &mut Vec<PathBuf>,
) -> Result<Namespace> {
    if source.defs.is_empty() {
        tracing::warn!("unit {} has no defs", name);
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut namespace = Namespace::new(name);

    for def in &source.defs {
        match def {
            Def::Let(def) => {
                let value = match (&def.value, &def.expr) {
                    (Some(literal), None) => Value::from_yaml(literal),
                    // evaluated against the namespace built so far; failures
                    // propagate out of load() unmodified
                    (None, Some(expr)) => EvalContext::new(&namespace).eval_expr(expr)?,
                    _ => {
                        return Err(LoamError::Load {
                            path: path.display().to_string(),
                            message: format!(
                                "let '{}' needs exactly one of value or expr",
                                def.name
                            ),
                        })
                    }
                };
                namespace.insert(&def.name, Binding::Value(value));
            }
            Def::Fn(def) => {
                namespace.insert(&def.name, Binding::Function(Arc::new(def.clone())));
            }
            Def::Class(def) => {
                namespace.insert(&def.name, Binding::Class(Arc::new(def.clone())));
            }
            Def::Use(def) => {
                let target = base_dir.join(&def.path);
                // resolve through the registry first, so repeated imports
                // share one loaded unit
                let unit = match registry.get(&registry::synthetic_name(&target)) {
                    Some(unit) => unit,
                    None => load_unit(&target, registry, stack)?,
                };
                let alias = match &def.alias {
                    Some(alias) => alias.clone(),
                    None => target
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(str::to_string)
                        .ok_or_else(|| LoamError::Load {
                            path: path.display().to_string(),
                            message: format!("cannot derive a binding name from '{}'", def.path),
                        })?,
                };
                namespace.insert(&alias, Binding::Unit(unit));
            }
        }
    }

    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_source(yaml: &str) -> Result<Namespace> {
        let source: UnitSource = serde_yaml::from_str(yaml).unwrap();
        let registry = UnitRegistry::new();
        execute_unit(
            &source,
            "loaded_test",
            Path::new("test.loam"),
            &registry,
            &mut Vec::new(),
        )
    }

    fn get_value(ns: &Namespace, name: &str) -> Value {
        match ns.get(name) {
            Some(Binding::Value(v)) => v.clone(),
            other => panic!("expected variable for '{}', got {:?}", name, other),
        }
    }

    #[test]
    fn test_expressions() {
        let ns = Namespace::new("loaded_test");
        let ctx = EvalContext::new(&ns);

        assert_eq!(ctx.eval_expr("1 + 2").unwrap(), Value::Int(3));
        assert_eq!(ctx.eval_expr("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(ctx.eval_expr("6 / 2").unwrap(), Value::Int(3));
        assert_eq!(ctx.eval_expr("2.5 * 2").unwrap(), Value::Float(5.0));
        assert_eq!(ctx.eval_expr("3 >= 3").unwrap(), Value::Bool(true));
        assert_eq!(ctx.eval_expr("'a' + 'b'").unwrap(), Value::Str("ab".to_string()));
        assert_eq!(ctx.eval_expr("'a' == 'b'").unwrap(), Value::Bool(false));
        assert_eq!(ctx.eval_expr("true").unwrap(), Value::Bool(true));
        assert_eq!(ctx.eval_expr("null").unwrap(), Value::Null);
    }

    #[test]
    fn test_division_by_zero() {
        let ns = Namespace::new("loaded_test");
        let ctx = EvalContext::new(&ns);

        assert!(matches!(
            ctx.eval_expr("1 / 0"),
            Err(LoamError::Eval(_))
        ));
        assert!(matches!(
            ctx.eval_expr("1.5 / 0"),
            Err(LoamError::Eval(_))
        ));
    }

    #[test]
    fn test_integer_overflow_is_an_eval_error() {
        let ns = Namespace::new("loaded_test");
        let ctx = EvalContext::new(&ns);

        assert!(matches!(
            ctx.eval_expr("9223372036854775807 + 1"),
            Err(LoamError::Eval(_))
        ));
        assert!(matches!(
            ctx.eval_expr("-9223372036854775808 * -1"),
            Err(LoamError::Eval(_))
        ));
        // exact quotient that does not fit in an integer
        assert!(matches!(
            ctx.eval_expr("-9223372036854775808 / -1"),
            Err(LoamError::Eval(_))
        ));
    }

    #[test]
    fn test_unknown_name() {
        let ns = Namespace::new("loaded_test");
        let ctx = EvalContext::new(&ns);

        assert!(matches!(ctx.eval_expr("ghost"), Err(LoamError::Eval(_))));
    }

    #[test]
    fn test_execute_lets_in_order() {
        let ns = run_source(
            r#"
defs:
  - let: pi
    value: 3.0
  - let: tau
    expr: "2 * pi"
"#,
        )
        .unwrap();

        assert_eq!(get_value(&ns, "tau"), Value::Float(6.0));
    }

    #[test]
    fn test_let_needs_exactly_one_source() {
        let result = run_source(
            r#"
defs:
  - let: x
"#,
        );
        assert!(matches!(result, Err(LoamError::Load { .. })));

        let result = run_source(
            r#"
defs:
  - let: x
    value: 1
    expr: "2"
"#,
        );
        assert!(matches!(result, Err(LoamError::Load { .. })));
    }

    #[test]
    fn test_load_time_eval_error_propagates() {
        let result = run_source(
            r#"
defs:
  - let: boom
    expr: "1 / 0"
"#,
        );
        assert!(matches!(result, Err(LoamError::Eval(_))));
    }

    #[test]
    fn test_call_function_positional_and_named() {
        let ns = run_source(
            r#"
defs:
  - fn: add
    params: [a, b]
    body:
      - expr: "a + b"
"#,
        )
        .unwrap();

        let func = match ns.get("add") {
            Some(Binding::Function(f)) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };

        let result = call_function(&func, &ns, &[Value::Int(1), Value::Int(2)], &HashMap::new());
        assert_eq!(result.unwrap(), Value::Int(3));

        let mut named = HashMap::new();
        named.insert("b".to_string(), Value::Int(10));
        let result = call_function(&func, &ns, &[Value::Int(1)], &named);
        assert_eq!(result.unwrap(), Value::Int(11));
    }

    #[test]
    fn test_call_argument_errors() {
        let ns = run_source(
            r#"
defs:
  - fn: double
    params: [x]
    body:
      - expr: "x * 2"
"#,
        )
        .unwrap();

        let func = match ns.get("double") {
            Some(Binding::Function(f)) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };

        // missing argument
        let result = call_function(&func, &ns, &[], &HashMap::new());
        assert!(matches!(result, Err(LoamError::MissingArgument(_))));

        // too many positional
        let result = call_function(
            &func,
            &ns,
            &[Value::Int(1), Value::Int(2)],
            &HashMap::new(),
        );
        assert!(matches!(result, Err(LoamError::Eval(_))));

        // duplicate via named
        let mut named = HashMap::new();
        named.insert("x".to_string(), Value::Int(3));
        let result = call_function(&func, &ns, &[Value::Int(1)], &named);
        assert!(matches!(result, Err(LoamError::Eval(_))));

        // unknown named parameter
        let mut named = HashMap::new();
        named.insert("y".to_string(), Value::Int(3));
        let result = call_function(&func, &ns, &[Value::Int(1)], &named);
        assert!(matches!(result, Err(LoamError::Eval(_))));
    }

    #[test]
    fn test_function_steps_bind_and_return() {
        let ns = run_source(
            r#"
defs:
  - fn: describe
    params: [name, count]
    body:
      - bind: doubled
        expr: "count * 2"
      - bind: message
        template: "{name} has {doubled}"
      - return: "message"
"#,
        )
        .unwrap();

        let func = match ns.get("describe") {
            Some(Binding::Function(f)) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };

        let result = call_function(
            &func,
            &ns,
            &[Value::Str("bag".to_string()), Value::Int(4)],
            &HashMap::new(),
        );
        assert_eq!(result.unwrap(), Value::Str("bag has 8".to_string()));
    }

    #[test]
    fn test_guarded_steps() {
        let ns = run_source(
            r#"
defs:
  - fn: clamp
    params: [x, limit]
    body:
      - when: "x > limit"
        return: "limit"
      - expr: "x"
"#,
        )
        .unwrap();

        let func = match ns.get("clamp") {
            Some(Binding::Function(f)) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };

        let result = call_function(&func, &ns, &[Value::Int(9), Value::Int(3)], &HashMap::new());
        assert_eq!(result.unwrap(), Value::Int(3));

        let result = call_function(&func, &ns, &[Value::Int(2), Value::Int(3)], &HashMap::new());
        assert_eq!(result.unwrap(), Value::Int(2));
    }

    #[test]
    fn test_function_reads_namespace_variables() {
        let ns = run_source(
            r#"
defs:
  - let: base
    value: 100
  - fn: bump
    params: [x]
    body:
      - expr: "base + x"
"#,
        )
        .unwrap();

        let func = match ns.get("bump") {
            Some(Binding::Function(f)) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };

        let result = call_function(&func, &ns, &[Value::Int(5)], &HashMap::new());
        assert_eq!(result.unwrap(), Value::Int(105));
    }

    #[test]
    fn test_instantiate_with_defaults() {
        let ns = run_source(
            r#"
defs:
  - class: Circle
    fields:
      - name: radius
      - name: label
        default: "'disc'"
"#,
        )
        .unwrap();

        let class = match ns.get("Circle") {
            Some(Binding::Class(c)) => c.clone(),
            other => panic!("expected class, got {:?}", other),
        };

        let instance = instantiate_class(&class, &ns, &[Value::Int(5)], &HashMap::new()).unwrap();
        let fields = instance.as_object().unwrap();
        assert_eq!(fields["radius"], Value::Int(5));
        assert_eq!(fields["label"], Value::Str("disc".to_string()));

        // missing field without default
        let result = instantiate_class(&class, &ns, &[], &HashMap::new());
        assert!(matches!(result, Err(LoamError::MissingArgument(_))));

        // unknown field
        let mut named = HashMap::new();
        named.insert("area".to_string(), Value::Int(1));
        let result = instantiate_class(&class, &ns, &[Value::Int(5)], &named);
        assert!(matches!(result, Err(LoamError::Eval(_))));
    }
}
