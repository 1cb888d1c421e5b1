//! Runtime values of the expression language.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::ArrowFunction;
use super::scope::Scope;
use super::EvalError;
use crate::dom::{Event, Node};
use crate::reactive::{Signal, SignalId};

/// Containers deeper than this render as empty and compare unequal.
const MAX_VALUE_DEPTH: usize = 64;

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// A function implemented in Rust.
pub struct NativeFunction {
    name: String,
    call: Box<NativeFn>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.call)(args)
    }
}

/// An arrow function together with the scope it was created in.
pub struct Closure {
    pub arrow: Rc<ArrowFunction>,
    pub scope: Scope,
}

#[derive(Clone)]
pub enum Function {
    Native(Rc<NativeFunction>),
    Closure(Rc<Closure>),
}

impl Function {
    pub fn native(
        name: &str,
        call: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Function::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            call: Box::new(call),
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Native(native) => native.name(),
            Function::Closure(_) => "anonymous",
        }
    }

    fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
            (Function::Closure(a), Function::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A dynamically typed expression value.
///
/// Arrays and objects are shared, mutable references; equality is
/// structural for them and by identity for signals, functions, elements
/// and events.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    Signal(Signal<Value>),
    Function(Function),
    Element(Node),
    Event(Event),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The `typeof` name of the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null
            | Value::Array(_)
            | Value::Object(_)
            | Value::Signal(_)
            | Value::Element(_)
            | Value::Event(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Signal(signal) => signal.get().to_number(),
            _ => f64::NAN,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<&Signal<Value>> {
        match self {
            Value::Signal(s) => Some(s),
            _ => None,
        }
    }

    /// Property key form of the value, as used by `obj[key]`.
    pub fn to_key(&self) -> String {
        self.to_string()
    }

    /// Loose equality (`==`): `null == undefined`, numbers compare with
    /// numeric strings and booleans.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (Value::Number(_), Value::String(_) | Value::Bool(_))
            | (Value::String(_) | Value::Bool(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self == other,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.as_str().into()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// A shared container on the path from the value being rendered or compared.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Array(*const RefCell<Vec<Value>>),
    Object(*const RefCell<IndexMap<String, Value>>),
    Signal(SignalId),
}

/// Step into `visit`, unless it is already on `path` or the path is too deep.
fn enter(path: &mut Vec<Visit>, visit: Visit) -> bool {
    if path.len() >= MAX_VALUE_DEPTH || path.contains(&visit) {
        return false;
    }
    path.push(visit);
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, &mut Vec::new())
    }
}

impl Value {
    /// Structural equality. A pair of containers met again further down is
    /// taken as equal, so cyclic values compare without looping.
    fn equals(&self, other: &Value, path: &mut Vec<(Visit, Visit)>) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Visit::Array(Rc::as_ptr(a)), Visit::Array(Rc::as_ptr(b)));
                Self::compare_within(path, pair, |path| {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y, path))
                })
            }
            (Value::Object(a), Value::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let pair = (Visit::Object(Rc::as_ptr(a)), Visit::Object(Rc::as_ptr(b)));
                Self::compare_within(path, pair, |path| {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len()
                        && a.iter()
                            .all(|(key, x)| b.get(key).is_some_and(|y| x.equals(y, path)))
                })
            }
            (Value::Signal(a), Value::Signal(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Element(a), Value::Element(b)) => a == b,
            (Value::Event(a), Value::Event(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn compare_within(
        path: &mut Vec<(Visit, Visit)>,
        pair: (Visit, Visit),
        compare: impl FnOnce(&mut Vec<(Visit, Visit)>) -> bool,
    ) -> bool {
        if path.contains(&pair) {
            return true;
        }
        if path.len() >= MAX_VALUE_DEPTH {
            return false;
        }
        path.push(pair);
        let equal = compare(path);
        path.pop();
        equal
    }

    /// Markup text of the value. Cyclic references render as empty, the way
    /// `Array.prototype.join` treats them.
    fn render(&self, f: &mut fmt::Formatter<'_>, path: &mut Vec<Visit>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                if !enter(path, Visit::Array(Rc::as_ptr(items))) {
                    return Ok(());
                }
                let result = items.borrow().iter().enumerate().try_for_each(|(i, item)| {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if item.is_nullish() {
                        Ok(())
                    } else {
                        item.render(f, path)
                    }
                });
                path.pop();
                result
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Signal(signal) => {
                if !enter(path, Visit::Signal(signal.id())) {
                    return Ok(());
                }
                let result = signal.get().render(f, path);
                path.pop();
                result
            }
            Value::Function(func) => write!(f, "function {}()", func.name()),
            Value::Element(node) => write!(
                f,
                "[element {}]",
                node.tag_name().unwrap_or_default()
            ),
            Value::Event(event) => write!(f, "[event {}]", event.event_type()),
        }
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>, path: &mut Vec<Visit>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                if !enter(path, Visit::Array(Rc::as_ptr(items))) {
                    return f.write_str("[...]");
                }
                let result = (|| {
                    f.write_str("[")?;
                    for (i, item) in items.borrow().iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        item.debug(f, path)?;
                    }
                    f.write_str("]")
                })();
                path.pop();
                result
            }
            Value::Object(map) => {
                if !enter(path, Visit::Object(Rc::as_ptr(map))) {
                    return f.write_str("{...}");
                }
                let result = (|| {
                    f.write_str("{")?;
                    for (i, (key, value)) in map.borrow().iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{key:?}: ")?;
                        value.debug(f, path)?;
                    }
                    f.write_str("}")
                })();
                path.pop();
                result
            }
            Value::Signal(signal) => {
                if !enter(path, Visit::Signal(signal.id())) {
                    return f.write_str("Signal(...)");
                }
                f.write_str("Signal(")?;
                let result = signal.get().debug(f, path);
                path.pop();
                result?;
                f.write_str(")")
            }
            Value::Element(node) => write!(f, "{node:?}"),
            Value::Event(event) => write!(f, "{event:?}"),
            other => other.render(f, path),
        }
    }
}

/// Render a number the way the binding layer writes it into markup.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.into()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug(f, &mut Vec::new())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Signal<Value>> for Value {
    fn from(signal: Signal<Value>) -> Self {
        Value::Signal(signal)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Element(node)
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        Value::Event(event)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}
