//! Tree-walking evaluator.
//!
//! Scope lookups are explicit [`Scope`] accesses. Signal reads through
//! `.value` are recorded on the tracker when one is supplied; writes through
//! `.value` (assignment, compound assignment, `++`/`--`) go to the store.

use std::cell::Cell;
use std::rc::Rc;

use super::ast::{
    ArrowBody, AssignOp, BinaryOp, Expr, Literal, LogicalOp, Statement, UnaryOp, UpdateOp,
};
use super::scope::Scope;
use super::value::{Closure, Function, Value};
use super::EvalError;
use crate::reactive::Tracker;

const MAX_CALL_DEPTH: usize = 128;
/// Nested sub-expressions, counted across closure calls.
const MAX_EVAL_DEPTH: usize = 256;
/// How far past the end of an array an index assignment may reach.
const MAX_ARRAY_GAP: usize = 4096;

/// Evaluates expressions, optionally recording signal reads.
pub struct Evaluator<'t> {
    tracker: Option<&'t Tracker>,
    depth: Cell<usize>,
    nesting: Cell<usize>,
}

/// A resolved assignment target.
enum Place {
    Variable(Rc<str>),
    Property(Value, String),
}

impl<'t> Evaluator<'t> {
    /// An evaluator that does not track reads.
    pub fn untracked() -> Self {
        Self::new(None)
    }

    pub fn tracked(tracker: &'t Tracker) -> Self {
        Self::new(Some(tracker))
    }

    pub fn new(tracker: Option<&'t Tracker>) -> Self {
        Self {
            tracker,
            depth: Cell::new(0),
            nesting: Cell::new(0),
        }
    }

    pub fn eval(&self, expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
        let nesting = self.nesting.get();
        if nesting >= MAX_EVAL_DEPTH {
            return Err(EvalError::NestingLimit(MAX_EVAL_DEPTH));
        }
        self.nesting.set(nesting + 1);
        let result = self.eval_node(expr, scope);
        self.nesting.set(nesting);
        result
    }

    fn eval_node(&self, expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(Rc::clone(s)),
            }),

            Expr::Identifier(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string())),

            Expr::Member {
                object,
                property,
                optional,
            } => {
                let base = self.eval(object, scope)?;
                if *optional && base.is_nullish() {
                    return Ok(Value::Undefined);
                }
                self.get_property(&base, property)
            }

            Expr::Index {
                object,
                index,
                optional,
            } => {
                let base = self.eval(object, scope)?;
                if *optional && base.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = self.eval(index, scope)?;
                self.get_index(&base, &key)
            }

            Expr::Call { callee, args } => {
                let function = self.eval(callee, scope)?;
                let Value::Function(function) = function else {
                    return Err(EvalError::NotCallable(callee.describe()));
                };
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&function, &args)
            }

            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Typeof => Value::from(value.type_name()),
                })
            }

            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                Ok(binary(*op, &left, &right))
            }

            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }

            Expr::Assign { op, target, value } => {
                let place = self.resolve_place(target, scope)?;
                let value = match op {
                    AssignOp::Assign => self.eval(value, scope)?,
                    AssignOp::Compound(op) => {
                        let current = self.read_place(&place, scope)?;
                        let rhs = self.eval(value, scope)?;
                        binary(*op, &current, &rhs)
                    }
                };
                self.write_place(&place, scope, value.clone())?;
                Ok(value)
            }

            Expr::Update { op, prefix, target } => {
                let place = self.resolve_place(target, scope)?;
                let old = self.read_place(&place, scope)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(&place, scope, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }

            Expr::Arrow(arrow) => Ok(Value::Function(Function::Closure(Rc::new(Closure {
                arrow: Rc::clone(arrow),
                scope: scope.clone(),
            })))),

            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(items))
            }

            Expr::Object(entries) => {
                let mut map = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.to_string(), self.eval(value, scope)?);
                }
                Ok(Value::object(map))
            }

            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Invoke a function value with `args`.
    pub fn call(&self, function: &Function, args: &[Value]) -> Result<Value, EvalError> {
        match function {
            Function::Native(native) => native.call(args),
            Function::Closure(closure) => {
                let depth = self.depth.get();
                if depth >= MAX_CALL_DEPTH {
                    return Err(EvalError::RecursionLimit(MAX_CALL_DEPTH));
                }
                self.depth.set(depth + 1);
                let result = self.call_closure(closure, args);
                self.depth.set(depth);
                result
            }
        }
    }

    fn call_closure(&self, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let frame = closure.scope.child();
        for (i, param) in closure.arrow.params.iter().enumerate() {
            frame.define(param.to_string(), args.get(i).cloned().unwrap_or_default());
        }

        match &closure.arrow.body {
            ArrowBody::Expr(body) => self.eval(body, &frame),
            ArrowBody::Block(statements) => {
                for statement in statements {
                    match statement {
                        Statement::Expr(expr) => {
                            self.eval(expr, &frame)?;
                        }
                        Statement::Return(None) => return Ok(Value::Undefined),
                        Statement::Return(Some(expr)) => return self.eval(expr, &frame),
                    }
                }
                Ok(Value::Undefined)
            }
        }
    }

    /// Read a signal, recording the read if tracking.
    pub fn read_signal(&self, signal: &crate::reactive::Signal<Value>) -> Value {
        match self.tracker {
            Some(tracker) => signal.track(tracker),
            None => signal.get(),
        }
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    fn get_property(&self, base: &Value, property: &str) -> Result<Value, EvalError> {
        Ok(match base {
            Value::Undefined | Value::Null => {
                return Err(EvalError::NullishAccess {
                    property: property.to_string(),
                    base: nullish_name(base),
                })
            }
            Value::Signal(signal) => match property {
                "value" => self.read_signal(signal),
                "set" => {
                    let signal = signal.clone();
                    Value::Function(Function::native("set", move |args| {
                        signal.set(args.first().cloned().unwrap_or_default());
                        Ok(Value::Undefined)
                    }))
                }
                _ => Value::Undefined,
            },
            Value::Object(map) => map.borrow().get(property).cloned().unwrap_or_default(),
            Value::Array(items) => match property {
                "length" => Value::Number(items.borrow().len() as f64),
                "push" => {
                    let items = Rc::clone(items);
                    Value::Function(Function::native("push", move |args| {
                        let mut items = items.borrow_mut();
                        items.extend(args.iter().cloned());
                        Ok(Value::Number(items.len() as f64))
                    }))
                }
                "includes" => {
                    let items = Rc::clone(items);
                    Value::Function(Function::native("includes", move |args| {
                        let needle = args.first().cloned().unwrap_or_default();
                        Ok(Value::Bool(items.borrow().contains(&needle)))
                    }))
                }
                "join" => {
                    let items = Rc::clone(items);
                    Value::Function(Function::native("join", move |args| {
                        let separator = args.first().map_or_else(|| ",".to_string(), Value::to_key);
                        let joined = items
                            .borrow()
                            .iter()
                            .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                            .collect::<Vec<_>>()
                            .join(&separator);
                        Ok(Value::from(joined))
                    }))
                }
                _ => Value::Undefined,
            },
            Value::String(s) => match property {
                "length" => Value::Number(s.chars().count() as f64),
                _ => Value::Undefined,
            },
            Value::Element(node) => match property {
                "tagName" => node
                    .tag_name()
                    .map_or(Value::Undefined, |tag| Value::from(tag.to_ascii_uppercase())),
                "textContent" => Value::from(node.text_content()),
                "value" | "id" | "className" => {
                    let attribute = if property == "className" { "class" } else { property };
                    node.attribute(attribute).map_or(Value::Undefined, Value::from)
                }
                _ => Value::Undefined,
            },
            Value::Event(event) => match property {
                "type" => Value::from(event.event_type()),
                "target" => event.target().map_or(Value::Null, Value::Element),
                "currentTarget" => event.current_target().map_or(Value::Null, Value::Element),
                "detail" => Value::from_json(event.detail()),
                "defaultPrevented" => Value::Bool(event.is_default_prevented()),
                "preventDefault" => {
                    let event = event.clone();
                    Value::Function(Function::native("preventDefault", move |_| {
                        event.prevent_default();
                        Ok(Value::Undefined)
                    }))
                }
                "stopPropagation" => {
                    let event = event.clone();
                    Value::Function(Function::native("stopPropagation", move |_| {
                        event.stop_propagation();
                        Ok(Value::Undefined)
                    }))
                }
                _ => Value::Undefined,
            },
            Value::Bool(_) | Value::Number(_) | Value::Function(_) => Value::Undefined,
        })
    }

    fn get_index(&self, base: &Value, key: &Value) -> Result<Value, EvalError> {
        match (base, key) {
            (Value::Array(items), Value::Number(n)) => {
                Ok(array_slot(*n).and_then(|i| items.borrow().get(i).cloned()).unwrap_or_default())
            }
            (Value::String(s), Value::Number(n)) => Ok(array_slot(*n)
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Undefined, |c| Value::from(c.to_string()))),
            _ => self.get_property(base, &key.to_key()),
        }
    }

    fn set_property(&self, base: &Value, property: &str, value: Value) -> Result<(), EvalError> {
        match base {
            Value::Signal(signal) if property == "value" => {
                signal.set(value);
                Ok(())
            }
            Value::Object(map) => {
                let previous = map.borrow_mut().insert(property.to_string(), value);
                drop(previous);
                Ok(())
            }
            Value::Array(items) => match property.parse::<f64>().ok().and_then(array_slot) {
                Some(i) => {
                    let mut items = items.borrow_mut();
                    if i.saturating_sub(items.len()) > MAX_ARRAY_GAP {
                        return Err(EvalError::IndexOutOfRange {
                            index: i,
                            length: items.len(),
                        });
                    }
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                    Ok(())
                }
                None => Err(EvalError::InvalidAssignment(format!("array property `{property}`"))),
            },
            Value::Element(node) => match property {
                "textContent" => {
                    node.set_text_content(&value.to_string());
                    Ok(())
                }
                "value" | "id" => {
                    node.set_attribute(property, &value.to_string());
                    Ok(())
                }
                _ => Err(EvalError::InvalidAssignment(format!("element property `{property}`"))),
            },
            Value::Undefined | Value::Null => Err(EvalError::NullishAccess {
                property: property.to_string(),
                base: nullish_name(base),
            }),
            other => Err(EvalError::InvalidAssignment(format!(
                "property `{property}` of {}",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Assignment targets
    // ------------------------------------------------------------------

    fn resolve_place(&self, target: &Expr, scope: &Scope) -> Result<Place, EvalError> {
        match target {
            Expr::Identifier(name) => Ok(Place::Variable(Rc::clone(name))),
            Expr::Member {
                object, property, ..
            } => Ok(Place::Property(self.eval(object, scope)?, property.to_string())),
            Expr::Index { object, index, .. } => {
                let base = self.eval(object, scope)?;
                let key = self.eval(index, scope)?;
                Ok(Place::Property(base, key.to_key()))
            }
            other => Err(EvalError::InvalidAssignment(other.describe())),
        }
    }

    fn read_place(&self, place: &Place, scope: &Scope) -> Result<Value, EvalError> {
        match place {
            Place::Variable(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string())),
            Place::Property(base, property) => self.get_property_or_index(base, property),
        }
    }

    fn get_property_or_index(&self, base: &Value, property: &str) -> Result<Value, EvalError> {
        match (base, property.parse::<f64>()) {
            (Value::Array(_), Ok(n)) => self.get_index(base, &Value::Number(n)),
            _ => self.get_property(base, property),
        }
    }

    fn write_place(&self, place: &Place, scope: &Scope, value: Value) -> Result<(), EvalError> {
        match place {
            Place::Variable(name) => {
                if scope.assign(name, value) {
                    Ok(())
                } else {
                    Err(EvalError::UndefinedVariable(name.to_string()))
                }
            }
            Place::Property(base, property) => self.set_property(base, property, value),
        }
    }
}

fn nullish_name(value: &Value) -> &'static str {
    if matches!(value, Value::Null) {
        "null"
    } else {
        "undefined"
    }
}

fn array_slot(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let numeric = |v: &Value| {
                matches!(
                    v,
                    Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined
                )
            };
            if numeric(left) && numeric(right) {
                Value::Number(left.to_number() + right.to_number())
            } else {
                Value::from(format!("{left}{right}"))
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => Value::Bool(left == right),
        BinaryOp::StrictNe => Value::Bool(left != right),
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_eq(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Event, Node};
    use crate::expr::parse;
    use crate::reactive::Store;

    fn eval_in(source: &str, scope: &Scope) -> Result<Value, EvalError> {
        Evaluator::untracked().eval(&parse(source).unwrap(), scope)
    }

    fn eval(source: &str) -> Value {
        eval_in(source, &Scope::new()).unwrap()
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("7 % 4 - -1"), Value::from(4));
        assert_eq!(eval("'b' > 'a'"), Value::from(true));
        assert_eq!(eval("typeof 1"), Value::from("number"));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let scope = Scope::new();
        // `missing` is never evaluated
        assert_eq!(eval_in("false && missing", &scope).unwrap(), Value::from(false));
        assert_eq!(eval_in("'x' || missing", &scope).unwrap(), Value::from("x"));
        assert_eq!(eval("null ?? 5"), Value::from(5));
        assert_eq!(eval("0 ?? 5"), Value::from(0));
        assert!(eval_in("missing", &scope).is_err());
    }

    #[test]
    fn closures_capture_scope() {
        let scope = Scope::new();
        scope.define("base", Value::from(10));
        assert_eq!(eval_in("((x) => x + base)(5)", &scope).unwrap(), Value::from(15));
        assert_eq!(
            eval_in("((a, b) => { const_like = a; return a * b })(3, 4)", &scope).unwrap_err(),
            EvalError::UndefinedVariable("const_like".into())
        );
    }

    #[test]
    fn signals_read_and_write_through_value() {
        let store = Store::new();
        let count = store.create_signal(Value::from(1));
        let scope = Scope::new();
        scope.define("count", Value::Signal(count.clone()));

        assert_eq!(eval_in("count.value++", &scope).unwrap(), Value::from(1));
        assert_eq!(count.get(), Value::from(2));

        eval_in("count.value += 10", &scope).unwrap();
        assert_eq!(count.get(), Value::from(12));

        eval_in("count.set('done')", &scope).unwrap();
        assert_eq!(count.get(), Value::from("done"));
    }

    #[test]
    fn tracked_evaluation_records_signal_reads() {
        let store = Store::new();
        let a = store.create_signal(Value::from(2));
        let b = store.create_signal(Value::from(3));
        let scope = Scope::new();
        scope.define("a", Value::Signal(a.clone()));
        scope.define("b", Value::Signal(b.clone()));
        let expr = parse("a.value * b.value").unwrap();

        let (value, deps) = store
            .track(|t| Evaluator::tracked(t).eval(&expr, &scope))
            .unwrap();
        assert_eq!(value.unwrap(), Value::from(6));
        assert!(deps.contains(a.id()));
        assert!(deps.contains(b.id()));
    }

    #[test]
    fn objects_and_arrays_are_shared() {
        let scope = Scope::new();
        scope.define("state", eval("{ items: [1, 2] }"));

        eval_in("state.items.push(3); state.items[0] = 'x'; state.total = state.items.length", &scope)
            .unwrap();
        assert_eq!(eval_in("state.items.join('-')", &scope).unwrap(), Value::from("x-2-3"));
        assert_eq!(eval_in("state.total", &scope).unwrap(), Value::from(3));
        assert_eq!(eval_in("state.nope?.deeper", &scope).unwrap(), Value::Undefined);
    }

    #[test]
    fn nullish_access_is_an_error() {
        let err = eval_in("undefined.x", &Scope::new()).unwrap_err();
        assert!(matches!(err, EvalError::NullishAccess { .. }));
    }

    #[test]
    fn non_function_call_is_an_error() {
        let scope = Scope::new();
        scope.define("n", Value::from(1));
        assert_eq!(
            eval_in("n()", &scope).unwrap_err(),
            EvalError::NotCallable("n".into())
        );
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let scope = Scope::new();
        scope.define("f", Value::Null);
        let err = eval_in("f = () => f(); f()", &scope).unwrap_err();
        assert_eq!(err, EvalError::RecursionLimit(MAX_CALL_DEPTH));
    }

    #[test]
    fn deep_operator_chains_are_bounded() {
        let source = vec!["1"; 2000].join(" + ");
        let err = eval_in(&source, &Scope::new()).unwrap_err();
        assert_eq!(err, EvalError::NestingLimit(MAX_EVAL_DEPTH));

        let source = vec!["1"; 100].join(" + ");
        assert_eq!(eval(&source), Value::from(100));
    }

    #[test]
    fn far_index_assignment_is_refused() {
        let scope = Scope::new();
        scope.define("a", eval("[1, 2]"));

        let err = eval_in("a[1e17] = 1", &scope).unwrap_err();
        assert!(matches!(err, EvalError::IndexOutOfRange { length: 2, .. }), "{err}");
        assert_eq!(eval_in("a.length", &scope).unwrap(), Value::from(2));

        // Appending and short gaps still grow the array
        eval_in("a[2] = 3; a[5] = 6", &scope).unwrap();
        assert_eq!(eval_in("a.length", &scope).unwrap(), Value::from(6));
        assert_eq!(eval_in("a[4]", &scope).unwrap(), Value::Undefined);
    }

    #[test]
    fn self_referencing_object_is_usable() {
        let scope = Scope::new();
        scope.define("o", eval("{ n: 1 }"));
        assert_eq!(eval_in("o.me = o; o.me.me.n", &scope).unwrap(), Value::from(1));
        assert_eq!(eval_in("o.me === o", &scope).unwrap(), Value::from(true));
        assert_eq!(eval_in("'' + o", &scope).unwrap(), Value::from("[object Object]"));
    }

    #[test]
    fn events_and_elements_expose_properties() {
        let button = Node::element("button").with_attribute("id", "go");
        let event = Event::new("click").with_detail(serde_json::json!({ "x": 4 }));
        button.dispatch_event(&event);

        let scope = Scope::new();
        scope.define("$event", Value::Event(event.clone()));
        assert_eq!(eval_in("$event.type", &scope).unwrap(), Value::from("click"));
        assert_eq!(eval_in("$event.target.id", &scope).unwrap(), Value::from("go"));
        assert_eq!(eval_in("$event.target.tagName", &scope).unwrap(), Value::from("BUTTON"));
        assert_eq!(eval_in("$event.detail.x + 1", &scope).unwrap(), Value::from(5));

        eval_in("$event.preventDefault()", &scope).unwrap();
        assert!(event.is_default_prevented());
    }
}
