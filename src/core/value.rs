use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::core::{EvalError, PropertyKey, Realm, SymbolData};
use crate::js_iterator_helpers::HelperState;
use crate::raise_type_error;

/// Signature of every callable in the realm: `(realm, this, args)`.
pub type NativeFn = Rc<dyn Fn(&Realm, &Value, &[Value]) -> Result<Value, EvalError>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub length: usize,
    pub func: NativeFn,
}

/// Insertion-ordered Set storage. Deleted entries become tombstones so that
/// live iterators keep their positions.
#[derive(Clone, Default)]
pub struct JSSet {
    pub entries: Vec<Option<Value>>,
    live: usize,
}

impl JSSet {
    pub fn add(&mut self, value: Value) {
        if self.has(&value) {
            return;
        }
        // -0 is normalised to +0 on insertion
        let value = match value {
            Value::Number(n) if n == 0.0 => Value::Number(0.0),
            other => other,
        };
        self.entries.push(Some(value));
        self.live += 1;
    }

    pub fn has(&self, value: &Value) -> bool {
        self.entries.iter().flatten().any(|v| same_value_zero(v, value))
    }

    pub fn delete(&mut self, value: &Value) -> bool {
        for slot in self.entries.iter_mut() {
            if slot.as_ref().is_some_and(|v| same_value_zero(v, value)) {
                *slot = None;
                self.live -= 1;
                return true;
            }
        }
        false
    }

    pub fn size(&self) -> usize {
        self.live
    }

    /// Returns the first live entry at or after `*cursor` and moves the
    /// cursor past it.
    pub fn next_from(&self, cursor: &mut usize) -> Option<Value> {
        while let Some(slot) = self.entries.get(*cursor) {
            *cursor += 1;
            if let Some(v) = slot {
                return Some(v.clone());
            }
        }
        None
    }
}

/// State of a builtin array or Set iterator. `target` is dropped once the
/// iterator reports exhaustion, so it never restarts.
#[derive(Clone)]
pub struct BuiltinIteratorState {
    pub target: Option<JSObjectDataPtr>,
    pub index: usize,
}

pub enum ObjectKind {
    Ordinary,
    Function(NativeFunction),
    /// Packed or holey element storage; `None` is a hole.
    Array(Vec<Option<Value>>),
    Set(JSSet),
    ArrayIterator(BuiltinIteratorState),
    SetIterator(BuiltinIteratorState),
    IteratorHelper(Box<HelperState>),
}

pub type JSObjectDataPtr = Rc<RefCell<JSObjectData>>;

pub struct JSObjectData {
    pub properties: IndexMap<PropertyKey, Value>,
    pub non_enumerable: HashSet<PropertyKey>,
    pub non_writable: HashSet<PropertyKey>,
    pub prototype: Option<JSObjectDataPtr>,
    pub kind: ObjectKind,
}

#[inline]
pub fn new_js_object_data(kind: ObjectKind, prototype: Option<JSObjectDataPtr>) -> JSObjectDataPtr {
    Rc::new(RefCell::new(JSObjectData::new(kind, prototype)))
}

impl JSObjectData {
    pub fn new(kind: ObjectKind, prototype: Option<JSObjectDataPtr>) -> Self {
        JSObjectData {
            properties: IndexMap::new(),
            non_enumerable: HashSet::new(),
            non_writable: HashSet::new(),
            prototype,
            kind,
        }
    }

    pub fn set_non_enumerable(&mut self, key: impl Into<PropertyKey>) {
        self.non_enumerable.insert(key.into());
    }

    pub fn set_non_writable(&mut self, key: impl Into<PropertyKey>) {
        self.non_writable.insert(key.into());
    }

    pub fn is_enumerable(&self, key: &PropertyKey) -> bool {
        !self.non_enumerable.contains(key)
    }

    pub fn is_writable(&self, key: &PropertyKey) -> bool {
        !self.non_writable.contains(key)
    }

    /// Own property lookup, including the virtual `length` and index
    /// properties of arrays. Holes are absent.
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        if let ObjectKind::Array(elements) = &self.kind {
            if let Some(index) = key.as_array_index() {
                return elements.get(index).cloned().flatten();
            }
            if matches!(key, PropertyKey::String(s) if s == "length") {
                return Some(Value::Number(elements.len() as f64));
            }
        }
        self.properties.get(key).cloned()
    }

    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Set(_) => "Set",
            ObjectKind::ArrayIterator(_) => "Array Iterator",
            ObjectKind::SetIterator(_) => "Set Iterator",
            ObjectKind::IteratorHelper(_) => "Iterator Helper",
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Symbol(Rc<SymbolData>),
    Object(JSObjectDataPtr),
    /// Accessor slot stored in a property map.
    Property {
        getter: Option<Box<Value>>,
        setter: Option<Box<Value>>,
    },
}

impl Value {
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_object(&self) -> Option<&JSObjectDataPtr> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(o) if o.borrow().is_callable() => "function",
            Value::Object(_) | Value::Property { .. } => "object",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<JSObjectDataPtr> for Value {
    fn from(o: JSObjectDataPtr) -> Self {
        Value::Object(o)
    }
}

/// Identity for objects and symbols, SameValueZero for numbers.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value_zero(self, other)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", value_to_string(other)),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", value_to_string(self))
    }
}

pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => (x.is_nan() && y.is_nan()) || x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn to_boolean(val: &Value) -> bool {
    match val {
        Value::Boolean(b) => *b,
        Value::Undefined | Value::Null => false,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// ToNumber without ToPrimitive: objects convert to NaN.
pub fn to_number(val: &Value) -> Result<f64, EvalError> {
    match val {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s)),
        Value::Symbol(_) => Err(raise_type_error!("Cannot convert a Symbol value to a number").into()),
        Value::Object(_) | Value::Property { .. } => Ok(f64::NAN),
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    // Rust accepts spellings like "inf" and "nan" that JavaScript does not
    if t.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.clone(),
        Value::Symbol(sym) => PropertyKey::Symbol(sym.clone()).to_string(),
        Value::Property { .. } => "[accessor]".to_string(),
        Value::Object(obj) => {
            let Ok(data) = obj.try_borrow() else {
                return "[object]".to_string();
            };
            match &data.kind {
                ObjectKind::Function(f) => format!("function {}() {{ [native code] }}", f.name),
                ObjectKind::Array(elements) => elements
                    .iter()
                    .map(|e| match e {
                        None | Some(Value::Undefined) | Some(Value::Null) => String::new(),
                        Some(Value::Object(_)) => "[object]".to_string(),
                        Some(v) => value_to_string(v),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                _ => format!("[object {}]", data.class_name()),
            }
        }
    }
}
