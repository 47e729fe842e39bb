use std::cell::Cell;
use std::rc::Rc;

use crate::core::{
    EvalError, JSObjectDataPtr, NativeFunction, ObjectKind, PropertyKey, Protector, SymbolData, Value, new_js_object_data,
};
use crate::{js_array, js_iterator, js_iterator_helpers, js_set, raise_range_error, raise_type_error};

const STACK_LIMIT_VAR: &str = "JS_ITERATION_STACK_LIMIT";
const FAST_PATH_VAR: &str = "JS_ITERATION_FAST_PATH";

/// Arrays keep every slot in one `Vec`; writes that would grow it past this
/// raise `RangeError` instead of attempting the allocation.
pub(crate) const MAX_DENSE_LENGTH: usize = 1 << 22;

#[derive(Clone, Debug)]
pub struct RealmOptions {
    /// Maximum nesting of calls made through [`Realm::call`] before a
    /// `RangeError` is raised.
    pub stack_limit: usize,
    /// When false the iteration protector starts out invalidated and every
    /// iteration takes the generic protocol path.
    pub fast_iteration: bool,
}

impl Default for RealmOptions {
    fn default() -> Self {
        RealmOptions {
            stack_limit: 256,
            fast_iteration: true,
        }
    }
}

impl RealmOptions {
    /// Defaults overridden by `JS_ITERATION_STACK_LIMIT` and
    /// `JS_ITERATION_FAST_PATH`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut opts = RealmOptions::default();
        if let Ok(raw) = std::env::var(STACK_LIMIT_VAR) {
            match parse_stack_limit(&raw) {
                Some(n) => opts.stack_limit = n,
                None => log::warn!("ignoring invalid {STACK_LIMIT_VAR}={raw:?}"),
            }
        }
        if let Ok(raw) = std::env::var(FAST_PATH_VAR) {
            match parse_flag(&raw) {
                Some(b) => opts.fast_iteration = b,
                None => log::warn!("ignoring invalid {FAST_PATH_VAR}={raw:?}"),
            }
        }
        opts
    }
}

fn parse_stack_limit(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// The builtin prototype objects of a realm.
pub struct Intrinsics {
    pub object_prototype: JSObjectDataPtr,
    pub function_prototype: JSObjectDataPtr,
    pub iterator_prototype: JSObjectDataPtr,
    pub array_prototype: JSObjectDataPtr,
    pub array_iterator_prototype: JSObjectDataPtr,
    pub set_prototype: JSObjectDataPtr,
    pub set_iterator_prototype: JSObjectDataPtr,
    pub iterator_helper_prototype: JSObjectDataPtr,
}

impl Intrinsics {
    fn new() -> Self {
        let object_prototype = new_js_object_data(ObjectKind::Ordinary, None);
        let derived = |proto: &JSObjectDataPtr| new_js_object_data(ObjectKind::Ordinary, Some(proto.clone()));
        let iterator_prototype = derived(&object_prototype);
        Intrinsics {
            function_prototype: derived(&object_prototype),
            array_prototype: derived(&object_prototype),
            set_prototype: derived(&object_prototype),
            array_iterator_prototype: derived(&iterator_prototype),
            set_iterator_prototype: derived(&iterator_prototype),
            iterator_helper_prototype: derived(&iterator_prototype),
            iterator_prototype,
            object_prototype,
        }
    }
}

/// One engine instance: its intrinsics, well-known symbols, the iteration
/// protector and the call-depth budget.
pub struct Realm {
    options: RealmOptions,
    intrinsics: Intrinsics,
    symbol_iterator: Rc<SymbolData>,
    symbol_to_string_tag: Rc<SymbolData>,
    iteration_protector: Protector,
    call_depth: Cell<usize>,
}

impl Default for Realm {
    fn default() -> Self {
        Realm::new()
    }
}

impl Realm {
    pub fn new() -> Self {
        Realm::with_options(RealmOptions::default())
    }

    pub fn with_options(options: RealmOptions) -> Self {
        let realm = Realm {
            intrinsics: Intrinsics::new(),
            symbol_iterator: SymbolData::new(Some("Symbol.iterator")),
            symbol_to_string_tag: SymbolData::new(Some("Symbol.toStringTag")),
            iteration_protector: Protector::new("IterationProtector"),
            call_depth: Cell::new(0),
            options,
        };
        js_iterator::initialize_iterator_prototype(&realm);
        js_array::initialize_array(&realm);
        js_set::initialize_set(&realm);
        js_iterator_helpers::initialize_iterator_helpers(&realm);
        if !realm.options.fast_iteration {
            realm.iteration_protector.invalidate();
        }
        log::debug!("realm created with {:?}", realm.options);
        realm
    }

    pub fn options(&self) -> &RealmOptions {
        &self.options
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn symbol_iterator(&self) -> &Rc<SymbolData> {
        &self.symbol_iterator
    }

    pub fn symbol_to_string_tag(&self) -> &Rc<SymbolData> {
        &self.symbol_to_string_tag
    }

    pub fn iteration_protector_intact(&self) -> bool {
        self.iteration_protector.is_intact()
    }

    #[cfg(test)]
    pub(crate) fn iteration_protector(&self) -> &Protector {
        &self.iteration_protector
    }

    // -----------------------------------------------------------------------
    // Object construction
    // -----------------------------------------------------------------------

    pub fn new_object(&self) -> Value {
        Value::Object(new_js_object_data(
            ObjectKind::Ordinary,
            Some(self.intrinsics.object_prototype.clone()),
        ))
    }

    /// An ordinary object inheriting from `%IteratorPrototype%`, so the
    /// iterator helper methods are reachable from it.
    pub fn new_iterator_object(&self) -> Value {
        Value::Object(new_js_object_data(
            ObjectKind::Ordinary,
            Some(self.intrinsics.iterator_prototype.clone()),
        ))
    }

    pub fn new_function<F>(&self, name: &str, length: usize, f: F) -> Value
    where
        F: Fn(&Realm, &Value, &[Value]) -> Result<Value, EvalError> + 'static,
    {
        let func = NativeFunction {
            name: name.to_string(),
            length,
            func: Rc::new(f),
        };
        let obj = new_js_object_data(ObjectKind::Function(func), Some(self.intrinsics.function_prototype.clone()));
        {
            let mut data = obj.borrow_mut();
            for (key, value) in [("name", Value::from(name)), ("length", Value::Number(length as f64))] {
                data.properties.insert(key.into(), value);
                data.set_non_enumerable(key);
                data.set_non_writable(key);
            }
        }
        Value::Object(obj)
    }

    pub fn create_array(&self, items: Vec<Value>) -> Value {
        self.create_holey_array(items.into_iter().map(Some).collect())
    }

    /// `None` entries are holes.
    pub fn create_holey_array(&self, elements: Vec<Option<Value>>) -> Value {
        Value::Object(new_js_object_data(
            ObjectKind::Array(elements),
            Some(self.intrinsics.array_prototype.clone()),
        ))
    }

    pub fn create_set(&self, items: Vec<Value>) -> Value {
        js_set::create_set(self, items)
    }

    /// `{ value, done }` as an ordinary object.
    pub fn create_iter_result(&self, value: Value, done: bool) -> Value {
        let obj = new_js_object_data(ObjectKind::Ordinary, Some(self.intrinsics.object_prototype.clone()));
        {
            let mut data = obj.borrow_mut();
            data.properties.insert("value".into(), value);
            data.properties.insert("done".into(), Value::Boolean(done));
        }
        Value::Object(obj)
    }

    /// Installs a non-enumerable builtin method. Never trips the protector.
    pub(crate) fn define_builtin_function<F>(&self, target: &JSObjectDataPtr, key: PropertyKey, name: &str, length: usize, f: F)
    where
        F: Fn(&Realm, &Value, &[Value]) -> Result<Value, EvalError> + 'static,
    {
        let func = self.new_function(name, length, f);
        let mut data = target.borrow_mut();
        data.properties.insert(key.clone(), func);
        data.set_non_enumerable(key);
    }

    pub(crate) fn define_builtin_value(&self, target: &JSObjectDataPtr, key: PropertyKey, value: Value) {
        let mut data = target.borrow_mut();
        data.properties.insert(key.clone(), value);
        data.set_non_enumerable(key.clone());
        data.set_non_writable(key);
    }

    // -----------------------------------------------------------------------
    // Property access
    // -----------------------------------------------------------------------

    /// `[[Get]]` along the prototype chain, running accessors with `target`
    /// as the receiver. Primitives other than null/undefined have no
    /// properties here.
    pub fn get(&self, target: &Value, key: impl Into<PropertyKey>) -> Result<Value, EvalError> {
        let key = key.into();
        let obj = match target {
            Value::Object(o) => o.clone(),
            Value::Undefined | Value::Null => {
                return Err(raise_type_error!("Cannot read properties of {} (reading '{}')", target, key).into());
            }
            _ => return Ok(Value::Undefined),
        };
        let mut current = Some(obj);
        while let Some(o) = current {
            let (found, proto) = {
                let data = o.borrow();
                (data.get_own(&key), data.prototype.clone())
            };
            match found {
                Some(Value::Property { getter, .. }) => {
                    return match getter {
                        Some(g) => self.call(&g, target, &[]),
                        None => Ok(Value::Undefined),
                    };
                }
                Some(v) => return Ok(v),
                None => current = proto,
            }
        }
        Ok(Value::Undefined)
    }

    /// `[[Set]]` in sloppy mode: writes to non-writable properties are
    /// ignored, inherited setters run with `target` as the receiver.
    pub fn set(&self, target: &Value, key: impl Into<PropertyKey>, value: Value) -> Result<(), EvalError> {
        let key = key.into();
        let Value::Object(obj) = target else {
            return Err(raise_type_error!("Cannot set property '{}' on {}", key, target).into());
        };

        let mut current = Some(obj.clone());
        while let Some(o) = current {
            let (found, writable, proto) = {
                let data = o.borrow();
                (data.properties.get(&key).cloned(), data.is_writable(&key), data.prototype.clone())
            };
            match found {
                Some(Value::Property { setter, .. }) => {
                    if let Some(s) = setter {
                        self.call(&s, target, &[value])?;
                    }
                    return Ok(());
                }
                Some(_) if !writable => {
                    log::trace!("ignoring write to read-only property '{}'", key);
                    return Ok(());
                }
                Some(_) => break,
                None => current = proto,
            }
        }

        {
            let mut data = obj.borrow_mut();
            let handled = match (&mut data.kind, key.as_array_index()) {
                (ObjectKind::Array(elements), Some(index)) => {
                    if index >= MAX_DENSE_LENGTH {
                        return Err(raise_range_error!("Array index {} exceeds the dense storage limit", index).into());
                    }
                    if index >= elements.len() {
                        elements.resize(index + 1, None);
                    }
                    if let Some(slot) = elements.get_mut(index) {
                        *slot = Some(value.clone());
                    }
                    true
                }
                (ObjectKind::Array(elements), None) if matches!(&key, PropertyKey::String(s) if s == "length") => {
                    let len = crate::core::to_number(&value)?;
                    if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
                        return Err(raise_range_error!("Invalid array length").into());
                    }
                    if len > MAX_DENSE_LENGTH as f64 {
                        return Err(raise_range_error!("Array length {} exceeds the dense storage limit", len).into());
                    }
                    elements.resize(len as usize, None);
                    true
                }
                _ => false,
            };
            if !handled {
                data.properties.insert(key.clone(), value);
            }
        }
        self.note_property_write(obj, &key);
        Ok(())
    }

    /// Defines (or redefines) an own accessor property.
    pub fn define_accessor(
        &self,
        target: &Value,
        key: impl Into<PropertyKey>,
        getter: Option<Value>,
        setter: Option<Value>,
    ) -> Result<(), EvalError> {
        let key = key.into();
        let Value::Object(obj) = target else {
            return Err(raise_type_error!("Cannot define property '{}' on {}", key, target).into());
        };
        obj.borrow_mut().properties.insert(
            key.clone(),
            Value::Property {
                getter: getter.map(Box::new),
                setter: setter.map(Box::new),
            },
        );
        self.note_property_write(obj, &key);
        Ok(())
    }

    pub fn own_property_keys(&self, target: &Value) -> Vec<PropertyKey> {
        let Value::Object(obj) = target else {
            return Vec::new();
        };
        let data = obj.borrow();
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &data.kind {
            keys.extend(
                elements
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.is_some())
                    .map(|(i, _)| PropertyKey::from(i)),
            );
        }
        keys.extend(data.properties.keys().cloned());
        keys
    }

    pub fn is_enumerable(&self, target: &Value, key: impl Into<PropertyKey>) -> bool {
        let key = key.into();
        match target {
            Value::Object(obj) => {
                let data = obj.borrow();
                data.get_own(&key).is_some() && data.is_enumerable(&key)
            }
            _ => false,
        }
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        matches!(value, Value::Object(o) if o.borrow().is_callable())
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Calls `callee` with the given receiver. Each nested call consumes one
    /// unit of the stack budget; the budget is returned on unwind.
    pub fn call(&self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
        let func = match callee {
            Value::Object(o) => match &o.borrow().kind {
                ObjectKind::Function(f) => Some(f.func.clone()),
                _ => None,
            },
            _ => None,
        };
        let Some(func) = func else {
            return Err(raise_type_error!("{} is not a function", callee).into());
        };

        let depth = self.call_depth.get();
        if depth >= self.options.stack_limit {
            log::trace!("call depth {} reached the stack limit", depth);
            return Err(raise_range_error!("Maximum call stack size exceeded").into());
        }
        self.call_depth.set(depth + 1);
        let result = func(self, this, args);
        self.call_depth.set(depth);
        result
    }

    /// `receiver[name](...args)`
    pub fn invoke(&self, receiver: &Value, name: impl Into<PropertyKey>, args: &[Value]) -> Result<Value, EvalError> {
        let name = name.into();
        let method = self.get(receiver, name.clone())?;
        if !self.is_callable(&method) {
            return Err(raise_type_error!("{}.{} is not a function", receiver, name).into());
        }
        self.call(&method, receiver, args)
    }

    pub fn call_depth(&self) -> usize {
        self.call_depth.get()
    }

    // -----------------------------------------------------------------------
    // Protector bookkeeping
    // -----------------------------------------------------------------------

    fn note_property_write(&self, obj: &JSObjectDataPtr, key: &PropertyKey) {
        if !self.iteration_protector.is_intact() {
            return;
        }
        let iterator_key = PropertyKey::from(&self.symbol_iterator);
        let next_key = PropertyKey::from("next");
        let i = &self.intrinsics;
        let guarded = [
            (&i.array_prototype, &iterator_key),
            (&i.set_prototype, &iterator_key),
            (&i.iterator_prototype, &iterator_key),
            (&i.array_iterator_prototype, &next_key),
            (&i.set_iterator_prototype, &next_key),
        ];
        if guarded.iter().any(|&(o, k)| Rc::ptr_eq(o, obj) && k == key) {
            log::debug!("write to guarded slot '{}' on {}", key, obj.borrow().class_name());
            self.iteration_protector.invalidate();
        }
    }
}
