use crate::core::{BuiltinIteratorState, EvalError, JSObjectDataPtr, JSSet, ObjectKind, PropertyKey, Realm, Value, new_js_object_data};
use crate::raise_type_error;

/// Initialize the Set prototype and `%SetIteratorPrototype%`.
pub fn initialize_set(realm: &Realm) {
    let set_proto = &realm.intrinsics().set_prototype;

    realm.define_builtin_function(set_proto, "add".into(), "add", 1, handle_set_add);
    realm.define_builtin_function(set_proto, "has".into(), "has", 1, handle_set_has);
    realm.define_builtin_function(set_proto, "delete".into(), "delete", 1, handle_set_delete);

    // Set.prototype[@@iterator] === Set.prototype.values
    let values = realm.new_function("values", 0, handle_set_values);
    {
        let mut proto = set_proto.borrow_mut();
        let iterator_key = PropertyKey::from(realm.symbol_iterator());
        proto.properties.insert("values".into(), values.clone());
        proto.set_non_enumerable("values");
        proto.properties.insert(iterator_key.clone(), values);
        proto.set_non_enumerable(iterator_key);
    }

    let size_getter = realm.new_function("get size", 0, handle_set_size);
    {
        let mut proto = set_proto.borrow_mut();
        proto.properties.insert(
            "size".into(),
            Value::Property {
                getter: Some(Box::new(size_getter)),
                setter: None,
            },
        );
        proto.set_non_enumerable("size");
    }
    realm.define_builtin_value(set_proto, PropertyKey::from(realm.symbol_to_string_tag()), Value::from("Set"));

    let iter_proto = &realm.intrinsics().set_iterator_prototype;
    realm.define_builtin_function(iter_proto, "next".into(), "next", 0, handle_set_iterator_next);
    realm.define_builtin_value(
        iter_proto,
        PropertyKey::from(realm.symbol_to_string_tag()),
        Value::from("Set Iterator"),
    );
}

pub fn create_set(realm: &Realm, items: Vec<Value>) -> Value {
    let mut set = JSSet::default();
    for item in items {
        set.add(item);
    }
    Value::Object(new_js_object_data(ObjectKind::Set(set), Some(realm.intrinsics().set_prototype.clone())))
}

fn this_set(this: &Value, method: &str) -> Result<JSObjectDataPtr, EvalError> {
    match this {
        Value::Object(o) if matches!(o.borrow().kind, ObjectKind::Set(_)) => Ok(o.clone()),
        _ => Err(raise_type_error!("Method Set.prototype.{} called on incompatible receiver {}", method, this).into()),
    }
}

fn with_set<R>(set: &JSObjectDataPtr, f: impl FnOnce(&mut JSSet) -> R) -> Option<R> {
    match &mut set.borrow_mut().kind {
        ObjectKind::Set(s) => Some(f(s)),
        _ => None,
    }
}

fn handle_set_add(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let set = this_set(this, "add")?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    with_set(&set, |s| s.add(value));
    Ok(this.clone())
}

fn handle_set_has(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let set = this_set(this, "has")?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    Ok(Value::Boolean(with_set(&set, |s| s.has(&value)).unwrap_or(false)))
}

fn handle_set_delete(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let set = this_set(this, "delete")?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    Ok(Value::Boolean(with_set(&set, |s| s.delete(&value)).unwrap_or(false)))
}

fn handle_set_size(_realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    let set = this_set(this, "size")?;
    Ok(Value::Number(with_set(&set, |s| s.size()).unwrap_or(0) as f64))
}

fn handle_set_values(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    let set = this_set(this, "values")?;
    Ok(create_set_iterator(realm, &set))
}

pub fn create_set_iterator(realm: &Realm, set: &JSObjectDataPtr) -> Value {
    let state = BuiltinIteratorState {
        target: Some(set.clone()),
        index: 0,
    };
    Value::Object(new_js_object_data(
        ObjectKind::SetIterator(state),
        Some(realm.intrinsics().set_iterator_prototype.clone()),
    ))
}

fn handle_set_iterator_next(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    let iterator = match this {
        Value::Object(o) if matches!(o.borrow().kind, ObjectKind::SetIterator(_)) => o.clone(),
        _ => {
            return Err(raise_type_error!("Method Set Iterator.prototype.next called on incompatible receiver {}", this).into());
        }
    };
    Ok(match set_iterator_step(&iterator) {
        Some(value) => realm.create_iter_result(value, false),
        None => realm.create_iter_result(Value::Undefined, true),
    })
}

pub(crate) fn set_entry_from(set: &JSObjectDataPtr, cursor: &mut usize) -> Option<Value> {
    match &set.borrow().kind {
        ObjectKind::Set(s) => s.next_from(cursor),
        _ => None,
    }
}

pub(crate) fn set_iterator_step(iterator: &JSObjectDataPtr) -> Option<Value> {
    let mut data = iterator.borrow_mut();
    let ObjectKind::SetIterator(state) = &mut data.kind else {
        return None;
    };
    let set = state.target.clone()?;
    let value = set_entry_from(&set, &mut state.index);
    if value.is_none() {
        state.target = None;
    }
    value
}
