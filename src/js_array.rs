use crate::core::{BuiltinIteratorState, EvalError, JSObjectDataPtr, ObjectKind, PropertyKey, Realm, Value, new_js_object_data};
use crate::raise_type_error;

/// Install `Array.prototype.values`, its `[Symbol.iterator]` alias, `push`,
/// and `%ArrayIteratorPrototype%.next`.
pub fn initialize_array(realm: &Realm) {
    let array_proto = &realm.intrinsics().array_prototype;

    // Array.prototype[@@iterator] is the same function object as values
    let values = realm.new_function("values", 0, handle_array_values);
    {
        let mut proto = array_proto.borrow_mut();
        let iterator_key = PropertyKey::from(realm.symbol_iterator());
        proto.properties.insert("values".into(), values.clone());
        proto.set_non_enumerable("values");
        proto.properties.insert(iterator_key.clone(), values);
        proto.set_non_enumerable(iterator_key);
    }
    realm.define_builtin_function(array_proto, "push".into(), "push", 1, handle_array_push);

    let iter_proto = &realm.intrinsics().array_iterator_prototype;
    realm.define_builtin_function(iter_proto, "next".into(), "next", 0, handle_array_iterator_next);
    realm.define_builtin_value(
        iter_proto,
        PropertyKey::from(realm.symbol_to_string_tag()),
        Value::from("Array Iterator"),
    );
}

fn this_array(this: &Value, method: &str) -> Result<JSObjectDataPtr, EvalError> {
    match this {
        Value::Object(o) if matches!(o.borrow().kind, ObjectKind::Array(_)) => Ok(o.clone()),
        _ => Err(raise_type_error!("Method Array.prototype.{} called on incompatible receiver {}", method, this).into()),
    }
}

fn handle_array_values(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    let array = this_array(this, "values")?;
    Ok(create_array_iterator(realm, &array))
}

fn handle_array_push(_realm: &Realm, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let array = this_array(this, "push")?;
    let mut data = array.borrow_mut();
    let ObjectKind::Array(elements) = &mut data.kind else {
        return Err(raise_type_error!("Method Array.prototype.push called on incompatible receiver").into());
    };
    elements.extend(args.iter().cloned().map(Some));
    Ok(Value::Number(elements.len() as f64))
}

fn handle_array_iterator_next(realm: &Realm, this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    let iterator = match this {
        Value::Object(o) if matches!(o.borrow().kind, ObjectKind::ArrayIterator(_)) => o.clone(),
        _ => {
            return Err(raise_type_error!("Method Array Iterator.prototype.next called on incompatible receiver {}", this).into());
        }
    };
    Ok(match array_iterator_step(&iterator) {
        Some(value) => realm.create_iter_result(value, false),
        None => realm.create_iter_result(Value::Undefined, true),
    })
}

pub fn create_array_iterator(realm: &Realm, array: &JSObjectDataPtr) -> Value {
    let state = BuiltinIteratorState {
        target: Some(array.clone()),
        index: 0,
    };
    Value::Object(new_js_object_data(
        ObjectKind::ArrayIterator(state),
        Some(realm.intrinsics().array_iterator_prototype.clone()),
    ))
}

/// Element `index` with holes read as `undefined`; `None` past the length.
/// The length is read on every call, so growth during iteration is seen.
pub(crate) fn array_element(array: &JSObjectDataPtr, index: usize) -> Option<Value> {
    match &array.borrow().kind {
        ObjectKind::Array(elements) => elements.get(index).map(|e| e.clone().unwrap_or(Value::Undefined)),
        _ => None,
    }
}

pub(crate) fn array_iterator_step(iterator: &JSObjectDataPtr) -> Option<Value> {
    let mut data = iterator.borrow_mut();
    let ObjectKind::ArrayIterator(state) = &mut data.kind else {
        return None;
    };
    let array = state.target.clone()?;
    match array_element(&array, state.index) {
        Some(value) => {
            state.index += 1;
            Some(value)
        }
        None => {
            state.target = None;
            None
        }
    }
}
