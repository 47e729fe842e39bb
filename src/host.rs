//! The primitives the iteration machinery needs from its embedding engine.
//!
//! `js_iterator`, `js_foreach` and `js_iterator_helpers` are written against
//! [`HostPrimitives`] only, so the drive loop and the close discipline do not
//! depend on how a particular engine lays out objects or tracks protectors.

use std::rc::Rc;

use crate::core::{EvalError, JSObjectDataPtr, ObjectKind, PropertyKey, Realm, Value, new_js_object_data};
use crate::js_iterator_helpers::HelperState;
use crate::{js_array, js_set};

/// How an iterable will be driven, decided once per call.
pub enum IterableShape {
    /// An array with the builtin iteration hooks: walk its storage.
    FastArray(JSObjectDataPtr),
    /// A Set with the builtin iteration hooks: walk its entries.
    FastSet(JSObjectDataPtr),
    /// A builtin array or Set iterator: advance its state directly.
    FastIterator(JSObjectDataPtr),
    /// Anything else goes through `[Symbol.iterator]` and `next()`.
    Generic,
}

pub trait HostPrimitives {
    fn call(&self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, EvalError>;

    fn get(&self, target: &Value, key: &PropertyKey) -> Result<Value, EvalError>;

    fn is_callable(&self, value: &Value) -> bool;

    /// The `Symbol.iterator` property key.
    fn iterator_key(&self) -> PropertyKey;

    fn create_iter_result(&self, value: Value, done: bool) -> Value;

    fn create_array(&self, items: Vec<Value>) -> Value;

    fn create_iterator_helper(&self, state: HelperState) -> Value;

    /// Must answer [`IterableShape::Generic`] whenever the iteration
    /// protector has been invalidated.
    fn classify_iterable(&self, value: &Value) -> IterableShape;

    /// Element `index` of a fast array, `Some(Undefined)` for a hole and
    /// `None` past the current length.
    fn fast_array_element(&self, array: &JSObjectDataPtr, index: usize) -> Option<Value>;

    /// Next live Set entry at or after `cursor`, advancing it.
    fn fast_set_element(&self, set: &JSObjectDataPtr, cursor: &mut usize) -> Option<Value>;

    /// Advances a builtin iterator; `None` once it is exhausted.
    fn fast_iterator_step(&self, iterator: &JSObjectDataPtr) -> Option<Value>;

    /// The iterator a fast loop over `source` stands in for: a fresh builtin
    /// iterator for an array or Set, the object itself for a builtin
    /// iterator. Only materialised when the loop has to be closed.
    fn fast_close_target(&self, source: &JSObjectDataPtr) -> Value;
}

impl HostPrimitives for Realm {
    fn call(&self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
        Realm::call(self, callee, this, args)
    }

    fn get(&self, target: &Value, key: &PropertyKey) -> Result<Value, EvalError> {
        Realm::get(self, target, key.clone())
    }

    fn is_callable(&self, value: &Value) -> bool {
        Realm::is_callable(self, value)
    }

    fn iterator_key(&self) -> PropertyKey {
        PropertyKey::from(self.symbol_iterator())
    }

    fn create_iter_result(&self, value: Value, done: bool) -> Value {
        Realm::create_iter_result(self, value, done)
    }

    fn create_array(&self, items: Vec<Value>) -> Value {
        Realm::create_array(self, items)
    }

    fn create_iterator_helper(&self, state: HelperState) -> Value {
        Value::Object(new_js_object_data(
            ObjectKind::IteratorHelper(Box::new(state)),
            Some(self.intrinsics().iterator_helper_prototype.clone()),
        ))
    }

    fn classify_iterable(&self, value: &Value) -> IterableShape {
        let Value::Object(obj) = value else {
            return IterableShape::Generic;
        };
        if !self.iteration_protector_intact() {
            return IterableShape::Generic;
        }
        let intrinsics = self.intrinsics();
        let iterator_key = self.iterator_key();
        let next_key = PropertyKey::from("next");
        let data = obj.borrow();
        let inherits = |proto: &JSObjectDataPtr| data.prototype.as_ref().is_some_and(|p| Rc::ptr_eq(p, proto));
        let unpatched = !data.has_own(&iterator_key);
        match &data.kind {
            ObjectKind::Array(_) if unpatched && inherits(&intrinsics.array_prototype) => IterableShape::FastArray(obj.clone()),
            ObjectKind::Set(_) if unpatched && inherits(&intrinsics.set_prototype) => IterableShape::FastSet(obj.clone()),
            ObjectKind::ArrayIterator(_)
                if unpatched && !data.has_own(&next_key) && inherits(&intrinsics.array_iterator_prototype) =>
            {
                IterableShape::FastIterator(obj.clone())
            }
            ObjectKind::SetIterator(_) if unpatched && !data.has_own(&next_key) && inherits(&intrinsics.set_iterator_prototype) => {
                IterableShape::FastIterator(obj.clone())
            }
            _ => IterableShape::Generic,
        }
    }

    fn fast_array_element(&self, array: &JSObjectDataPtr, index: usize) -> Option<Value> {
        js_array::array_element(array, index)
    }

    fn fast_set_element(&self, set: &JSObjectDataPtr, cursor: &mut usize) -> Option<Value> {
        js_set::set_entry_from(set, cursor)
    }

    fn fast_iterator_step(&self, iterator: &JSObjectDataPtr) -> Option<Value> {
        let is_array_iterator = matches!(iterator.borrow().kind, ObjectKind::ArrayIterator(_));
        if is_array_iterator {
            js_array::array_iterator_step(iterator)
        } else {
            js_set::set_iterator_step(iterator)
        }
    }

    fn fast_close_target(&self, source: &JSObjectDataPtr) -> Value {
        let kind = match &source.borrow().kind {
            ObjectKind::Array(_) => Some(true),
            ObjectKind::Set(_) => Some(false),
            _ => None,
        };
        match kind {
            Some(true) => js_array::create_array_iterator(self, source),
            Some(false) => js_set::create_set_iterator(self, source),
            None => Value::Object(source.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_name(shape: IterableShape) -> &'static str {
        match shape {
            IterableShape::FastArray(_) => "array",
            IterableShape::FastSet(_) => "set",
            IterableShape::FastIterator(_) => "iterator",
            IterableShape::Generic => "generic",
        }
    }

    #[test]
    fn classification_follows_shape_and_protector() {
        let realm = Realm::new();
        let arr = realm.create_array(vec![1.into()]);
        let set = realm.create_set(vec![1.into()]);
        let values = realm.invoke(&arr, "values", &[]).unwrap();
        assert_eq!(shape_name(realm.classify_iterable(&arr)), "array");
        assert_eq!(shape_name(realm.classify_iterable(&set)), "set");
        assert_eq!(shape_name(realm.classify_iterable(&values)), "iterator");
        assert_eq!(shape_name(realm.classify_iterable(&realm.new_object())), "generic");
        assert_eq!(shape_name(realm.classify_iterable(&Value::from(3))), "generic");

        // an own override on one instance only demotes that instance
        let patched = realm.create_array(vec![]);
        let f = realm.new_function("iter", 0, |_, _, _| Ok(Value::Undefined));
        realm.set(&patched, realm.symbol_iterator(), f).unwrap();
        assert_eq!(shape_name(realm.classify_iterable(&patched)), "generic");
        assert!(realm.iteration_protector_intact());

        realm.iteration_protector().invalidate();
        assert_eq!(shape_name(realm.classify_iterable(&arr)), "generic");
        assert_eq!(shape_name(realm.classify_iterable(&set)), "generic");
    }
}
