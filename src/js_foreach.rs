//! IterableForEach: drive any iterable to completion, closing the iterator
//! when the callback completes abruptly.

use crate::core::{EvalError, JSObjectDataPtr, Realm, Value};
use crate::host::{HostPrimitives, IterableShape};
use crate::js_iterator::{CompletionSignal, IteratorRecord, get_iterator, iterator_close, iterator_step_value};
use crate::raise_type_error;

/// Calls `callback(value)` for every element `iterable` produces, in order.
///
/// Builtin arrays, Sets and their iterators are walked directly while the
/// iteration protector holds; holes read as `undefined`. Everything else
/// goes through `[Symbol.iterator]`. Failures of `next()`, of the result
/// shape or of the `value` getter propagate without a close; a failing
/// callback (including a stack-limit `RangeError`) closes the iterator
/// first and always wins over an error from `return()`.
pub fn iterable_for_each<H: HostPrimitives + ?Sized>(host: &H, iterable: &Value, callback: &Value) -> Result<(), EvalError> {
    if !host.is_callable(callback) {
        return Err(raise_type_error!("{} is not a function", callback).into());
    }
    let invoke = |value: Value| host.call(callback, &Value::Undefined, &[value]);

    match host.classify_iterable(iterable) {
        IterableShape::FastArray(array) => {
            log::trace!("forEach: fast array path");
            let mut index = 0;
            while let Some(value) = host.fast_array_element(&array, index) {
                index += 1;
                if let Err(e) = invoke(value) {
                    return close_fast_loop(host, &array, e);
                }
            }
            Ok(())
        }
        IterableShape::FastSet(set) => {
            log::trace!("forEach: fast set path");
            let mut cursor = 0;
            while let Some(value) = host.fast_set_element(&set, &mut cursor) {
                if let Err(e) = invoke(value) {
                    return close_fast_loop(host, &set, e);
                }
            }
            Ok(())
        }
        IterableShape::FastIterator(iterator) => {
            log::trace!("forEach: fast builtin iterator path");
            while let Some(value) = host.fast_iterator_step(&iterator) {
                if let Err(e) = invoke(value) {
                    return close_fast_loop(host, &iterator, e);
                }
            }
            Ok(())
        }
        IterableShape::Generic => {
            let mut record = get_iterator(host, iterable)?;
            while let Some(value) = iterator_step_value(host, &mut record)? {
                log::trace!("forEach: generic step");
                if let Err(e) = invoke(value) {
                    return iterator_close(host, &record, CompletionSignal::Throw(e));
                }
            }
            Ok(())
        }
    }
}

/// A fast loop whose callback failed is closed exactly like the iterator the
/// generic path would have obtained, so a `return` installed on a builtin
/// iterator prototype or instance still runs.
fn close_fast_loop<H: HostPrimitives + ?Sized>(host: &H, source: &JSObjectDataPtr, error: EvalError) -> Result<(), EvalError> {
    let record = IteratorRecord {
        iterator: host.fast_close_target(source),
        next_method: Value::Undefined,
        done: false,
    };
    iterator_close(host, &record, CompletionSignal::Throw(error))
}

impl Realm {
    /// [`iterable_for_each`] against this realm.
    pub fn for_each(&self, iterable: &Value, callback: &Value) -> Result<(), EvalError> {
        iterable_for_each(self, iterable, callback)
    }
}
