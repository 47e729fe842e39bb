//! The iteration protocol: obtaining iterator records, stepping them and
//! closing them with the right exception priority.

use crate::core::{EvalError, PropertyKey, Realm, Value, to_boolean};
use crate::host::HostPrimitives;
use crate::raise_type_error;

/// An iterator plus the `next` method cached when it was obtained.
#[derive(Clone, Debug)]
pub struct IteratorRecord {
    pub iterator: Value,
    pub next_method: Value,
    /// Set once the iterator reported exhaustion or a step failed; a done
    /// record is never closed.
    pub done: bool,
}

/// Why an iterator is being closed.
#[derive(Debug)]
pub enum CompletionSignal {
    /// The consumer finished without an abrupt completion.
    Normal,
    /// The consumer failed; this error wins over anything `return()` does.
    Throw(EvalError),
    /// The consumer stopped early without an error (short-circuit, limit
    /// reached, helper `return()`).
    Break,
}

impl CompletionSignal {
    fn into_result(self) -> Result<(), EvalError> {
        match self {
            CompletionSignal::Normal | CompletionSignal::Break => Ok(()),
            CompletionSignal::Throw(e) => Err(e),
        }
    }
}

/// `%IteratorPrototype%[Symbol.iterator]` returns its receiver.
pub fn initialize_iterator_prototype(realm: &Realm) {
    let proto = &realm.intrinsics().iterator_prototype;
    realm.define_builtin_function(
        proto,
        PropertyKey::from(realm.symbol_iterator()),
        "[Symbol.iterator]",
        0,
        |_realm, this, _args| Ok(this.clone()),
    );
}

/// GetIterator(value, sync): calls `value[Symbol.iterator]()`.
pub fn get_iterator<H: HostPrimitives + ?Sized>(host: &H, value: &Value) -> Result<IteratorRecord, EvalError> {
    if value.is_null_or_undefined() {
        return Err(raise_type_error!("{} is not iterable", value).into());
    }
    let method = host.get(value, &host.iterator_key())?;
    if !host.is_callable(&method) {
        return Err(raise_type_error!("{} is not iterable", value).into());
    }
    let iterator = host.call(&method, value, &[])?;
    if !iterator.is_object() {
        return Err(raise_type_error!("Result of the Symbol.iterator method is not an object").into());
    }
    let next_method = host.get(&iterator, &PropertyKey::from("next"))?;
    Ok(IteratorRecord {
        iterator,
        next_method,
        done: false,
    })
}

/// GetIteratorDirect(obj): the receiver is the iterator itself.
pub fn get_iterator_direct<H: HostPrimitives + ?Sized>(host: &H, value: &Value) -> Result<IteratorRecord, EvalError> {
    if !value.is_object() {
        return Err(raise_type_error!("Method called on incompatible receiver {}", value).into());
    }
    let next_method = host.get(value, &PropertyKey::from("next"))?;
    Ok(IteratorRecord {
        iterator: value.clone(),
        next_method,
        done: false,
    })
}

/// IteratorStepValue: `Ok(None)` when the iterator is exhausted. Any failure
/// here (throwing `next`, non-object result, throwing `done` or `value`
/// getter) marks the record done and is not wrapped in a close.
pub fn iterator_step_value<H: HostPrimitives + ?Sized>(host: &H, record: &mut IteratorRecord) -> Result<Option<Value>, EvalError> {
    let step = (|| -> Result<Option<Value>, EvalError> {
        let result = host.call(&record.next_method, &record.iterator, &[])?;
        if !result.is_object() {
            return Err(raise_type_error!("Iterator result {} is not an object", result).into());
        }
        if to_boolean(&host.get(&result, &PropertyKey::from("done"))?) {
            return Ok(None);
        }
        host.get(&result, &PropertyKey::from("value")).map(Some)
    })();
    if !matches!(step, Ok(Some(_))) {
        record.done = true;
    }
    step
}

/// IteratorClose. With a `Throw` completion the original error is returned
/// no matter how `return()` behaves; otherwise a failing `return()` or a
/// non-object result surfaces.
pub fn iterator_close<H: HostPrimitives + ?Sized>(
    host: &H,
    record: &IteratorRecord,
    completion: CompletionSignal,
) -> Result<(), EvalError> {
    let iterator = &record.iterator;
    let inner = match host.get(iterator, &PropertyKey::from("return")) {
        Ok(method) if method.is_null_or_undefined() => {
            log::trace!("iterator has no return method; nothing to close");
            return completion.into_result();
        }
        Ok(method) => {
            log::debug!("closing iterator ({:?})", completion);
            host.call(&method, iterator, &[])
        }
        Err(e) => Err(e),
    };

    if let CompletionSignal::Throw(original) = completion {
        if let Err(suppressed) = &inner {
            log::debug!("discarding error from return() in favour of pending error: {}", suppressed);
        }
        return Err(original);
    }
    let inner = inner?;
    if !inner.is_object() {
        return Err(raise_type_error!("Iterator result {} is not an object", inner).into());
    }
    Ok(())
}

/// IfAbruptCloseIterator: on error, close `record` and re-raise the error.
pub fn if_abrupt_close_iterator<H: HostPrimitives + ?Sized, T>(
    host: &H,
    record: &IteratorRecord,
    result: Result<T, EvalError>,
) -> Result<T, EvalError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(match iterator_close(host, record, CompletionSignal::Throw(e)) {
            Err(original) => original,
            Ok(()) => raise_type_error!("iterator close swallowed a pending error").into(),
        }),
    }
}
