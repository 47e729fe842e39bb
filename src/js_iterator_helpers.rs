// js_iterator_helpers.rs: Iterator Helpers
//
// Implements:
//   • `%IteratorPrototype%` lazy methods: map, filter, take, drop
//   • `%IteratorPrototype%` eager methods: forEach, reduce, toArray, some,
//     every, find
//   • `%IteratorHelperPrototype%` with next / return / @@toStringTag

use crate::core::{EvalError, JSObjectDataPtr, ObjectKind, PropertyKey, Realm, Value, to_boolean, to_number};
use crate::host::HostPrimitives;
use crate::js_iterator::{
    CompletionSignal, IteratorRecord, get_iterator_direct, if_abrupt_close_iterator, iterator_close, iterator_step_value,
};
use crate::{raise_range_error, raise_type_error};

pub const ITERATOR_HELPER_TAG: &str = "Iterator Helper";

/// Per-kind state of a lazy helper.
#[derive(Clone, Debug)]
pub enum HelperKind {
    Map { mapper: Value },
    Filter { predicate: Value },
    Take { remaining: f64 },
    Drop { remaining: f64 },
}

impl HelperKind {
    pub fn name(&self) -> &'static str {
        match self {
            HelperKind::Map { .. } => "map",
            HelperKind::Filter { .. } => "filter",
            HelperKind::Take { .. } => "take",
            HelperKind::Drop { .. } => "drop",
        }
    }
}

/// Generator-like lifecycle of a helper object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelperStatus {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

#[derive(Clone, Debug)]
pub struct HelperState {
    pub kind: HelperKind,
    pub underlying: IteratorRecord,
    /// Zero-based count of elements handed to the callback.
    pub counter: f64,
    pub status: HelperStatus,
}

impl HelperState {
    pub fn new(kind: HelperKind, underlying: IteratorRecord) -> Self {
        HelperState {
            kind,
            underlying,
            counter: 0.0,
            status: HelperStatus::SuspendedStart,
        }
    }
}

// ===========================================================================
// Public initialisation
// ===========================================================================

/// Register the helper methods on `%IteratorPrototype%` and populate
/// `%IteratorHelperPrototype%`.
pub fn initialize_iterator_helpers(realm: &Realm) {
    let iter_proto = &realm.intrinsics().iterator_prototype;

    realm.define_builtin_function(iter_proto, "map".into(), "map", 1, |realm, this, args| {
        handle_map(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "filter".into(), "filter", 1, |realm, this, args| {
        handle_filter(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "take".into(), "take", 1, |realm, this, args| {
        handle_take(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "drop".into(), "drop", 1, |realm, this, args| {
        handle_drop(realm, this, arg(args, 0))
    });

    realm.define_builtin_function(iter_proto, "forEach".into(), "forEach", 1, |realm, this, args| {
        handle_for_each(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "reduce".into(), "reduce", 1, |realm, this, args| {
        handle_reduce(realm, this, arg(args, 0), args.get(1).cloned())
    });
    realm.define_builtin_function(iter_proto, "toArray".into(), "toArray", 0, |realm, this, _args| {
        handle_to_array(realm, this)
    });
    realm.define_builtin_function(iter_proto, "some".into(), "some", 1, |realm, this, args| {
        handle_some(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "every".into(), "every", 1, |realm, this, args| {
        handle_every(realm, this, arg(args, 0))
    });
    realm.define_builtin_function(iter_proto, "find".into(), "find", 1, |realm, this, args| {
        handle_find(realm, this, arg(args, 0))
    });

    let helper_proto = &realm.intrinsics().iterator_helper_prototype;
    realm.define_builtin_function(helper_proto, "next".into(), "next", 0, |realm, this, _args| {
        handle_helper_next(realm, this)
    });
    realm.define_builtin_function(helper_proto, "return".into(), "return", 0, |realm, this, _args| {
        handle_helper_return(realm, this)
    });
    realm.define_builtin_value(
        helper_proto,
        PropertyKey::from(realm.symbol_to_string_tag()),
        Value::from(ITERATOR_HELPER_TAG),
    );
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

// ===========================================================================
// Lazy methods
// ===========================================================================

pub fn handle_map<H: HostPrimitives + ?Sized>(host: &H, this: &Value, mapper: Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    if !host.is_callable(&mapper) {
        return Err(close_receiver(host, this, raise_type_error!("{} is not a function", mapper).into()));
    }
    create_iterator_helper(host, this, HelperKind::Map { mapper })
}

pub fn handle_filter<H: HostPrimitives + ?Sized>(host: &H, this: &Value, predicate: Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    if !host.is_callable(&predicate) {
        return Err(close_receiver(host, this, raise_type_error!("{} is not a function", predicate).into()));
    }
    create_iterator_helper(host, this, HelperKind::Filter { predicate })
}

/// Validates the limit at call time: NaN and negative limits close the
/// receiver and raise `RangeError`. `Infinity` is allowed.
pub fn handle_take<H: HostPrimitives + ?Sized>(host: &H, this: &Value, limit: Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    let remaining = to_integer_limit(host, this, &limit)?;
    create_iterator_helper(host, this, HelperKind::Take { remaining })
}

pub fn handle_drop<H: HostPrimitives + ?Sized>(host: &H, this: &Value, limit: Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    let remaining = to_integer_limit(host, this, &limit)?;
    create_iterator_helper(host, this, HelperKind::Drop { remaining })
}

fn to_integer_limit<H: HostPrimitives + ?Sized>(host: &H, this: &Value, limit: &Value) -> Result<f64, EvalError> {
    let num_limit = match to_number(limit) {
        Ok(n) => n,
        Err(e) => return Err(close_receiver(host, this, e)),
    };
    if num_limit.is_nan() {
        return Err(close_receiver(host, this, raise_range_error!("{} must be positive", limit).into()));
    }
    let integer_limit = if num_limit.is_infinite() { num_limit } else { num_limit.trunc() };
    if integer_limit < 0.0 {
        return Err(close_receiver(host, this, raise_range_error!("{} must be positive", limit).into()));
    }
    // -0 truncates to -0, which is a valid zero limit
    Ok(integer_limit + 0.0)
}

fn create_iterator_helper<H: HostPrimitives + ?Sized>(host: &H, this: &Value, kind: HelperKind) -> Result<Value, EvalError> {
    let underlying = get_iterator_direct(host, this)?;
    log::trace!("created iterator helper '{}'", kind.name());
    Ok(host.create_iterator_helper(HelperState::new(kind, underlying)))
}

// ===========================================================================
// %IteratorHelperPrototype%.next
// ===========================================================================

pub fn handle_helper_next<H: HostPrimitives + ?Sized>(host: &H, this: &Value) -> Result<Value, EvalError> {
    let helper = require_helper_this(this)?;

    let (mut kind, mut underlying, mut counter) = {
        let mut data = helper.borrow_mut();
        let ObjectKind::IteratorHelper(state) = &mut data.kind else {
            return Err(incompatible_receiver(this));
        };
        match state.status {
            HelperStatus::Executing => return Err(raise_type_error!("Generator is already running").into()),
            HelperStatus::Completed => return Ok(host.create_iter_result(Value::Undefined, true)),
            HelperStatus::SuspendedStart | HelperStatus::SuspendedYield => {}
        }
        state.status = HelperStatus::Executing;
        (state.kind.clone(), state.underlying.clone(), state.counter)
    };

    let outcome = match &mut kind {
        HelperKind::Map { mapper } => helper_next_map(host, mapper, &mut underlying, &mut counter),
        HelperKind::Filter { predicate } => helper_next_filter(host, predicate, &mut underlying, &mut counter),
        HelperKind::Take { remaining } => helper_next_take(host, remaining, &mut underlying),
        HelperKind::Drop { remaining } => helper_next_drop(host, remaining, &mut underlying),
    };

    {
        let mut data = helper.borrow_mut();
        if let ObjectKind::IteratorHelper(state) = &mut data.kind {
            state.kind = kind;
            state.underlying = underlying;
            state.counter = counter;
            // an exhausted or failed helper never resumes
            state.status = match &outcome {
                Ok(Some(_)) => HelperStatus::SuspendedYield,
                _ => HelperStatus::Completed,
            };
        }
    }

    match outcome? {
        Some(value) => Ok(host.create_iter_result(value, false)),
        None => Ok(host.create_iter_result(Value::Undefined, true)),
    }
}

fn helper_next_map<H: HostPrimitives + ?Sized>(
    host: &H,
    mapper: &Value,
    underlying: &mut IteratorRecord,
    counter: &mut f64,
) -> Result<Option<Value>, EvalError> {
    let Some(value) = iterator_step_value(host, underlying)? else {
        return Ok(None);
    };
    let mapped = if_abrupt_close_iterator(
        host,
        underlying,
        host.call(mapper, &Value::Undefined, &[value, Value::Number(*counter)]),
    )?;
    *counter += 1.0;
    Ok(Some(mapped))
}

fn helper_next_filter<H: HostPrimitives + ?Sized>(
    host: &H,
    predicate: &Value,
    underlying: &mut IteratorRecord,
    counter: &mut f64,
) -> Result<Option<Value>, EvalError> {
    loop {
        let Some(value) = iterator_step_value(host, underlying)? else {
            return Ok(None);
        };
        let selected = if_abrupt_close_iterator(
            host,
            underlying,
            host.call(predicate, &Value::Undefined, &[value.clone(), Value::Number(*counter)]),
        )?;
        *counter += 1.0;
        if to_boolean(&selected) {
            return Ok(Some(value));
        }
    }
}

fn helper_next_take<H: HostPrimitives + ?Sized>(
    host: &H,
    remaining: &mut f64,
    underlying: &mut IteratorRecord,
) -> Result<Option<Value>, EvalError> {
    if *remaining <= 0.0 {
        // limit reached: close the underlying iterator without consulting it
        iterator_close(host, underlying, CompletionSignal::Break)?;
        return Ok(None);
    }
    if remaining.is_finite() {
        *remaining -= 1.0;
    }
    iterator_step_value(host, underlying)
}

fn helper_next_drop<H: HostPrimitives + ?Sized>(
    host: &H,
    remaining: &mut f64,
    underlying: &mut IteratorRecord,
) -> Result<Option<Value>, EvalError> {
    while *remaining > 0.0 {
        if remaining.is_finite() {
            *remaining -= 1.0;
        }
        if iterator_step_value(host, underlying)?.is_none() {
            return Ok(None);
        }
    }
    iterator_step_value(host, underlying)
}

// ===========================================================================
// %IteratorHelperPrototype%.return
// ===========================================================================

pub fn handle_helper_return<H: HostPrimitives + ?Sized>(host: &H, this: &Value) -> Result<Value, EvalError> {
    let helper = require_helper_this(this)?;

    let (underlying, signal) = {
        let mut data = helper.borrow_mut();
        let ObjectKind::IteratorHelper(state) = &mut data.kind else {
            return Err(incompatible_receiver(this));
        };
        match state.status {
            HelperStatus::Executing => return Err(raise_type_error!("Generator is already running").into()),
            HelperStatus::Completed => return Ok(host.create_iter_result(Value::Undefined, true)),
            // never started: complete first so re-entrant calls see a finished helper
            HelperStatus::SuspendedStart => {
                state.status = HelperStatus::Completed;
                (state.underlying.clone(), CompletionSignal::Normal)
            }
            HelperStatus::SuspendedYield => {
                state.status = HelperStatus::Executing;
                (state.underlying.clone(), CompletionSignal::Break)
            }
        }
    };

    let closed = iterator_close(host, &underlying, signal);
    if let ObjectKind::IteratorHelper(state) = &mut helper.borrow_mut().kind {
        state.status = HelperStatus::Completed;
    }
    closed?;
    Ok(host.create_iter_result(Value::Undefined, true))
}

// ===========================================================================
// Eager methods: forEach, reduce, toArray, some, every, find
// ===========================================================================

pub fn handle_for_each<H: HostPrimitives + ?Sized>(host: &H, this: &Value, callback: Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    if !host.is_callable(&callback) {
        return Err(close_receiver(host, this, raise_type_error!("{} is not a function", callback).into()));
    }
    let mut record = get_iterator_direct(host, this)?;
    let mut counter = 0.0;
    while let Some(value) = iterator_step_value(host, &mut record)? {
        if_abrupt_close_iterator(
            host,
            &record,
            host.call(&callback, &Value::Undefined, &[value, Value::Number(counter)]),
        )?;
        counter += 1.0;
    }
    Ok(Value::Undefined)
}

pub fn handle_reduce<H: HostPrimitives + ?Sized>(
    host: &H,
    this: &Value,
    reducer: Value,
    initial: Option<Value>,
) -> Result<Value, EvalError> {
    require_object_this(this)?;
    if !host.is_callable(&reducer) {
        return Err(close_receiver(host, this, raise_type_error!("{} is not a function", reducer).into()));
    }
    let mut record = get_iterator_direct(host, this)?;

    let (mut accumulator, mut counter) = match initial {
        Some(v) => (v, 0.0),
        None => match iterator_step_value(host, &mut record)? {
            Some(first) => (first, 1.0),
            None => return Err(raise_type_error!("Reduce of empty iterator with no initial value").into()),
        },
    };
    while let Some(value) = iterator_step_value(host, &mut record)? {
        accumulator = if_abrupt_close_iterator(
            host,
            &record,
            host.call(&reducer, &Value::Undefined, &[accumulator, value, Value::Number(counter)]),
        )?;
        counter += 1.0;
    }
    Ok(accumulator)
}

pub fn handle_to_array<H: HostPrimitives + ?Sized>(host: &H, this: &Value) -> Result<Value, EvalError> {
    require_object_this(this)?;
    let mut record = get_iterator_direct(host, this)?;
    let mut items = Vec::new();
    while let Some(value) = iterator_step_value(host, &mut record)? {
        items.push(value);
    }
    Ok(host.create_array(items))
}

/// Shared driver for some / every / find: runs `predicate` until `stop`
/// says so, then closes the iterator with a non-throw completion.
fn short_circuit<H: HostPrimitives + ?Sized>(
    host: &H,
    this: &Value,
    predicate: &Value,
    stop: impl Fn(bool) -> bool,
) -> Result<Option<Value>, EvalError> {
    require_object_this(this)?;
    if !host.is_callable(predicate) {
        return Err(close_receiver(host, this, raise_type_error!("{} is not a function", predicate).into()));
    }
    let mut record = get_iterator_direct(host, this)?;
    let mut counter = 0.0;
    while let Some(value) = iterator_step_value(host, &mut record)? {
        let result = if_abrupt_close_iterator(
            host,
            &record,
            host.call(predicate, &Value::Undefined, &[value.clone(), Value::Number(counter)]),
        )?;
        if stop(to_boolean(&result)) {
            iterator_close(host, &record, CompletionSignal::Break)?;
            return Ok(Some(value));
        }
        counter += 1.0;
    }
    Ok(None)
}

pub fn handle_some<H: HostPrimitives + ?Sized>(host: &H, this: &Value, predicate: Value) -> Result<Value, EvalError> {
    let hit = short_circuit(host, this, &predicate, |selected| selected)?;
    Ok(Value::Boolean(hit.is_some()))
}

pub fn handle_every<H: HostPrimitives + ?Sized>(host: &H, this: &Value, predicate: Value) -> Result<Value, EvalError> {
    let miss = short_circuit(host, this, &predicate, |selected| !selected)?;
    Ok(Value::Boolean(miss.is_none()))
}

pub fn handle_find<H: HostPrimitives + ?Sized>(host: &H, this: &Value, predicate: Value) -> Result<Value, EvalError> {
    let found = short_circuit(host, this, &predicate, |selected| selected)?;
    Ok(found.unwrap_or(Value::Undefined))
}

// ===========================================================================
// Helpers
// ===========================================================================

fn incompatible_receiver(this: &Value) -> EvalError {
    raise_type_error!("Method called on incompatible receiver {}", this).into()
}

fn require_object_this(this: &Value) -> Result<(), EvalError> {
    if this.is_object() { Ok(()) } else { Err(incompatible_receiver(this)) }
}

fn require_helper_this(this: &Value) -> Result<JSObjectDataPtr, EvalError> {
    match this {
        Value::Object(o) if matches!(o.borrow().kind, ObjectKind::IteratorHelper(_)) => Ok(o.clone()),
        _ => Err(incompatible_receiver(this)),
    }
}

/// Closes the receiver before its `next` was read, returning the error that
/// should propagate.
fn close_receiver<H: HostPrimitives + ?Sized>(host: &H, this: &Value, error: EvalError) -> EvalError {
    let record = IteratorRecord {
        iterator: this.clone(),
        next_method: Value::Undefined,
        done: false,
    };
    match iterator_close(host, &record, CompletionSignal::Throw(error)) {
        Err(e) => e,
        Ok(()) => raise_type_error!("iterator close swallowed a pending error").into(),
    }
}
