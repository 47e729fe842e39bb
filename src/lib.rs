//! Iteration protocol core for a JavaScript engine.
//!
//! [`iterable_for_each`] drives any iterable with guaranteed iterator close,
//! and `%IteratorPrototype%` carries the lazy Iterator Helpers (`map`,
//! `filter`, `take`, `drop`) plus the eager consumers built on the same
//! close discipline. The engine-facing surface is [`HostPrimitives`];
//! [`Realm`] is the bundled host.

pub(crate) mod core;
pub(crate) mod error;
pub mod host;
pub mod js_array;
pub mod js_foreach;
pub mod js_iterator;
pub mod js_iterator_helpers;
pub mod js_set;

pub use crate::core::{
    EvalError, Intrinsics, JSObjectData, JSObjectDataPtr, ObjectKind, PropertyKey, Protector, Realm, RealmOptions, SymbolData, Value,
    same_value_zero, to_boolean, to_number, value_to_string,
};
pub use error::JSError;
pub use host::{HostPrimitives, IterableShape};
pub use js_foreach::iterable_for_each;
pub use js_iterator::{CompletionSignal, IteratorRecord, get_iterator, get_iterator_direct, iterator_close, iterator_step_value};
pub use js_iterator_helpers::{HelperKind, HelperState, HelperStatus, ITERATOR_HELPER_TAG};
