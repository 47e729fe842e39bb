//! Object model shared by the iteration machinery: values, objects,
//! property keys, errors, the protector and the realm that owns the
//! intrinsics.

mod js_error;
mod property_key;
mod protector;
mod realm;
mod value;

pub use js_error::EvalError;
pub use property_key::{PropertyKey, SymbolData};
pub use protector::Protector;
pub use realm::{Intrinsics, Realm, RealmOptions};
pub use value::{
    BuiltinIteratorState, JSObjectData, JSObjectDataPtr, JSSet, NativeFunction, ObjectKind, Value, new_js_object_data,
    same_value_zero, to_boolean, to_number, value_to_string,
};
