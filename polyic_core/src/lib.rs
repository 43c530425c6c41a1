//! Runtime value model for the polyic dispatch system.
//!
//! This crate provides:
//! - `Value`, the dynamically typed argument/result representation
//! - `TypeId` and the type registry for user-defined types
//! - Heap objects (`Instance`), weak handles and opaque native handles
//! - Expando records: versioned, class-shared attribute storage

pub mod expando;
pub mod object;
pub mod registry;
pub mod type_id;
pub mod value;

pub use expando::{Expando, ExpandoClass};
pub use object::{Instance, NativeRef, ObjectRef, WeakRef};
pub use registry::{TypeRegistry, global_registry};
pub use type_id::TypeId;
pub use value::{ConstantKey, Value};
