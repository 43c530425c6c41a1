//! Reference binders.
//!
//! - `BinaryOperationBinder` / `UnaryOperationBinder`: operators guarded on
//!   operand types
//! - `GetMemberBinder` / `SetMemberBinder` / `DeleteMemberBinder`: expando
//!   attribute access guarded on type and expando class

mod member;
mod operators;

pub use member::{DeleteMemberBinder, GetMemberBinder, SetMemberBinder};
pub use operators::{BinaryOperationBinder, UnaryOperationBinder};
