//! Operation semantics, one narrow trait per concern, all implemented on
//! [`VM`](crate::VM).

mod allocation;
pub mod arith;
mod array;
mod constant;
mod dynamic;
mod exception;
mod field;
pub(crate) mod invocation;
mod monitor;
pub mod semantics;
mod types;

pub use allocation::AllocationOps;
pub use arith::{ArithmeticOps, NanResult};
pub use array::ArrayOps;
pub use constant::ConstantOps;
pub use dynamic::{DynamicOps, DynamicSite};
pub use exception::ExceptionOps;
pub use field::FieldOps;
pub use invocation::InvocationOps;
pub use monitor::MonitorOps;
pub use semantics::{Flow, JumpTest, OpcodeFn, jump_test, opcode_semantics};
pub use types::TypeOps;
