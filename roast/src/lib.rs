mod bootstrap;
mod class;
mod definition;
mod descriptor;
mod error;
mod frame;
mod insn;
mod interpreter;
pub mod jit;
mod loader;
mod memory;
mod monitor;
pub mod ops;
mod resolve;
#[cfg(test)]
mod testing;
mod value;
mod vm;
pub mod workload;

pub use class::*;
pub use definition::*;
pub use descriptor::{FieldType, MethodDescriptor};
pub use error::{CompileError, Fault, VmError, VmResult};
pub use frame::Frame;
pub use insn::*;
pub use jit::{
    Artifact, ClassSlot, ClosureDefiner, CompiledUnit, ConstantTable, Definer, LoweredOp, compile,
    install,
};
pub use loader::{ClassLoader, LoaderId};
pub use memory::*;
pub use monitor::{Monitor, MonitorTable, Synchronizer};
pub use ops::{
    AllocationOps, ArithmeticOps, ArrayOps, ConstantOps, DynamicOps, DynamicSite, ExceptionOps,
    FieldOps, Flow, InvocationOps, JumpTest, MonitorOps, NanResult, OpcodeFn, TypeOps, jump_test,
    opcode_semantics,
};
pub use resolve::{HierarchyResolver, LinkResolver};
pub use value::*;
pub use vm::*;
