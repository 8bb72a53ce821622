use thiserror::Error;

use crate::{Label, ObjectRef};

/// Host-side faults. These abort the current operation and are never
/// visible to guest exception handlers.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("operand stack overflow (capacity {0})")]
    StackOverflow(usize),
    #[error("expected {expected} slot, found {found}")]
    SlotMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("local variable {0} out of range")]
    LocalOutOfRange(usize),
    #[error("malformed descriptor `{0}`")]
    MalformedDescriptor(String),
    #[error("undefined label {0:?}")]
    UndefinedLabel(Label),
    #[error("class `{0}` is already defined")]
    DuplicateClass(String),
    #[error("class `{0}` is not linked")]
    NotLinked(String),
    #[error("address space exhausted allocating {0} bytes")]
    OutOfMemory(usize),
    #[error("dangling reference {0:#x}")]
    DanglingReference(u64),
    #[error("method `{0}` has no code")]
    NoCode(String),
    #[error("compiled unit belongs to `{unit}`, not `{method}`")]
    UnitMismatch { unit: String, method: String },
    #[error("bootstrap type `{0}` is missing")]
    MissingBootstrapType(&'static str),
    #[error("execution fell off the end of `{0}`")]
    FellOffCode(String),
    #[error("bootstrap method for `{0}` did not return a method handle")]
    BadCallSite(String),
    #[error("constant table has no entry {0}")]
    MissingConstant(usize),
    #[error("`{field}` is not a field of `{class}`")]
    WrongHolder { field: String, class: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Reasons the translator refuses a method. Nothing is installed when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("`{method}` declares exception handlers")]
    ExceptionHandlers { method: String },
    #[error("`{method}` contains invokedynamic at instruction {index}")]
    DynamicCallSite { method: String, index: usize },
    #[error("`{method}` has no bytecode body")]
    NotBytecode { method: String },
    #[error("`{method}` jumps to undefined label {label}")]
    UndefinedLabel { method: String, label: u32 },
}

/// Outcome of executing guest code: a thrown guest object or a host fault.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    #[error("uncaught {}", .0.class().name())]
    Thrown(ObjectRef),
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl VmError {
    pub fn thrown(&self) -> Option<&ObjectRef> {
        match self {
            Self::Thrown(object) => Some(object),
            Self::Fault(_) => None,
        }
    }
}

impl From<CompileError> for VmError {
    fn from(error: CompileError) -> Self {
        Self::Fault(error.into())
    }
}

pub type VmResult<T> = Result<T, VmError>;
