//! Built-in demo classes, used by the `roast` binary and the benches.

use std::sync::Arc;

use crate::{
    AccessFlags, ClassDefinition, Code, FieldDefinition, FieldOp, FieldType, Insn, InvocationOps,
    InvokeKind, JavaMethod, JumpKind, Label, LocalKind, MethodDefinition, Opcode, VM, Value,
    VmResult,
};
use Insn::{IntConst, Label as Mark, Load, Store};
use LocalKind::{Int, Long, Reference};

pub const WORKLOAD: &str = "demo/Workload";
pub const COUNTER: &str = "demo/Counter";

/// Classes [`define`] adds, in definition order.
pub const CLASSES: [&str; 2] = [COUNTER, WORKLOAD];

/// A static method of the workload with the argument it is run with.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: &'static str,
    pub method: Arc<JavaMethod>,
    pub argument: i32,
}

impl Task {
    pub fn run(&self, vm: &VM) -> VmResult<Option<Value>> {
        vm.invoke(&self.method, vec![Value::Int(self.argument)])
    }
}

fn jump(kind: JumpKind, label: u32) -> Insn {
    Insn::Jump(kind, Label(label))
}

/// `long sumSquares(int n)`: sum of `i * i` for `i` below `n`
fn sum_squares() -> Code {
    Code::new(
        4,
        4,
        vec![
            Insn::LongConst(0),
            Store(Long, 1),
            IntConst(0),
            Store(Int, 3),
            Mark(Label(0)),
            Load(Int, 3),
            Load(Int, 0),
            jump(JumpKind::IfICmpGe, 1),
            Load(Long, 1),
            Load(Int, 3),
            Load(Int, 3),
            Opcode::IMul.into(),
            Opcode::I2L.into(),
            Opcode::LAdd.into(),
            Store(Long, 1),
            Insn::Iinc(3, 1),
            jump(JumpKind::Goto, 0),
            Mark(Label(1)),
            Load(Long, 1),
            Opcode::LReturn.into(),
        ],
    )
}

/// `int fib(int n)`, recursive
fn fib() -> Code {
    let recurse = Insn::invoke(InvokeKind::Static, WORKLOAD, "fib", "(I)I");
    Code::new(
        3,
        1,
        vec![
            Load(Int, 0),
            IntConst(2),
            jump(JumpKind::IfICmpGe, 0),
            Load(Int, 0),
            Opcode::IReturn.into(),
            Mark(Label(0)),
            Load(Int, 0),
            IntConst(1),
            Opcode::ISub.into(),
            recurse.clone(),
            Load(Int, 0),
            IntConst(2),
            Opcode::ISub.into(),
            recurse,
            Opcode::IAdd.into(),
            Opcode::IReturn.into(),
        ],
    )
}

/// `int fill(int n)`: fills an `int[n]` with `3 * i`, then sums it
fn fill() -> Code {
    Code::new(
        4,
        4,
        vec![
            Load(Int, 0),
            Insn::NewArray(FieldType::Int),
            Store(Reference, 1),
            IntConst(0),
            Store(Int, 2),
            Mark(Label(0)),
            Load(Int, 2),
            Load(Int, 0),
            jump(JumpKind::IfICmpGe, 1),
            Load(Reference, 1),
            Load(Int, 2),
            Load(Int, 2),
            IntConst(3),
            Opcode::IMul.into(),
            Opcode::IAStore.into(),
            Insn::Iinc(2, 1),
            jump(JumpKind::Goto, 0),
            Mark(Label(1)),
            IntConst(0),
            Store(Int, 3),
            IntConst(0),
            Store(Int, 2),
            Mark(Label(2)),
            Load(Int, 2),
            Load(Reference, 1),
            Opcode::ArrayLength.into(),
            jump(JumpKind::IfICmpGe, 3),
            Load(Int, 3),
            Load(Reference, 1),
            Load(Int, 2),
            Opcode::IALoad.into(),
            Opcode::IAdd.into(),
            Store(Int, 3),
            Insn::Iinc(2, 1),
            jump(JumpKind::Goto, 2),
            Mark(Label(3)),
            Load(Int, 3),
            Opcode::IReturn.into(),
        ],
    )
}

/// `int count(int n)`: bumps a fresh counter's field once per `i` below
/// `n`, adding `i`
fn count() -> Code {
    let field = |op| Insn::field(op, COUNTER, "count", "I");
    Code::new(
        3,
        3,
        vec![
            Insn::New(COUNTER.into()),
            Opcode::Dup.into(),
            Insn::invoke(InvokeKind::Special, COUNTER, "<init>", "()V"),
            Store(Reference, 1),
            IntConst(0),
            Store(Int, 2),
            Mark(Label(0)),
            Load(Int, 2),
            Load(Int, 0),
            jump(JumpKind::IfICmpGe, 1),
            Load(Reference, 1),
            Opcode::Dup.into(),
            field(FieldOp::GetField),
            Load(Int, 2),
            Opcode::IAdd.into(),
            field(FieldOp::PutField),
            Insn::Iinc(2, 1),
            jump(JumpKind::Goto, 0),
            Mark(Label(1)),
            Load(Reference, 1),
            field(FieldOp::GetField),
            Opcode::IReturn.into(),
        ],
    )
}

fn counter() -> ClassDefinition {
    let init = Code::new(
        1,
        1,
        vec![
            Load(Reference, 0),
            Insn::invoke(InvokeKind::Special, "java/lang/Object", "<init>", "()V"),
            Opcode::Return.into(),
        ],
    );
    ClassDefinition::new(COUNTER)
        .field(FieldDefinition::new("count", "I", AccessFlags::PRIVATE))
        .method(MethodDefinition::code("<init>", "()V", AccessFlags::PUBLIC, init))
}

fn workload() -> ClassDefinition {
    let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;
    ClassDefinition::new(WORKLOAD)
        .method(MethodDefinition::code("sumSquares", "(I)J", public_static, sum_squares()))
        .method(MethodDefinition::code("fib", "(I)I", public_static, fib()))
        .method(MethodDefinition::code("fill", "(I)I", public_static, fill()))
        .method(MethodDefinition::code("count", "(I)I", public_static, count()))
}

/// Defines the demo classes in `vm` and returns one task per entry
/// point.
pub fn define(vm: &VM) -> VmResult<Vec<Task>> {
    vm.define_class(counter())?;
    vm.define_class(workload())?;
    let tasks = [
        ("sumSquares", "(I)J", 1_000),
        ("fib", "(I)I", 18),
        ("fill", "(I)I", 500),
        ("count", "(I)I", 500),
    ];
    tasks
        .into_iter()
        .map(|(name, desc, argument)| -> VmResult<Task> {
            Ok(Task {
                name,
                method: vm.resolve_method(WORKLOAD, name, desc)?,
                argument,
            })
        })
        .collect()
}

/// Every method of the demo classes that has bytecode.
pub fn bytecode_methods(vm: &VM) -> VmResult<Vec<Arc<JavaMethod>>> {
    let mut methods = Vec::new();
    for name in CLASSES {
        let class = vm.load_class(name)?;
        methods.extend(
            class
                .methods()
                .iter()
                .filter(|method| method.code().is_some())
                .cloned(),
        );
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_vm;

    #[test]
    fn tasks_compute_their_closed_forms() {
        let vm = test_vm();
        let tasks = define(&vm).unwrap();
        let results: Vec<_> = tasks.iter().map(|task| task.run(&vm).unwrap()).collect();
        let n = 1_000i64;
        assert_eq!(results[0], Some(Value::Long((n - 1) * n * (2 * n - 1) / 6)));
        assert_eq!(results[1], Some(Value::Int(2584)));
        assert_eq!(results[2], Some(Value::Int(3 * 500 * 499 / 2)));
        assert_eq!(results[3], Some(Value::Int(500 * 499 / 2)));
        assert_eq!(bytecode_methods(&vm).unwrap().len(), 5);
    }
}
