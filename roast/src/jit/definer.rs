use std::sync::{Arc, OnceLock};

use crate::{
    AllocationOps, CompiledCode, CompiledUnit, ConstantTable, Fault, FieldOps, FieldType, Flow,
    Frame, InvocationOps, LoweredOp, TypeOps, VM, Value, VmResult,
    ops::semantics::{increment_local, load_local, store_local, table_case},
};

/// Turns a compiled unit into something that can be instantiated as a
/// method body.
pub trait Definer {
    fn define(&self, unit: CompiledUnit) -> Result<Box<dyn Artifact>, Fault>;
}

/// A defined unit, ready to become the active implementation of its
/// method.
pub trait Artifact {
    /// qualified name of the method the artifact was defined for
    fn method(&self) -> &str;
    fn instantiate(&self) -> Arc<dyn CompiledCode>;
}

type Step = Box<dyn Fn(&VM, &mut Frame) -> VmResult<Flow> + Send + Sync>;

fn step(body: impl Fn(&VM, &mut Frame) -> VmResult<Flow> + Send + Sync + 'static) -> Step {
    Box::new(body)
}

/// Defines every lowered instruction as its own closure. Executing the
/// result walks the closures with no per-instruction decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosureDefiner;

impl Definer for ClosureDefiner {
    fn define(&self, unit: CompiledUnit) -> Result<Box<dyn Artifact>, Fault> {
        let constants = unit.constants;
        let steps = unit
            .ops
            .into_iter()
            .map(|op| fuse(op, &constants))
            .collect();
        Ok(Box::new(ClosureArtifact {
            method: unit.method,
            steps: Arc::new(steps),
        }))
    }
}

struct ClosureArtifact {
    method: String,
    steps: Arc<Vec<Step>>,
}

impl Artifact for ClosureArtifact {
    fn method(&self) -> &str {
        &self.method
    }

    fn instantiate(&self) -> Arc<dyn CompiledCode> {
        Arc::new(ClosureCode {
            method: self.method.clone(),
            steps: self.steps.clone(),
        })
    }
}

struct ClosureCode {
    method: String,
    steps: Arc<Vec<Step>>,
}

impl CompiledCode for ClosureCode {
    fn execute(&self, vm: &VM, mut frame: Frame) -> VmResult<Option<Value>> {
        let mut pc = 0;
        loop {
            let Some(step) = self.steps.get(pc) else {
                return Err(Fault::FellOffCode(self.method.clone()).into());
            };
            match step(vm, &mut frame)? {
                Flow::Next => pc += 1,
                Flow::Jump(target) => pc = target,
                Flow::Return(value) => return Ok(value),
            }
        }
    }
}

fn cached<'a, T>(
    cell: &'a OnceLock<Arc<T>>,
    resolve: impl FnOnce() -> VmResult<Arc<T>>,
) -> VmResult<&'a Arc<T>> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = resolve()?;
    Ok(cell.get_or_init(|| value))
}

fn fuse(op: LoweredOp, constants: &Arc<ConstantTable>) -> Step {
    match op {
        LoweredOp::Op(semantics) => step(semantics),
        LoweredOp::Push(value) => step(move |_, frame| {
            frame.push_value(value.clone())?;
            Ok(Flow::Next)
        }),
        LoweredOp::Constant(index) => {
            let constants = constants.clone();
            step(move |vm, frame| {
                frame.push_value(constants.resolve(vm, index)?)?;
                Ok(Flow::Next)
            })
        }
        LoweredOp::Load(kind, index) => step(move |_, frame| {
            load_local(frame, kind, index)?;
            Ok(Flow::Next)
        }),
        LoweredOp::Store(kind, index) => step(move |_, frame| {
            store_local(frame, kind, index)?;
            Ok(Flow::Next)
        }),
        LoweredOp::Iinc(index, delta) => step(move |_, frame| {
            increment_local(frame, index, delta)?;
            Ok(Flow::Next)
        }),
        LoweredOp::IntTest(condition, target) => step(move |_, frame| {
            let value = frame.pop_int()?;
            Ok(if condition(&value, &0) {
                Flow::Jump(target)
            } else {
                Flow::Next
            })
        }),
        LoweredOp::IntCompare(condition, target) => step(move |_, frame| {
            let right = frame.pop_int()?;
            let left = frame.pop_int()?;
            Ok(if condition(&left, &right) {
                Flow::Jump(target)
            } else {
                Flow::Next
            })
        }),
        LoweredOp::Branch(test, target) => step(move |_, frame| {
            Ok(if test(frame)? {
                Flow::Jump(target)
            } else {
                Flow::Next
            })
        }),
        LoweredOp::Goto(target) => step(move |_, _| Ok(Flow::Jump(target))),
        LoweredOp::TableSwitch {
            low,
            high,
            default,
            targets,
        } => step(move |_, frame| {
            let selector = frame.pop_int()?;
            let target = table_case(selector, low, high)
                .and_then(|case| targets.get(case))
                .unwrap_or(&default);
            Ok(Flow::Jump(*target))
        }),
        LoweredOp::LookupSwitch { default, pairs } => step(move |_, frame| {
            let selector = frame.pop_int()?;
            let target = pairs
                .iter()
                .find(|(key, _)| *key == selector)
                .map_or(default, |(_, target)| *target);
            Ok(Flow::Jump(target))
        }),
        LoweredOp::Field {
            op,
            owner,
            name,
            desc,
            resolved,
        } => step(move |vm, frame| {
            let field = cached(&resolved, || vm.resolve_field(&owner, &name, &desc))?;
            vm.access_resolved(frame, op, field)?;
            Ok(Flow::Next)
        }),
        LoweredOp::Invoke {
            kind,
            owner,
            name,
            desc,
            resolved,
        } => step(move |vm, frame| {
            let method = cached(&resolved, || vm.resolve_method(&owner, &name, &desc))?;
            vm.invoke_resolved(frame, kind, method)?;
            Ok(Flow::Next)
        }),
        LoweredOp::New(class) => step(move |vm, frame| {
            vm.new_object(frame, class.get(vm)?)?;
            Ok(Flow::Next)
        }),
        LoweredOp::NewArray(element) => step(move |vm, frame| {
            vm.new_array(frame, &element)?;
            Ok(Flow::Next)
        }),
        LoweredOp::ANewArray(name) => step(move |vm, frame| {
            vm.new_array(frame, &FieldType::from_internal_name(&name)?)?;
            Ok(Flow::Next)
        }),
        LoweredOp::MultiANewArray(class, dimensions) => step(move |vm, frame| {
            vm.new_multi_array(frame, class.get(vm)?, dimensions)?;
            Ok(Flow::Next)
        }),
        LoweredOp::CheckCast(class) => step(move |vm, frame| {
            vm.check_cast(frame, class.get(vm)?)?;
            Ok(Flow::Next)
        }),
        LoweredOp::InstanceOf(class) => step(move |vm, frame| {
            vm.instance_of(frame, class.get(vm)?)?;
            Ok(Flow::Next)
        }),
    }
}
