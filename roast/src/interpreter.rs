use log::trace;

use crate::{
    AllocationOps, Code, ConstantOps, DynamicOps, DynamicSite, ExceptionOps, Fault, FieldOps,
    FieldType, Flow, Frame, InvocationOps, Insn, JavaMethod, TypeOps, VM, Value, VmError,
    VmResult, jump_test, opcode_semantics,
    ops::semantics::{increment_local, load_local, store_local, table_case},
};

/// Runs `code` of `method` on `frame` until it returns or throws past
/// its last handler.
pub(crate) fn execute(
    vm: &VM,
    method: &JavaMethod,
    code: &Code,
    mut frame: Frame,
) -> VmResult<Option<Value>> {
    let mut pc = 0;
    loop {
        let Some(insn) = code.insns.get(pc) else {
            return Err(Fault::FellOffCode(method.qualified_name()).into());
        };
        match step(vm, method, code, &mut frame, pc, insn) {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(target)) => pc = target,
            Ok(Flow::Return(value)) => return Ok(value),
            Err(VmError::Thrown(exception)) => {
                let Some(handler) = vm.find_handler(code, pc, &exception)? else {
                    trace!(
                        "{} unwinds {}",
                        exception.class().name(),
                        method.qualified_name()
                    );
                    return Err(VmError::Thrown(exception));
                };
                frame.clear_stack();
                frame.push_reference(Some(exception))?;
                pc = handler;
            }
            Err(fault) => return Err(fault),
        }
    }
}

fn step(
    vm: &VM,
    method: &JavaMethod,
    code: &Code,
    frame: &mut Frame,
    pc: usize,
    insn: &Insn,
) -> VmResult<Flow> {
    match insn {
        Insn::Op(op) => return opcode_semantics(*op)(vm, frame),
        Insn::Label(_) => {}
        Insn::IntConst(value) => frame.push_int(*value)?,
        Insn::LongConst(value) => frame.push_long(*value)?,
        Insn::FloatConst(value) => frame.push_float(*value)?,
        Insn::DoubleConst(value) => frame.push_double(*value)?,
        Insn::Ldc(constant) => frame.push_value(vm.ldc(constant)?)?,
        Insn::Load(kind, index) => load_local(frame, *kind, *index)?,
        Insn::Store(kind, index) => store_local(frame, *kind, *index)?,
        Insn::Iinc(index, delta) => increment_local(frame, *index, *delta)?,
        Insn::Jump(kind, label) => {
            if jump_test(*kind)(frame)? {
                return Ok(Flow::Jump(code.target(*label)?));
            }
        }
        Insn::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            let selector = frame.pop_int()?;
            let label = table_case(selector, *low, *high)
                .and_then(|case| targets.get(case))
                .unwrap_or(default);
            return Ok(Flow::Jump(code.target(*label)?));
        }
        Insn::LookupSwitch { default, pairs } => {
            let selector = frame.pop_int()?;
            let label = pairs
                .iter()
                .find(|(key, _)| *key == selector)
                .map_or(default, |(_, label)| label);
            return Ok(Flow::Jump(code.target(*label)?));
        }
        Insn::Field {
            op,
            owner,
            name,
            desc,
        } => vm.field_access(frame, *op, owner, name, desc)?,
        Insn::Invoke {
            kind,
            owner,
            name,
            desc,
        } => vm.invoke_method(frame, *kind, owner, name, desc)?,
        Insn::InvokeDynamic {
            name,
            desc,
            bootstrap,
            args,
        } => {
            let site = DynamicSite {
                index: pc,
                name,
                desc,
                bootstrap,
                args,
            };
            vm.invoke_dynamic(frame, method, site)?;
        }
        Insn::New(name) => vm.new_object(frame, &vm.load_class(name)?)?,
        Insn::NewArray(element) => vm.new_array(frame, element)?,
        Insn::ANewArray(name) => vm.new_array(frame, &FieldType::from_internal_name(name)?)?,
        Insn::MultiANewArray(name, dimensions) => {
            vm.new_multi_array(frame, &vm.load_class(name)?, *dimensions)?
        }
        Insn::CheckCast(name) => vm.check_cast(frame, &*vm.load_class(name)?)?,
        Insn::InstanceOf(name) => vm.instance_of(frame, &*vm.load_class(name)?)?,
    }
    Ok(Flow::Next)
}
