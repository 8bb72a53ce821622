//! Method translator: lowers bytecode into a [`CompiledUnit`] and installs
//! it as the active implementation of its method.

mod compiler;
mod definer;

use std::sync::Arc;

use log::{debug, info, warn};

pub use compiler::{ClassSlot, CompiledUnit, ConstantTable, LoweredOp, compile};
pub use definer::{Artifact, ClosureDefiner, Definer};

use crate::{Fault, JavaMethod, VmResult};

/// Defines `unit` through `definer` and swaps it in as the implementation
/// of `method`. Constants are resolved when first loaded, not here.
///
/// Nothing is installed if any step fails. Calls already running keep
/// their implementation.
pub fn install(method: &JavaMethod, definer: &dyn Definer, unit: CompiledUnit) -> VmResult<()> {
    let name = method.qualified_name();
    if unit.method != name {
        return Err(Fault::UnitMismatch {
            unit: unit.method,
            method: name,
        }
        .into());
    }
    let (ops, constants) = (unit.ops.len(), unit.constants.len());
    let artifact = definer.define(unit)?;
    if artifact.method() != name {
        return Err(Fault::UnitMismatch {
            unit: artifact.method().to_owned(),
            method: name,
        }
        .into());
    }
    method.install(artifact.instantiate());
    info!("installed {name} ({ops} ops, {constants} constants)");
    Ok(())
}

/// Compiles and installs `method` with the default definer unless it is
/// already translated or was refused before. Failures never reach the
/// caller: they are remembered and the method stays interpreted.
pub(crate) fn translate(method: &Arc<JavaMethod>) {
    if method.is_translated() || method.is_rejected() || method.code().is_none() {
        return;
    }
    let unit = match compile(method) {
        Ok(unit) => unit,
        Err(error) => {
            debug!("keeping {} interpreted: {error}", method.qualified_name());
            method.mark_rejected();
            return;
        }
    };
    if let Err(error) = install(method, &ClosureDefiner, unit) {
        warn!("installing {} failed: {error}", method.qualified_name());
        method.mark_rejected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AccessFlags, ClassDefinition, Code, Constant, Implementation, Insn, InvocationOps,
        JumpKind, Label, LocalKind, MethodDefinition, Opcode, TryCatchBlock, VM, VMCreateInfo,
        Value, VmError, testing::test_vm,
    };

    fn greeting(vm: &VM) -> Arc<JavaMethod> {
        let code = Code::new(
            1,
            0,
            vec![
                Insn::Ldc(Constant::String("hello".into())),
                Opcode::AReturn.into(),
            ],
        );
        vm.define_class(ClassDefinition::new("demo/Greeting").method(MethodDefinition::code(
            "get",
            "()Ljava/lang/String;",
            AccessFlags::STATIC,
            code,
        )))
        .unwrap();
        vm.resolve_method("demo/Greeting", "get", "()Ljava/lang/String;")
            .unwrap()
    }

    #[test]
    fn install_swaps_and_constants_resolve_on_first_load() {
        let vm = test_vm();
        let method = greeting(&vm);
        let unit = compile(&method).unwrap();
        let constants = unit.constants.clone();

        install(&method, &ClosureDefiner, unit).unwrap();
        assert!(method.is_translated());
        assert!(matches!(method.implementation(), Implementation::Compiled(_)));
        assert!(!constants.is_resolved());

        let result = vm.invoke(&method, Vec::new()).unwrap().unwrap();
        let text = result.as_reference().unwrap().unwrap();
        assert!(Arc::ptr_eq(text, &vm.intern("hello").unwrap()));
        assert!(constants.is_resolved());
    }

    #[test]
    fn units_only_install_on_their_method() {
        let vm = test_vm();
        let method = greeting(&vm);
        let other = vm
            .resolve_method("java/lang/Object", "hashCode", "()I")
            .unwrap();
        let unit = compile(&method).unwrap();
        let error = install(&other, &ClosureDefiner, unit).unwrap_err();
        assert!(matches!(error, VmError::Fault(Fault::UnitMismatch { .. })));
        assert!(!other.is_translated());
    }

    /// `int run(int n)`: 1 when `n` is zero, otherwise loads a class that
    /// does not exist
    fn lazy(vm: &VM) -> Arc<JavaMethod> {
        let code = Code::new(
            1,
            1,
            vec![
                Insn::Load(LocalKind::Int, 0),
                Insn::Jump(JumpKind::IfEq, Label(0)),
                Insn::Ldc(Constant::Type("demo/Nowhere".into())),
                Opcode::Pop.into(),
                Insn::Label(Label(0)),
                Insn::IntConst(1),
                Opcode::IReturn.into(),
            ],
        );
        vm.define_class(ClassDefinition::new("demo/Lazy").method(MethodDefinition::code(
            "run",
            "(I)I",
            AccessFlags::STATIC,
            code,
        )))
        .unwrap();
        vm.resolve_method("demo/Lazy", "run", "(I)I").unwrap()
    }

    fn thrown_name(result: VmResult<Option<Value>>) -> String {
        result.unwrap_err().thrown().unwrap().class().name().to_owned()
    }

    #[test]
    fn unreached_constants_do_not_block_translation() {
        let vm = test_vm();
        let method = lazy(&vm);
        install(&method, &ClosureDefiner, compile(&method).unwrap()).unwrap();
        assert!(method.is_translated());
        for _ in 0..2 {
            assert_eq!(
                vm.invoke(&method, vec![Value::Int(0)]).unwrap(),
                Some(Value::Int(1))
            );
            assert_eq!(
                thrown_name(vm.invoke(&method, vec![Value::Int(5)])),
                "java/lang/NoClassDefFoundError"
            );
        }
    }

    #[test]
    fn automatic_translation_never_changes_results() {
        let vm = VM::new(VMCreateInfo {
            translate_after: Some(2),
            ..Default::default()
        })
        .unwrap();
        let method = lazy(&vm);
        for call in 1..=4 {
            assert_eq!(
                vm.invoke(&method, vec![Value::Int(0)]).unwrap(),
                Some(Value::Int(1)),
                "call {call}"
            );
        }
        assert!(method.is_translated());
        assert!(!method.is_rejected());
        assert_eq!(
            thrown_name(vm.invoke(&method, vec![Value::Int(1)])),
            "java/lang/NoClassDefFoundError"
        );
    }

    #[test]
    fn hot_methods_translate_themselves() {
        let vm = VM::new(VMCreateInfo {
            seed: Some(7),
            translate_after: Some(3),
            ..Default::default()
        })
        .unwrap();
        let method = greeting(&vm);
        for call in 1..=4 {
            vm.invoke(&method, Vec::new()).unwrap();
            assert_eq!(method.is_translated(), call >= 3, "call {call}");
        }
    }

    #[test]
    fn refused_methods_stay_interpreted() {
        let vm = VM::new(VMCreateInfo {
            translate_after: Some(1),
            ..Default::default()
        })
        .unwrap();
        let code = Code::new(
            1,
            0,
            vec![
                Insn::Label(Label(0)),
                Insn::IntConst(4),
                Insn::Label(Label(1)),
                Opcode::IReturn.into(),
            ],
        )
        .with_handler(TryCatchBlock {
            start: Label(0),
            end: Label(1),
            handler: Label(1),
            catch_type: None,
        });
        vm.define_class(ClassDefinition::new("demo/Guarded").method(MethodDefinition::code(
            "run",
            "()I",
            AccessFlags::STATIC,
            code,
        )))
        .unwrap();
        let method = vm.resolve_method("demo/Guarded", "run", "()I").unwrap();
        for _ in 0..3 {
            assert_eq!(
                vm.invoke(&method, Vec::new()).unwrap(),
                Some(Value::Int(4))
            );
        }
        assert!(!method.is_translated());
        assert!(method.is_rejected());
    }
}
