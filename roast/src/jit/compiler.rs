use std::sync::{Arc, OnceLock};

use log::trace;

use crate::{
    CompileError, Constant, ConstantOps, Fault, FieldOp, FieldType, Insn, InvokeKind, JavaClass,
    JavaField, JavaMethod, JumpKind, JumpTest, Label, LocalKind, OpcodeFn, VM, Value, VmResult,
    jump_test, opcode_semantics,
};

/// Non-primitive constants of a unit. Each entry is resolved the first
/// time an instruction loading it executes and reused afterwards.
#[derive(Debug, Default)]
pub struct ConstantTable {
    entries: Vec<(Constant, OnceLock<Value>)>,
}

impl ConstantTable {
    fn add(&mut self, constant: Constant) -> usize {
        if let Some(index) = self.entries.iter().position(|(known, _)| *known == constant) {
            return index;
        }
        self.entries.push((constant, OnceLock::new()));
        self.entries.len() - 1
    }

    /// Value of entry `index`, resolving it on first use. A failed
    /// resolution leaves the entry unset, so the next use raises the same
    /// error as the interpreter would.
    pub fn resolve(&self, vm: &VM, index: usize) -> VmResult<Value> {
        let (constant, cell) = self
            .entries
            .get(index)
            .ok_or(Fault::MissingConstant(index))?;
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }
        let value = vm.ldc(constant)?;
        Ok(cell.get_or_init(|| value).clone())
    }

    pub fn is_resolved(&self) -> bool {
        self.entries.iter().all(|(_, cell)| cell.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Symbolic class reference, loaded on first execution.
#[derive(Debug)]
pub struct ClassSlot {
    pub name: String,
    pub(crate) resolved: OnceLock<Arc<JavaClass>>,
}

impl ClassSlot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            resolved: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self, vm: &VM) -> VmResult<&Arc<JavaClass>> {
        if let Some(class) = self.resolved.get() {
            return Ok(class);
        }
        let class = vm.load_class(&self.name)?;
        Ok(self.resolved.get_or_init(|| class))
    }
}

/// One instruction after lowering. Labels are gone and every target is
/// an index into the lowered sequence.
#[derive(Debug)]
pub enum LoweredOp {
    Op(OpcodeFn),
    /// primitive literal, folded into its value
    Push(Value),
    /// entry of the unit's [`ConstantTable`]
    Constant(usize),
    Load(LocalKind, u16),
    Store(LocalKind, u16),
    Iinc(u16, i32),
    /// `if<cond>` against zero as a plain integer comparison
    IntTest(fn(&i32, &i32) -> bool, usize),
    /// `if_icmp<cond>` as a plain integer comparison
    IntCompare(fn(&i32, &i32) -> bool, usize),
    Branch(JumpTest, usize),
    Goto(usize),
    TableSwitch {
        low: i32,
        high: i32,
        default: usize,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
    Field {
        op: FieldOp,
        owner: String,
        name: String,
        desc: String,
        resolved: OnceLock<Arc<JavaField>>,
    },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        desc: String,
        resolved: OnceLock<Arc<JavaMethod>>,
    },
    New(ClassSlot),
    NewArray(FieldType),
    /// element class name, parsed when executed
    ANewArray(String),
    MultiANewArray(ClassSlot, u8),
    CheckCast(ClassSlot),
    InstanceOf(ClassSlot),
}

/// Output of [`compile`], waiting to be handed to a
/// [`Definer`](crate::Definer).
#[derive(Debug)]
pub struct CompiledUnit {
    /// qualified name of the method this unit was compiled from
    pub method: String,
    pub ops: Vec<LoweredOp>,
    pub constants: Arc<ConstantTable>,
    pub max_stack: u16,
    pub max_locals: u16,
}

fn int_condition(kind: JumpKind) -> Option<fn(&i32, &i32) -> bool> {
    let condition: fn(&i32, &i32) -> bool = match kind {
        JumpKind::IfEq | JumpKind::IfICmpEq => i32::eq,
        JumpKind::IfNe | JumpKind::IfICmpNe => i32::ne,
        JumpKind::IfLt | JumpKind::IfICmpLt => i32::lt,
        JumpKind::IfGe | JumpKind::IfICmpGe => i32::ge,
        JumpKind::IfGt | JumpKind::IfICmpGt => i32::gt,
        JumpKind::IfLe | JumpKind::IfICmpLe => i32::le,
        _ => return None,
    };
    Some(condition)
}

fn compares_with_zero(kind: JumpKind) -> bool {
    matches!(
        kind,
        JumpKind::IfEq
            | JumpKind::IfNe
            | JumpKind::IfLt
            | JumpKind::IfGe
            | JumpKind::IfGt
            | JumpKind::IfLe
    )
}

/// Lowers the bytecode of `method` into a [`CompiledUnit`].
///
/// Methods with exception handlers or `invokedynamic` are refused, as
/// are methods without bytecode.
pub fn compile(method: &JavaMethod) -> Result<CompiledUnit, CompileError> {
    let name = method.qualified_name();
    let Some(code) = method.code() else {
        return Err(CompileError::NotBytecode { method: name });
    };
    if !code.handlers.is_empty() {
        return Err(CompileError::ExceptionHandlers { method: name });
    }
    // lowered index of every original instruction; a label maps to the
    // instruction following it
    let mut positions = Vec::with_capacity(code.insns.len());
    let mut lowered = 0;
    for insn in &code.insns {
        positions.push(lowered);
        if !matches!(insn, Insn::Label(_)) {
            lowered += 1;
        }
    }
    let target = |label: Label| {
        code.target(label)
            .map(|index| positions[index])
            .map_err(|_| CompileError::UndefinedLabel {
                method: name.clone(),
                label: label.0,
            })
    };

    let mut constants = ConstantTable::default();
    let mut ops = Vec::with_capacity(lowered);
    for (index, insn) in code.insns.iter().enumerate() {
        let op = match insn {
            Insn::Label(_) => continue,
            Insn::Op(op) => LoweredOp::Op(opcode_semantics(*op)),
            Insn::IntConst(value) => LoweredOp::Push(Value::Int(*value)),
            Insn::LongConst(value) => LoweredOp::Push(Value::Long(*value)),
            Insn::FloatConst(value) => LoweredOp::Push(Value::Float(*value)),
            Insn::DoubleConst(value) => LoweredOp::Push(Value::Double(*value)),
            Insn::Ldc(constant) => match constant {
                Constant::Int(value) => LoweredOp::Push(Value::Int(*value)),
                Constant::Long(value) => LoweredOp::Push(Value::Long(*value)),
                Constant::Float(value) => LoweredOp::Push(Value::Float(*value)),
                Constant::Double(value) => LoweredOp::Push(Value::Double(*value)),
                lifted => LoweredOp::Constant(constants.add(lifted.clone())),
            },
            Insn::Load(kind, index) => LoweredOp::Load(*kind, *index),
            Insn::Store(kind, index) => LoweredOp::Store(*kind, *index),
            Insn::Iinc(index, delta) => LoweredOp::Iinc(*index, *delta),
            Insn::Jump(JumpKind::Goto, label) => LoweredOp::Goto(target(*label)?),
            Insn::Jump(kind, label) => {
                let to = target(*label)?;
                match int_condition(*kind) {
                    Some(cmp) if compares_with_zero(*kind) => LoweredOp::IntTest(cmp, to),
                    Some(cmp) => LoweredOp::IntCompare(cmp, to),
                    None => LoweredOp::Branch(jump_test(*kind), to),
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => LoweredOp::TableSwitch {
                low: *low,
                high: *high,
                default: target(*default)?,
                targets: targets
                    .iter()
                    .map(|label| target(*label))
                    .collect::<Result<_, _>>()?,
            },
            Insn::LookupSwitch { default, pairs } => LoweredOp::LookupSwitch {
                default: target(*default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, label)| Ok((*key, target(*label)?)))
                    .collect::<Result<_, CompileError>>()?,
            },
            Insn::Field {
                op,
                owner,
                name,
                desc,
            } => LoweredOp::Field {
                op: *op,
                owner: owner.clone(),
                name: name.clone(),
                desc: desc.clone(),
                resolved: OnceLock::new(),
            },
            Insn::Invoke {
                kind,
                owner,
                name,
                desc,
            } => LoweredOp::Invoke {
                kind: *kind,
                owner: owner.clone(),
                name: name.clone(),
                desc: desc.clone(),
                resolved: OnceLock::new(),
            },
            Insn::InvokeDynamic { .. } => {
                return Err(CompileError::DynamicCallSite {
                    method: name.clone(),
                    index,
                });
            }
            Insn::New(class) => LoweredOp::New(ClassSlot::new(class)),
            Insn::NewArray(element) => LoweredOp::NewArray(element.clone()),
            Insn::ANewArray(class) => LoweredOp::ANewArray(class.clone()),
            Insn::MultiANewArray(class, dimensions) => {
                LoweredOp::MultiANewArray(ClassSlot::new(class), *dimensions)
            }
            Insn::CheckCast(class) => LoweredOp::CheckCast(ClassSlot::new(class)),
            Insn::InstanceOf(class) => LoweredOp::InstanceOf(ClassSlot::new(class)),
        };
        ops.push(op);
    }
    trace!(
        "compiled {name}: {} ops, {} constants",
        ops.len(),
        constants.len()
    );
    Ok(CompiledUnit {
        method: name,
        ops,
        constants: Arc::new(constants),
        max_stack: code.max_stack,
        max_locals: code.max_locals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AccessFlags, ClassDefinition, Code, HandleKind, HandleRef, InvocationOps, Label,
        MethodDefinition, Opcode, TryCatchBlock, VmError, testing::test_vm,
    };

    fn method(vm: &VM, class: &str, code: Code) -> Arc<JavaMethod> {
        vm.define_class(ClassDefinition::new(class).method(MethodDefinition::code(
            "run",
            "()I",
            AccessFlags::STATIC,
            code,
        )))
        .unwrap();
        vm.resolve_method(class, "run", "()I").unwrap()
    }

    #[test]
    fn labels_are_removed_and_targets_relabelled() {
        let vm = test_vm();
        let code = Code::new(
            2,
            1,
            vec![
                Insn::Label(Label(7)),
                Insn::IntConst(1),
                Insn::Jump(JumpKind::IfNe, Label(8)),
                Insn::Jump(JumpKind::Goto, Label(7)),
                Insn::Label(Label(8)),
                Insn::Label(Label(9)),
                Insn::Ldc(Constant::Long(3)),
                Insn::Ldc(Constant::String("x".into())),
                Insn::Ldc(Constant::String("x".into())),
                Opcode::IReturn.into(),
            ],
        );
        let unit = compile(&method(&vm, "demo/Labels", code)).unwrap();
        assert_eq!(unit.method, "demo/Labels.run()I");
        assert_eq!(unit.ops.len(), 7);
        assert!(matches!(unit.ops[1], LoweredOp::IntTest(_, 3)));
        assert!(matches!(unit.ops[2], LoweredOp::Goto(0)));
        assert!(matches!(unit.ops[3], LoweredOp::Push(Value::Long(3))));
        assert!(matches!(unit.ops[4], LoweredOp::Constant(0)));
        assert!(matches!(unit.ops[5], LoweredOp::Constant(0)));
        assert_eq!(unit.constants.len(), 1);
        assert!(!unit.constants.is_resolved());
        assert!(matches!(
            unit.constants.resolve(&vm, 1),
            Err(VmError::Fault(Fault::MissingConstant(1)))
        ));
        let text = unit.constants.resolve(&vm, 0).unwrap();
        assert!(unit.constants.is_resolved());
        assert_eq!(unit.constants.resolve(&vm, 0).unwrap(), text);
    }

    #[test]
    fn rejections() {
        let vm = test_vm();
        let guarded = Code::new(
            1,
            0,
            vec![
                Insn::Label(Label(0)),
                Insn::IntConst(0),
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
        assert!(matches!(
            compile(&method(&vm, "demo/Guarded", guarded)),
            Err(CompileError::ExceptionHandlers { .. })
        ));

        let dynamic = Code::new(
            1,
            0,
            vec![
                Insn::IntConst(0),
                Insn::InvokeDynamic {
                    name: "f".into(),
                    desc: "()V".into(),
                    bootstrap: HandleRef::new(HandleKind::InvokeStatic, "demo/B", "b", "()V"),
                    args: Vec::new(),
                },
                Opcode::IReturn.into(),
            ],
        );
        assert_eq!(
            compile(&method(&vm, "demo/Dynamic", dynamic)).unwrap_err(),
            CompileError::DynamicCallSite {
                method: "demo/Dynamic.run()I".into(),
                index: 1
            }
        );

        let dangling = Code::new(1, 0, vec![Insn::Jump(JumpKind::Goto, Label(4))]);
        assert!(matches!(
            compile(&method(&vm, "demo/Dangling", dangling)),
            Err(CompileError::UndefinedLabel { label: 4, .. })
        ));

        let native = vm
            .resolve_method("java/lang/Object", "hashCode", "()I")
            .unwrap();
        assert!(matches!(
            compile(&native),
            Err(CompileError::NotBytecode { .. })
        ));
    }
}
