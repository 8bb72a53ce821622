//! Per-opcode behaviour shared by the interpreter and translated code.
//!
//! Both execution engines fetch the same function pointer for an opcode,
//! the interpreter on every dispatch and the translator once per
//! instruction, so they cannot drift apart.

use crate::{
    ArithmeticOps, ArrayKind, ArrayOps, ExceptionOps, Fault, Frame, JumpKind, LocalKind,
    MonitorOps, Opcode, VM, Value, VmResult,
    ops::arith::{self, NanResult},
};

/// What happens after an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

pub type OpcodeFn = fn(&VM, &mut Frame) -> VmResult<Flow>;

/// Pops the operands of a conditional jump and reports whether it is taken.
pub type JumpTest = fn(&mut Frame) -> Result<bool, Fault>;

macro_rules! binary {
    ($($name:ident: $pop:ident -> $push:ident, |$vm:ident, $a:ident, $b:ident| $body:expr;)*) => {
        $(
            #[allow(unused_variables)]
            fn $name($vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
                let $b = frame.$pop()?;
                let $a = frame.$pop()?;
                frame.$push($body)?;
                Ok(Flow::Next)
            }
        )*
    };
}

macro_rules! unary {
    ($($name:ident: $pop:ident -> $push:ident, |$a:ident| $body:expr;)*) => {
        $(
            fn $name(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
                let $a = frame.$pop()?;
                frame.$push($body)?;
                Ok(Flow::Next)
            }
        )*
    };
}

macro_rules! delegate {
    ($($name:ident: |$vm:ident, $frame:ident| $body:expr;)*) => {
        $(
            fn $name($vm: &VM, $frame: &mut Frame) -> VmResult<Flow> {
                $body?;
                Ok(Flow::Next)
            }
        )*
    };
}

binary! {
    iadd: pop_int -> push_int, |vm, a, b| a.wrapping_add(b);
    ladd: pop_long -> push_long, |vm, a, b| a.wrapping_add(b);
    fadd: pop_float -> push_float, |vm, a, b| a + b;
    dadd: pop_double -> push_double, |vm, a, b| a + b;
    isub: pop_int -> push_int, |vm, a, b| a.wrapping_sub(b);
    lsub: pop_long -> push_long, |vm, a, b| a.wrapping_sub(b);
    fsub: pop_float -> push_float, |vm, a, b| a - b;
    dsub: pop_double -> push_double, |vm, a, b| a - b;
    imul: pop_int -> push_int, |vm, a, b| a.wrapping_mul(b);
    lmul: pop_long -> push_long, |vm, a, b| a.wrapping_mul(b);
    fmul: pop_float -> push_float, |vm, a, b| a * b;
    dmul: pop_double -> push_double, |vm, a, b| a * b;
    idiv: pop_int -> push_int, |vm, a, b| vm.int_divide(a, b)?;
    ldiv: pop_long -> push_long, |vm, a, b| vm.long_divide(a, b)?;
    fdiv: pop_float -> push_float, |vm, a, b| a / b;
    ddiv: pop_double -> push_double, |vm, a, b| a / b;
    irem: pop_int -> push_int, |vm, a, b| vm.int_remainder(a, b)?;
    lrem: pop_long -> push_long, |vm, a, b| vm.long_remainder(a, b)?;
    frem: pop_float -> push_float, |vm, a, b| a % b;
    drem: pop_double -> push_double, |vm, a, b| a % b;
    iand: pop_int -> push_int, |vm, a, b| a & b;
    land: pop_long -> push_long, |vm, a, b| a & b;
    ior: pop_int -> push_int, |vm, a, b| a | b;
    lor: pop_long -> push_long, |vm, a, b| a | b;
    ixor: pop_int -> push_int, |vm, a, b| a ^ b;
    lxor: pop_long -> push_long, |vm, a, b| a ^ b;
    ishl: pop_int -> push_int, |vm, a, b| arith::int_shift_left(a, b);
    ishr: pop_int -> push_int, |vm, a, b| arith::int_shift_right(a, b);
    iushr: pop_int -> push_int, |vm, a, b| arith::int_unsigned_shift_right(a, b);
    fcmpl: pop_float -> push_int, |vm, a, b| arith::float_compare(a, b, NanResult::Less);
    fcmpg: pop_float -> push_int, |vm, a, b| arith::float_compare(a, b, NanResult::Greater);
    dcmpl: pop_double -> push_int, |vm, a, b| arith::double_compare(a, b, NanResult::Less);
    dcmpg: pop_double -> push_int, |vm, a, b| arith::double_compare(a, b, NanResult::Greater);
    lcmp: pop_long -> push_int, |vm, a, b| arith::long_compare(a, b);
}

// long shifts take an int distance on top of a long value
macro_rules! long_shift {
    ($($name:ident: $shift:path;)*) => {
        $(
            fn $name(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
                let distance = frame.pop_int()?;
                let value = frame.pop_long()?;
                frame.push_long($shift(value, distance))?;
                Ok(Flow::Next)
            }
        )*
    };
}

long_shift! {
    lshl: arith::long_shift_left;
    lshr: arith::long_shift_right;
    lushr: arith::long_unsigned_shift_right;
}

unary! {
    ineg: pop_int -> push_int, |a| a.wrapping_neg();
    lneg: pop_long -> push_long, |a| a.wrapping_neg();
    fneg: pop_float -> push_float, |a| -a;
    dneg: pop_double -> push_double, |a| -a;
    i2l: pop_int -> push_long, |a| a as i64;
    i2f: pop_int -> push_float, |a| a as f32;
    i2d: pop_int -> push_double, |a| a as f64;
    l2i: pop_long -> push_int, |a| a as i32;
    l2f: pop_long -> push_float, |a| a as f32;
    l2d: pop_long -> push_double, |a| a as f64;
    f2i: pop_float -> push_int, |a| arith::float_to_int(a);
    f2l: pop_float -> push_long, |a| arith::float_to_long(a);
    f2d: pop_float -> push_double, |a| a as f64;
    d2i: pop_double -> push_int, |a| arith::double_to_int(a);
    d2l: pop_double -> push_long, |a| arith::double_to_long(a);
    d2f: pop_double -> push_float, |a| a as f32;
    i2b: pop_int -> push_int, |a| a as i8 as i32;
    i2c: pop_int -> push_int, |a| a as u16 as i32;
    i2s: pop_int -> push_int, |a| a as i16 as i32;
}

delegate! {
    iaload: |vm, frame| vm.array_load(frame, ArrayKind::Int);
    laload: |vm, frame| vm.array_load(frame, ArrayKind::Long);
    faload: |vm, frame| vm.array_load(frame, ArrayKind::Float);
    daload: |vm, frame| vm.array_load(frame, ArrayKind::Double);
    aaload: |vm, frame| vm.array_load(frame, ArrayKind::Reference);
    baload: |vm, frame| vm.array_load(frame, ArrayKind::Byte);
    caload: |vm, frame| vm.array_load(frame, ArrayKind::Char);
    saload: |vm, frame| vm.array_load(frame, ArrayKind::Short);
    iastore: |vm, frame| vm.array_store(frame, ArrayKind::Int);
    lastore: |vm, frame| vm.array_store(frame, ArrayKind::Long);
    fastore: |vm, frame| vm.array_store(frame, ArrayKind::Float);
    dastore: |vm, frame| vm.array_store(frame, ArrayKind::Double);
    aastore: |vm, frame| vm.array_store(frame, ArrayKind::Reference);
    bastore: |vm, frame| vm.array_store(frame, ArrayKind::Byte);
    castore: |vm, frame| vm.array_store(frame, ArrayKind::Char);
    sastore: |vm, frame| vm.array_store(frame, ArrayKind::Short);
    arraylength: |vm, frame| vm.array_length(frame);
    monitorenter: |vm, frame| vm.monitor_enter(frame);
    monitorexit: |vm, frame| vm.monitor_exit(frame);
    nop: |_vm, _frame| VmResult::Ok(());
    aconst_null: |_vm, frame| frame.push(Value::Null);
    pop: |_vm, frame| frame.pop();
    pop2: |_vm, frame| frame.pop_slots(2);
}

fn dup(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let top = frame.peek(0)?.clone();
    frame.push(top)?;
    Ok(Flow::Next)
}

fn dup_x1(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let first = frame.pop()?;
    let second = frame.pop()?;
    frame.push_slots([first.clone(), second, first])?;
    Ok(Flow::Next)
}

fn dup_x2(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let first = frame.pop()?;
    let below = frame.pop_slots(2)?;
    frame.push(first.clone())?;
    frame.push_slots(below)?;
    frame.push(first)?;
    Ok(Flow::Next)
}

fn dup2(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let top = frame.pop_slots(2)?;
    frame.push_slots(top.clone())?;
    frame.push_slots(top)?;
    Ok(Flow::Next)
}

fn dup2_x1(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let top = frame.pop_slots(2)?;
    let third = frame.pop()?;
    frame.push_slots(top.clone())?;
    frame.push(third)?;
    frame.push_slots(top)?;
    Ok(Flow::Next)
}

fn dup2_x2(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let top = frame.pop_slots(2)?;
    let below = frame.pop_slots(2)?;
    frame.push_slots(top.clone())?;
    frame.push_slots(below)?;
    frame.push_slots(top)?;
    Ok(Flow::Next)
}

fn swap(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    let first = frame.pop()?;
    let second = frame.pop()?;
    frame.push(first)?;
    frame.push(second)?;
    Ok(Flow::Next)
}

fn ireturn(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(Some(Value::Int(frame.pop_int()?))))
}

fn lreturn(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(Some(Value::Long(frame.pop_long()?))))
}

fn freturn(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(Some(Value::Float(frame.pop_float()?))))
}

fn dreturn(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(Some(Value::Double(frame.pop_double()?))))
}

fn areturn(_vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(Some(frame.pop_reference()?.into())))
}

fn vreturn(_vm: &VM, _frame: &mut Frame) -> VmResult<Flow> {
    Ok(Flow::Return(None))
}

fn athrow(vm: &VM, frame: &mut Frame) -> VmResult<Flow> {
    Err(vm.athrow(frame))
}

/// The fixed opcode table.
pub fn opcode_semantics(op: Opcode) -> OpcodeFn {
    match op {
        Opcode::Nop => nop,
        Opcode::AconstNull => aconst_null,
        Opcode::IAdd => iadd,
        Opcode::LAdd => ladd,
        Opcode::FAdd => fadd,
        Opcode::DAdd => dadd,
        Opcode::ISub => isub,
        Opcode::LSub => lsub,
        Opcode::FSub => fsub,
        Opcode::DSub => dsub,
        Opcode::IMul => imul,
        Opcode::LMul => lmul,
        Opcode::FMul => fmul,
        Opcode::DMul => dmul,
        Opcode::IDiv => idiv,
        Opcode::LDiv => ldiv,
        Opcode::FDiv => fdiv,
        Opcode::DDiv => ddiv,
        Opcode::IRem => irem,
        Opcode::LRem => lrem,
        Opcode::FRem => frem,
        Opcode::DRem => drem,
        Opcode::INeg => ineg,
        Opcode::LNeg => lneg,
        Opcode::FNeg => fneg,
        Opcode::DNeg => dneg,
        Opcode::IShl => ishl,
        Opcode::LShl => lshl,
        Opcode::IShr => ishr,
        Opcode::LShr => lshr,
        Opcode::IUShr => iushr,
        Opcode::LUShr => lushr,
        Opcode::IAnd => iand,
        Opcode::LAnd => land,
        Opcode::IOr => ior,
        Opcode::LOr => lor,
        Opcode::IXor => ixor,
        Opcode::LXor => lxor,
        Opcode::I2L => i2l,
        Opcode::I2F => i2f,
        Opcode::I2D => i2d,
        Opcode::L2I => l2i,
        Opcode::L2F => l2f,
        Opcode::L2D => l2d,
        Opcode::F2I => f2i,
        Opcode::F2L => f2l,
        Opcode::F2D => f2d,
        Opcode::D2I => d2i,
        Opcode::D2L => d2l,
        Opcode::D2F => d2f,
        Opcode::I2B => i2b,
        Opcode::I2C => i2c,
        Opcode::I2S => i2s,
        Opcode::LCmp => lcmp,
        Opcode::FCmpL => fcmpl,
        Opcode::FCmpG => fcmpg,
        Opcode::DCmpL => dcmpl,
        Opcode::DCmpG => dcmpg,
        Opcode::Pop => pop,
        Opcode::Pop2 => pop2,
        Opcode::Dup => dup,
        Opcode::DupX1 => dup_x1,
        Opcode::DupX2 => dup_x2,
        Opcode::Dup2 => dup2,
        Opcode::Dup2X1 => dup2_x1,
        Opcode::Dup2X2 => dup2_x2,
        Opcode::Swap => swap,
        Opcode::IALoad => iaload,
        Opcode::LALoad => laload,
        Opcode::FALoad => faload,
        Opcode::DALoad => daload,
        Opcode::AALoad => aaload,
        Opcode::BALoad => baload,
        Opcode::CALoad => caload,
        Opcode::SALoad => saload,
        Opcode::IAStore => iastore,
        Opcode::LAStore => lastore,
        Opcode::FAStore => fastore,
        Opcode::DAStore => dastore,
        Opcode::AAStore => aastore,
        Opcode::BAStore => bastore,
        Opcode::CAStore => castore,
        Opcode::SAStore => sastore,
        Opcode::ArrayLength => arraylength,
        Opcode::IReturn => ireturn,
        Opcode::LReturn => lreturn,
        Opcode::FReturn => freturn,
        Opcode::DReturn => dreturn,
        Opcode::AReturn => areturn,
        Opcode::Return => vreturn,
        Opcode::AThrow => athrow,
        Opcode::MonitorEnter => monitorenter,
        Opcode::MonitorExit => monitorexit,
    }
}

macro_rules! int_test {
    ($($name:ident: |$a:ident| $body:expr;)*) => {
        $(
            fn $name(frame: &mut Frame) -> Result<bool, Fault> {
                let $a = frame.pop_int()?;
                Ok($body)
            }
        )*
    };
}

macro_rules! int_pair_test {
    ($($name:ident: |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            fn $name(frame: &mut Frame) -> Result<bool, Fault> {
                let $b = frame.pop_int()?;
                let $a = frame.pop_int()?;
                Ok($body)
            }
        )*
    };
}

int_test! {
    if_eq: |a| a == 0;
    if_ne: |a| a != 0;
    if_lt: |a| a < 0;
    if_ge: |a| a >= 0;
    if_gt: |a| a > 0;
    if_le: |a| a <= 0;
}

int_pair_test! {
    if_icmp_eq: |a, b| a == b;
    if_icmp_ne: |a, b| a != b;
    if_icmp_lt: |a, b| a < b;
    if_icmp_ge: |a, b| a >= b;
    if_icmp_gt: |a, b| a > b;
    if_icmp_le: |a, b| a <= b;
}

fn same_reference(frame: &mut Frame) -> Result<bool, Fault> {
    let b = frame.pop_reference()?;
    let a = frame.pop_reference()?;
    Ok(match (a, b) {
        (Some(a), Some(b)) => std::sync::Arc::ptr_eq(&a, &b),
        (None, None) => true,
        _ => false,
    })
}

fn if_acmp_eq(frame: &mut Frame) -> Result<bool, Fault> {
    same_reference(frame)
}

fn if_acmp_ne(frame: &mut Frame) -> Result<bool, Fault> {
    Ok(!same_reference(frame)?)
}

fn if_null(frame: &mut Frame) -> Result<bool, Fault> {
    Ok(frame.pop_reference()?.is_none())
}

fn if_non_null(frame: &mut Frame) -> Result<bool, Fault> {
    Ok(frame.pop_reference()?.is_some())
}

fn goto(_frame: &mut Frame) -> Result<bool, Fault> {
    Ok(true)
}

pub fn jump_test(kind: JumpKind) -> JumpTest {
    match kind {
        JumpKind::IfEq => if_eq,
        JumpKind::IfNe => if_ne,
        JumpKind::IfLt => if_lt,
        JumpKind::IfGe => if_ge,
        JumpKind::IfGt => if_gt,
        JumpKind::IfLe => if_le,
        JumpKind::IfICmpEq => if_icmp_eq,
        JumpKind::IfICmpNe => if_icmp_ne,
        JumpKind::IfICmpLt => if_icmp_lt,
        JumpKind::IfICmpGe => if_icmp_ge,
        JumpKind::IfICmpGt => if_icmp_gt,
        JumpKind::IfICmpLe => if_icmp_le,
        JumpKind::IfACmpEq => if_acmp_eq,
        JumpKind::IfACmpNe => if_acmp_ne,
        JumpKind::IfNull => if_null,
        JumpKind::IfNonNull => if_non_null,
        JumpKind::Goto => goto,
    }
}

fn kind_name(kind: LocalKind) -> &'static str {
    match kind {
        LocalKind::Int => "int",
        LocalKind::Long => "long",
        LocalKind::Float => "float",
        LocalKind::Double => "double",
        LocalKind::Reference => "reference",
    }
}

fn check_kind(kind: LocalKind, value: &Value) -> Result<(), Fault> {
    let matches = matches!(
        (kind, value),
        (LocalKind::Int, Value::Int(_))
            | (LocalKind::Long, Value::Long(_))
            | (LocalKind::Float, Value::Float(_))
            | (LocalKind::Double, Value::Double(_))
            | (LocalKind::Reference, Value::Reference(_) | Value::Null)
    );
    if matches {
        Ok(())
    } else {
        Err(Fault::SlotMismatch {
            expected: kind_name(kind),
            found: value.kind_name(),
        })
    }
}

/// `xload`: local to stack
pub fn load_local(frame: &mut Frame, kind: LocalKind, index: u16) -> Result<(), Fault> {
    let index = usize::from(index);
    if kind.is_wide() {
        let value = frame.load_wide(index)?;
        check_kind(kind, &value)?;
        frame.push_wide(value)
    } else {
        let value = frame.load(index)?;
        check_kind(kind, &value)?;
        frame.push(value)
    }
}

/// `xstore`: stack to local
pub fn store_local(frame: &mut Frame, kind: LocalKind, index: u16) -> Result<(), Fault> {
    let index = usize::from(index);
    if kind.is_wide() {
        let value = frame.pop_wide()?;
        check_kind(kind, &value)?;
        frame.store_wide(index, value)
    } else {
        let value = frame.pop()?;
        check_kind(kind, &value)?;
        frame.store(index, value)
    }
}

pub fn increment_local(frame: &mut Frame, index: u16, delta: i32) -> Result<(), Fault> {
    let index = usize::from(index);
    let value = frame.load(index)?.as_int()?;
    frame.store(index, Value::Int(value.wrapping_add(delta)))
}

/// Case of a `tableswitch` the selector falls into, `None` for default.
pub fn table_case(selector: i32, low: i32, high: i32) -> Option<usize> {
    (low..=high)
        .contains(&selector)
        .then(|| (i64::from(selector) - i64::from(low)) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_vm;

    fn run(vm: &VM, frame: &mut Frame, ops: &[Opcode]) -> VmResult<Flow> {
        let mut flow = Flow::Next;
        for op in ops {
            flow = opcode_semantics(*op)(vm, frame)?;
        }
        Ok(flow)
    }

    #[test]
    fn arithmetic_chain() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 4);
        frame.push_int(2).unwrap();
        frame.push_int(3).unwrap();
        run(&vm, &mut frame, &[Opcode::IAdd]).unwrap();
        frame.push_int(4).unwrap();
        let flow = run(&vm, &mut frame, &[Opcode::IMul, Opcode::IReturn]).unwrap();
        assert_eq!(flow, Flow::Return(Some(Value::Int(20))));
    }

    #[test]
    fn wide_operands() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 8);
        frame.push_long(1).unwrap();
        frame.push_int(40).unwrap();
        run(&vm, &mut frame, &[Opcode::LShl]).unwrap();
        frame.push_long(1 << 40).unwrap();
        run(&vm, &mut frame, &[Opcode::LCmp]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 0);

        frame.push_double(1.5).unwrap();
        run(&vm, &mut frame, &[Opcode::Dup2, Opcode::DAdd, Opcode::D2I]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 3);
    }

    #[test]
    fn stack_shuffles() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 8);
        frame.push_int(1).unwrap();
        frame.push_int(2).unwrap();
        run(&vm, &mut frame, &[Opcode::DupX1]).unwrap();
        assert_eq!(frame.pop_slots(3).unwrap(), vec![Value::Int(2), Value::Int(1), Value::Int(2)]);

        frame.push_long(9).unwrap();
        frame.push_int(1).unwrap();
        run(&vm, &mut frame, &[Opcode::DupX2]).unwrap();
        assert_eq!(
            frame.pop_slots(4).unwrap(),
            vec![Value::Int(1), Value::Long(9), Value::Top, Value::Int(1)]
        );

        frame.push_int(1).unwrap();
        frame.push_int(2).unwrap();
        run(&vm, &mut frame, &[Opcode::Swap, Opcode::ISub]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 1);
    }

    #[test]
    fn narrowing_conversions() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 2);
        frame.push_int(0x1ff).unwrap();
        run(&vm, &mut frame, &[Opcode::I2B]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), -1);
        frame.push_int(-1).unwrap();
        run(&vm, &mut frame, &[Opcode::I2C]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 0xffff);
        frame.push_float(f32::NAN).unwrap();
        run(&vm, &mut frame, &[Opcode::F2I]).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 0);
    }

    #[test]
    fn division_by_zero_throws() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 2);
        frame.push_int(1).unwrap();
        frame.push_int(0).unwrap();
        let error = run(&vm, &mut frame, &[Opcode::IRem]).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/ArithmeticException"
        );
    }

    #[test]
    fn jumps_and_locals() {
        let mut frame = Frame::new(3, 4);
        frame.push_int(3).unwrap();
        frame.push_int(5).unwrap();
        assert!(jump_test(JumpKind::IfICmpLt)(&mut frame).unwrap());
        frame.push(Value::Null).unwrap();
        assert!(jump_test(JumpKind::IfNull)(&mut frame).unwrap());
        frame.push(Value::Null).unwrap();
        frame.push(Value::Null).unwrap();
        assert!(!jump_test(JumpKind::IfACmpNe)(&mut frame).unwrap());

        frame.push_long(5).unwrap();
        store_local(&mut frame, LocalKind::Long, 0).unwrap();
        load_local(&mut frame, LocalKind::Long, 0).unwrap();
        assert_eq!(frame.pop_long().unwrap(), 5);
        assert!(load_local(&mut frame, LocalKind::Int, 0).is_err());

        frame.push_int(1).unwrap();
        store_local(&mut frame, LocalKind::Int, 2).unwrap();
        increment_local(&mut frame, 2, -3).unwrap();
        assert_eq!(frame.load(2).unwrap(), Value::Int(-2));
    }

    #[test]
    fn table_cases() {
        assert_eq!(table_case(5, 3, 6), Some(2));
        assert_eq!(table_case(7, 3, 6), None);
        assert_eq!(table_case(i32::MAX, i32::MIN, i32::MAX), Some(u32::MAX as usize));
    }
}
