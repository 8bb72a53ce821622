use std::fmt;

use crate::FieldType;

/// Branch target. Placed in the instruction list with [`Insn::Label`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Every instruction that takes no inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    AconstNull,

    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    IShl,
    LShl,
    IShr,
    LShr,
    IUShr,
    LUShr,
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,

    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,

    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    ArrayLength,

    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,

    AThrow,
    MonitorEnter,
    MonitorExit,
}

impl Opcode {
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Self::IReturn
                | Self::LReturn
                | Self::FReturn
                | Self::DReturn
                | Self::AReturn
                | Self::Return
        )
    }
}

/// Slot kind of a local variable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl LocalKind {
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    IfNull,
    IfNonNull,
    Goto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

impl FieldOp {
    pub fn is_static(self) -> bool {
        matches!(self, Self::GetStatic | Self::PutStatic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
}

/// Reference kinds a method handle constant may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    InvokeStatic,
    InvokeVirtual,
    InvokeSpecial,
    InvokeInterface,
    NewInvokeSpecial,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleRef {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl HandleRef {
    pub fn new(kind: HandleKind, owner: &str, name: &str, desc: &str) -> Self {
        Self {
            kind,
            owner: owner.to_owned(),
            name: name.to_owned(),
            desc: desc.to_owned(),
        }
    }
}

/// Loadable constants (`ldc`, `ConstantValue`, bootstrap arguments).
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// internal name or array descriptor
    Type(String),
    MethodType(String),
    MethodHandle(HandleRef),
}

impl Constant {
    /// folds to a plain value without touching the heap
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Long(_) | Self::Float(_) | Self::Double(_)
        )
    }
}

/// Element kind of the typed array instructions. `Byte` also serves
/// boolean arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Op(Opcode),
    Label(Label),
    IntConst(i32),
    LongConst(i64),
    FloatConst(f32),
    DoubleConst(f64),
    Ldc(Constant),
    Load(LocalKind, u16),
    Store(LocalKind, u16),
    Iinc(u16, i32),
    Jump(JumpKind, Label),
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    Field {
        op: FieldOp,
        owner: String,
        name: String,
        desc: String,
    },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        desc: String,
    },
    InvokeDynamic {
        name: String,
        desc: String,
        bootstrap: HandleRef,
        args: Vec<Constant>,
    },
    New(String),
    NewArray(FieldType),
    ANewArray(String),
    MultiANewArray(String, u8),
    CheckCast(String),
    InstanceOf(String),
}

impl Insn {
    pub fn field(op: FieldOp, owner: &str, name: &str, desc: &str) -> Self {
        Self::Field {
            op,
            owner: owner.to_owned(),
            name: name.to_owned(),
            desc: desc.to_owned(),
        }
    }

    pub fn invoke(kind: InvokeKind, owner: &str, name: &str, desc: &str) -> Self {
        Self::Invoke {
            kind,
            owner: owner.to_owned(),
            name: name.to_owned(),
            desc: desc.to_owned(),
        }
    }
}

impl From<Opcode> for Insn {
    fn from(op: Opcode) -> Self {
        Self::Op(op)
    }
}

/// Exception table entry: `[start, end)` is protected, control moves to
/// `handler` when the thrown class is assignable to `catch_type`
/// (`None` catches everything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}
