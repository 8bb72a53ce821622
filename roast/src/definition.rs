use std::{collections::HashMap, fmt, sync::Arc};

use bitflags::bitflags;

use crate::{Constant, Fault, Insn, Label, TryCatchBlock, VM, Value, VmResult};

bitflags! {
    /// Class, field and method modifiers. Some bits mean different things
    /// depending on what they are attached to.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

/// Host function standing in for a method body. Instance methods receive
/// the receiver as the first argument.
pub type NativeMethod = Arc<dyn Fn(&VM, &[Value]) -> VmResult<Option<Value>> + Send + Sync>;

/// Bytecode body of a method with its label index precomputed.
#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub insns: Vec<Insn>,
    pub handlers: Vec<TryCatchBlock>,
    labels: HashMap<Label, usize, ahash::RandomState>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, insns: Vec<Insn>) -> Self {
        let labels = insns
            .iter()
            .enumerate()
            .filter_map(|(index, insn)| match insn {
                Insn::Label(label) => Some((*label, index)),
                _ => None,
            })
            .collect();
        Self {
            max_stack,
            max_locals,
            insns,
            handlers: Vec::new(),
            labels,
        }
    }

    pub fn with_handler(mut self, handler: TryCatchBlock) -> Self {
        self.handlers.push(handler);
        self
    }

    /// instruction index of `label`
    pub fn target(&self, label: Label) -> Result<usize, Fault> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(Fault::UndefinedLabel(label))
    }
}

#[derive(Clone)]
pub enum MethodBody {
    Code(Code),
    Native(NativeMethod),
    Abstract,
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => f.debug_tuple("Code").field(&code.insns.len()).finish(),
            Self::Native(_) => f.write_str("Native"),
            Self::Abstract => f.write_str("Abstract"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub desc: String,
    pub access: AccessFlags,
    /// `ConstantValue` attribute, only honoured on static fields
    pub constant: Option<Constant>,
}

impl FieldDefinition {
    pub fn new(name: &str, desc: &str, access: AccessFlags) -> Self {
        Self {
            name: name.to_owned(),
            desc: desc.to_owned(),
            access,
            constant: None,
        }
    }

    pub fn with_constant(mut self, constant: Constant) -> Self {
        self.constant = Some(constant);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub name: String,
    pub desc: String,
    pub access: AccessFlags,
    pub body: MethodBody,
}

impl MethodDefinition {
    pub fn code(name: &str, desc: &str, access: AccessFlags, code: Code) -> Self {
        Self {
            name: name.to_owned(),
            desc: desc.to_owned(),
            access,
            body: MethodBody::Code(code),
        }
    }

    pub fn native(
        name: &str,
        desc: &str,
        access: AccessFlags,
        function: impl Fn(&VM, &[Value]) -> VmResult<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_owned(),
            desc: desc.to_owned(),
            access: access | AccessFlags::NATIVE,
            body: MethodBody::Native(Arc::new(function)),
        }
    }

    pub fn abstract_method(name: &str, desc: &str, access: AccessFlags) -> Self {
        Self {
            name: name.to_owned(),
            desc: desc.to_owned(),
            access: access | AccessFlags::ABSTRACT,
            body: MethodBody::Abstract,
        }
    }
}

/// An already parsed class, ready to be defined in a VM.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access: AccessFlags,
    pub fields: Vec<FieldDefinition>,
    pub methods: Vec<MethodDefinition>,
}

impl ClassDefinition {
    /// public class extending `java/lang/Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            super_name: Some("java/lang/Object".to_owned()),
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        Self {
            access: AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
            ..Self::new(name)
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_owned());
        self
    }

    /// only `java/lang/Object` has no supertype
    pub fn root(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_owned());
        self
    }

    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }
}
