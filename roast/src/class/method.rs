use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    AccessFlags, Code, Frame, HandleKind, Insn, JavaClass, MethodBody, MethodDefinition,
    MethodDescriptor, NativeMethod, ObjectRef, VM, Value, VmResult,
};

/// Translated, directly invocable form of a method.
pub trait CompiledCode: Send + Sync {
    fn execute(&self, vm: &VM, frame: Frame) -> VmResult<Option<Value>>;
}

/// The body a call runs. Snapshotted at call entry, so a swap never
/// affects calls already running.
#[derive(Clone)]
pub enum Implementation {
    Interpreted(Arc<Code>),
    Native(NativeMethod),
    Compiled(Arc<dyn CompiledCode>),
    Abstract,
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interpreted(_) => "Interpreted",
            Self::Native(_) => "Native",
            Self::Compiled(_) => "Compiled",
            Self::Abstract => "Abstract",
        })
    }
}

/// Lazily linked `invokedynamic` site.
#[derive(Debug, Default)]
pub struct CallSite {
    lock: Mutex<()>,
    target: OnceLock<ObjectRef>,
}

impl CallSite {
    pub fn target(&self) -> Option<&ObjectRef> {
        self.target.get()
    }

    /// Runs `link` at most once across threads; later callers get the
    /// published handle.
    pub fn link_with(&self, link: impl FnOnce() -> VmResult<ObjectRef>) -> VmResult<ObjectRef> {
        if let Some(target) = self.target.get() {
            return Ok(target.clone());
        }
        let _guard = self.lock.lock();
        if let Some(target) = self.target.get() {
            return Ok(target.clone());
        }
        let target = link()?;
        let _ = self.target.set(target.clone());
        Ok(target)
    }
}

pub struct JavaMethod {
    owner: Weak<JavaClass>,
    owner_name: String,
    name: String,
    desc: String,
    descriptor: MethodDescriptor,
    access: AccessFlags,
    slot: usize,
    code: Option<Arc<Code>>,
    implementation: RwLock<Implementation>,
    translated: AtomicBool,
    rejected: AtomicBool,
    invocations: AtomicU64,
    call_sites: HashMap<usize, CallSite, ahash::RandomState>,
}

impl JavaMethod {
    pub(crate) fn new(
        owner: Weak<JavaClass>,
        owner_name: &str,
        slot: usize,
        definition: MethodDefinition,
        descriptor: MethodDescriptor,
    ) -> Self {
        let (code, implementation) = match definition.body {
            MethodBody::Code(code) => {
                let code = Arc::new(code);
                (Some(code.clone()), Implementation::Interpreted(code))
            }
            MethodBody::Native(function) => (None, Implementation::Native(function)),
            MethodBody::Abstract => (None, Implementation::Abstract),
        };
        let call_sites = code
            .iter()
            .flat_map(|code| code.insns.iter().enumerate())
            .filter(|(_, insn)| matches!(insn, Insn::InvokeDynamic { .. }))
            .map(|(index, _)| (index, CallSite::default()))
            .collect();
        Self {
            owner,
            owner_name: owner_name.to_owned(),
            name: definition.name,
            desc: definition.desc,
            descriptor,
            access: definition.access,
            slot,
            code,
            implementation: RwLock::new(implementation),
            translated: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
            invocations: AtomicU64::new(0),
            call_sites,
        }
    }

    /// `None` only while the owning class is being torn down
    pub fn owner(&self) -> Option<Arc<JavaClass>> {
        self.owner.upgrade()
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// `owner.name desc`, used in logs and to match compiled units
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.owner_name, self.name, self.desc)
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_synchronized(&self) -> bool {
        self.access.contains(AccessFlags::SYNCHRONIZED)
    }

    pub fn is_initializer(&self) -> bool {
        self.name == "<init>"
    }

    /// argument slots including the receiver
    pub fn parameter_slots(&self) -> usize {
        self.descriptor.arg_slots() + usize::from(!self.is_static())
    }

    /// original bytecode, kept after translation
    pub fn code(&self) -> Option<&Arc<Code>> {
        self.code.as_ref()
    }

    pub fn call_site(&self, index: usize) -> Option<&CallSite> {
        self.call_sites.get(&index)
    }

    pub fn implementation(&self) -> Implementation {
        self.implementation.read().clone()
    }

    pub fn is_translated(&self) -> bool {
        self.translated.load(Ordering::Acquire)
    }

    /// Swaps the active implementation. Calls that already took their
    /// snapshot finish on the old one.
    pub(crate) fn install(&self, compiled: Arc<dyn CompiledCode>) {
        *self.implementation.write() = Implementation::Compiled(compiled);
        self.translated.store(true, Ordering::Release);
    }

    pub(crate) fn mark_rejected(&self) {
        self.rejected.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_rejected(&self) -> bool {
        self.rejected.load(Ordering::Relaxed)
    }

    /// bumps the invocation counter, returning the new count
    pub(crate) fn record_invocation(&self) -> u64 {
        self.invocations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for JavaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JavaMethod")
            .field("name", &self.qualified_name())
            .field("access", &self.access)
            .field("slot", &self.slot)
            .field("translated", &self.is_translated())
            .finish()
    }
}

/// Payload of a `java/lang/invoke/MethodHandle` object.
#[derive(Debug, Clone)]
pub struct MethodHandle {
    pub kind: HandleKind,
    pub method: Arc<JavaMethod>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Label, Opcode};

    fn method(definition: MethodDefinition) -> JavaMethod {
        let descriptor = MethodDescriptor::parse(&definition.desc).unwrap();
        JavaMethod::new(Weak::new(), "demo/A", 0, definition, descriptor)
    }

    #[test]
    fn parameter_slots_count_receiver_and_wide_args() {
        let virtual_method = method(MethodDefinition::abstract_method(
            "f",
            "(JI)V",
            AccessFlags::PUBLIC,
        ));
        assert_eq!(virtual_method.parameter_slots(), 4);
        let static_method = method(MethodDefinition::abstract_method(
            "g",
            "(D)V",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
        ));
        assert_eq!(static_method.parameter_slots(), 2);
        assert_eq!(static_method.qualified_name(), "demo/A.g(D)V");
    }

    #[test]
    fn call_sites_are_indexed_by_instruction() {
        let code = Code::new(
            2,
            0,
            vec![
                Insn::Label(Label(0)),
                Insn::InvokeDynamic {
                    name: "run".into(),
                    desc: "()V".into(),
                    bootstrap: crate::HandleRef::new(
                        HandleKind::InvokeStatic,
                        "demo/A",
                        "bsm",
                        "(Ljava/lang/String;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/MethodHandle;",
                    ),
                    args: vec![],
                },
                Insn::Op(Opcode::Return),
            ],
        );
        let method = method(MethodDefinition::code(
            "m",
            "()V",
            AccessFlags::STATIC,
            code,
        ));
        assert!(method.call_site(1).is_some());
        assert!(method.call_site(0).is_none());
        assert!(matches!(method.implementation(), Implementation::Interpreted(_)));
    }

    #[test]
    fn invocation_counter() {
        let method = method(MethodDefinition::abstract_method("f", "()V", AccessFlags::PUBLIC));
        assert_eq!(method.record_invocation(), 1);
        assert_eq!(method.record_invocation(), 2);
        assert_eq!(method.invocations(), 2);
        assert!(!method.is_translated());
    }
}
