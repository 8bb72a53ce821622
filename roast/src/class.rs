mod init;
mod layout;
mod method;

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

pub use init::{InitEntry, InitGuard, InitState, Initialization};
pub use layout::{JavaField, Layout};
pub use method::{CallSite, CompiledCode, Implementation, JavaMethod, MethodHandle};

use crate::{
    AccessFlags, ClassDefinition, Fault, FieldDefinition, FieldType, LoaderId, MethodDescriptor,
    ObjectRef,
};

#[derive(Debug)]
pub enum ClassKind {
    Instance,
    Array {
        component: Arc<JavaClass>,
        element: FieldType,
    },
    /// `None` is `void`
    Primitive(Option<FieldType>),
}

/// A loaded class. Linkage results are published once through set-once
/// cells; everything else is fixed at definition time.
pub struct JavaClass {
    name: String,
    descriptor: String,
    access: AccessFlags,
    kind: ClassKind,
    loader: LoaderId,
    super_name: Option<String>,
    interface_names: Vec<String>,
    fields: Vec<FieldDefinition>,
    methods: Vec<Arc<JavaMethod>>,
    method_index: HashMap<(String, String), usize, ahash::RandomState>,

    superclass: OnceLock<Option<Arc<JavaClass>>>,
    interfaces: OnceLock<Vec<Arc<JavaClass>>>,
    instance_layout: OnceLock<Layout>,
    static_layout: OnceLock<Layout>,
    mirror: OnceLock<ObjectRef>,
    linking: AtomicBool,
    init: Initialization,
}

impl JavaClass {
    pub(crate) fn from_definition(
        definition: ClassDefinition,
        loader: LoaderId,
    ) -> Result<Arc<Self>, Fault> {
        let ClassDefinition {
            name,
            super_name,
            interfaces,
            access,
            fields,
            methods,
        } = definition;
        for field in &fields {
            FieldType::parse(&field.desc)?;
        }
        let methods = methods
            .into_iter()
            .map(|method| Ok((MethodDescriptor::parse(&method.desc)?, method)))
            .collect::<Result<Vec<_>, Fault>>()?;
        let method_index = methods
            .iter()
            .enumerate()
            .map(|(slot, (_, method))| ((method.name.clone(), method.desc.clone()), slot))
            .collect();

        Ok(Arc::new_cyclic(|owner| Self {
            descriptor: format!("L{name};"),
            access,
            kind: ClassKind::Instance,
            loader,
            super_name,
            interface_names: interfaces,
            fields,
            methods: methods
                .into_iter()
                .enumerate()
                .map(|(slot, (descriptor, method))| {
                    Arc::new(JavaMethod::new(owner.clone(), &name, slot, method, descriptor))
                })
                .collect(),
            method_index,
            init: Initialization::new(),
            name,
            ..Self::linkage_cells()
        }))
    }

    pub(crate) fn new_array(
        element: FieldType,
        component: Arc<JavaClass>,
        interfaces: Vec<String>,
        loader: LoaderId,
    ) -> Arc<Self> {
        let descriptor = FieldType::Array(Box::new(element.clone())).to_string();
        Arc::new(Self {
            name: descriptor.clone(),
            descriptor,
            access: AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
            kind: ClassKind::Array { component, element },
            loader,
            super_name: Some("java/lang/Object".to_owned()),
            interface_names: interfaces,
            init: Initialization::completed(),
            ..Self::linkage_cells()
        })
    }

    pub(crate) fn new_primitive(ty: Option<FieldType>, loader: LoaderId) -> Arc<Self> {
        let (name, descriptor) = match &ty {
            Some(ty) => (ty.primitive_name().unwrap_or_default(), ty.to_string()),
            None => ("void", "V".to_owned()),
        };
        Arc::new(Self {
            name: name.to_owned(),
            descriptor,
            access: AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
            kind: ClassKind::Primitive(ty),
            loader,
            init: Initialization::completed(),
            ..Self::linkage_cells()
        })
    }

    fn linkage_cells() -> Self {
        Self {
            name: String::new(),
            descriptor: String::new(),
            access: AccessFlags::empty(),
            kind: ClassKind::Instance,
            loader: LoaderId::BOOTSTRAP,
            super_name: None,
            interface_names: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            method_index: HashMap::default(),
            superclass: OnceLock::new(),
            interfaces: OnceLock::new(),
            instance_layout: OnceLock::new(),
            static_layout: OnceLock::new(),
            mirror: OnceLock::new(),
            linking: AtomicBool::new(false),
            init: Initialization::completed(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interface_names(&self) -> &[String] {
        &self.interface_names
    }

    pub fn field_definitions(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    /// component class of an array class
    pub fn component(&self) -> Option<&Arc<JavaClass>> {
        match &self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// element type of an array class
    pub fn element_type(&self) -> Option<&FieldType> {
        match &self.kind {
            ClassKind::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn methods(&self) -> &[Arc<JavaMethod>] {
        &self.methods
    }

    pub fn declared_method(&self, name: &str, desc: &str) -> Option<&Arc<JavaMethod>> {
        let slot = self.method_index.get(&(name.to_owned(), desc.to_owned()))?;
        self.methods.get(*slot)
    }

    /// non-static or static field declared by this class itself
    pub fn declared_field(&self, name: &str, desc: &str) -> Option<&Arc<JavaField>> {
        [self.instance_layout.get(), self.static_layout.get()]
            .into_iter()
            .flatten()
            .find_map(|layout| layout.lookup(name, desc).filter(|field| field.owner() == self.name))
    }

    /// `None` for roots and for classes not linked yet
    pub fn superclass(&self) -> Option<&Arc<JavaClass>> {
        self.superclass.get().and_then(Option::as_ref)
    }

    pub fn interfaces(&self) -> &[Arc<JavaClass>] {
        self.interfaces.get().map_or(&[][..], Vec::as_slice)
    }

    pub fn is_linked(&self) -> bool {
        self.instance_layout.get().is_some()
    }

    pub fn instance_layout(&self) -> Result<&Layout, Fault> {
        self.instance_layout
            .get()
            .ok_or_else(|| Fault::NotLinked(self.name.clone()))
    }

    pub fn static_layout(&self) -> Result<&Layout, Fault> {
        self.static_layout
            .get()
            .ok_or_else(|| Fault::NotLinked(self.name.clone()))
    }

    /// bytes an instance occupies, header included
    pub fn instance_size(&self) -> Result<usize, Fault> {
        Ok(self.instance_layout()?.size())
    }

    /// metaclass object, holding the static storage
    pub fn mirror(&self) -> Result<&ObjectRef, Fault> {
        self.mirror
            .get()
            .ok_or(Fault::MissingBootstrapType("java/lang/Class"))
    }

    pub fn init(&self) -> &Initialization {
        &self.init
    }

    /// walks the superclass chain, `self` included
    pub fn ancestors(&self) -> impl Iterator<Item = &JavaClass> {
        std::iter::successors(Some(self), |class| class.superclass().map(Arc::as_ref))
    }

    pub fn is_subclass_of(&self, other: &JavaClass) -> bool {
        self.ancestors().any(|class| std::ptr::eq(class, other))
    }

    /// `other` is an interface this class or an ancestor implements,
    /// directly or through superinterfaces
    pub fn implements(&self, other: &JavaClass) -> bool {
        fn search(class: &JavaClass, target: &JavaClass) -> bool {
            class
                .interfaces()
                .iter()
                .any(|iface| std::ptr::eq(iface.as_ref(), target) || search(iface, target))
        }
        self.ancestors().any(|class| search(class, other))
    }

    pub(crate) fn set_supertypes(
        &self,
        superclass: Option<Arc<JavaClass>>,
        interfaces: Vec<Arc<JavaClass>>,
    ) {
        let _ = self.superclass.set(superclass);
        let _ = self.interfaces.set(interfaces);
    }

    pub(crate) fn set_instance_layout(&self, layout: Layout) {
        let _ = self.instance_layout.set(layout);
    }

    pub(crate) fn set_static_layout(&self, layout: Layout) {
        let _ = self.static_layout.set(layout);
    }

    pub(crate) fn has_static_layout(&self) -> bool {
        self.static_layout.get().is_some()
    }

    pub(crate) fn set_mirror(&self, mirror: ObjectRef) {
        let _ = self.mirror.set(mirror);
    }

    /// Marks the class as being linked by the current thread. `false`
    /// means it already was, i.e. the hierarchy is circular.
    pub(crate) fn enter_linking(&self) -> bool {
        !self.linking.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn leave_linking(&self) {
        self.linking.store(false, Ordering::Release);
    }
}

impl fmt::Debug for JavaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JavaClass")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("linked", &self.is_linked())
            .finish()
    }
}
