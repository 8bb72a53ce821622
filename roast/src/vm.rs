mod heap;
mod init;
mod link;

use std::{collections::HashMap, fmt, sync::Arc};

use log::info;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::{
    BumpArena, ClassDefinition, ClassLoader, Fault, FieldType, HierarchyResolver, JavaClass,
    LinkResolver, LoaderId, MemoryAllocator, MonitorTable, ObjectRef, RandomProbe,
    SimpleMemoryAllocator, Synchronizer, SynchronizedMemoryAllocator, VmResult, bootstrap,
};

/// Address selection policy of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    RandomProbe,
    Bump,
}

/// Optional overrides, folded into [`VMSettings`] defaults.
#[derive(Default)]
pub struct VMCreateInfo {
    pub strategy: Option<StrategyKind>,
    /// seeds the random probe, for reproducible addresses
    pub seed: Option<u64>,
    /// operand stack capacity of frames whose code does not declare one
    pub operand_stack: Option<usize>,
    pub max_call_depth: Option<usize>,
    /// translate methods automatically once they were invoked this often
    pub translate_after: Option<u64>,
    pub resolver: Option<Box<dyn LinkResolver>>,
    pub synchronizer: Option<Box<dyn Synchronizer>>,
}

#[derive(Debug, Clone)]
pub struct VMSettings {
    pub strategy: StrategyKind,
    pub seed: Option<u64>,
    pub operand_stack: usize,
    pub max_call_depth: usize,
    pub translate_after: Option<u64>,
}

impl Default for VMSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::RandomProbe,
            seed: None,
            operand_stack: 16,
            max_call_depth: 512,
            translate_after: None,
        }
    }
}

pub struct VMShared {
    settings: VMSettings,
    allocator: SynchronizedMemoryAllocator<SimpleMemoryAllocator>,
    /// every object ever allocated, by address; never shrinks since
    /// nothing is collected
    objects: RwLock<HashMap<u64, ObjectRef, ahash::RandomState>>,
    loader: ClassLoader,
    link_lock: ReentrantMutex<()>,
    /// classes linked before `java/lang/Class`, waiting for their mirror
    deferred_statics: Mutex<Vec<Arc<JavaClass>>>,
    strings: Mutex<HashMap<String, ObjectRef, ahash::RandomState>>,
    resolver: Box<dyn LinkResolver>,
    synchronizer: Box<dyn Synchronizer>,
}

/// The facade every operation trait is implemented on. Cheap to clone
/// and share between threads.
#[derive(Clone)]
pub struct VM {
    inner: Arc<VMShared>,
}

impl VM {
    pub fn new(info: VMCreateInfo) -> Result<Self, Fault> {
        let mut settings = VMSettings::default();
        info.strategy.inspect(|&val| settings.strategy = val);
        settings.seed = info.seed;
        info.operand_stack
            .inspect(|&val| settings.operand_stack = val);
        info.max_call_depth
            .inspect(|&val| settings.max_call_depth = val);
        settings.translate_after = info.translate_after;

        let strategy: Box<dyn crate::AllocationStrategy> =
            match (settings.strategy, settings.seed) {
                (StrategyKind::RandomProbe, Some(seed)) => Box::new(RandomProbe::seeded(seed)),
                (StrategyKind::RandomProbe, None) => Box::new(RandomProbe::new()),
                (StrategyKind::Bump, _) => Box::new(BumpArena::default()),
            };

        let inner = VMShared {
            allocator: SynchronizedMemoryAllocator::new(SimpleMemoryAllocator::new(strategy)),
            objects: RwLock::new(HashMap::default()),
            loader: ClassLoader::new(LoaderId::BOOTSTRAP),
            link_lock: ReentrantMutex::new(()),
            deferred_statics: Mutex::new(Vec::new()),
            strings: Mutex::new(HashMap::default()),
            resolver: info
                .resolver
                .unwrap_or_else(|| Box::new(HierarchyResolver)),
            synchronizer: info
                .synchronizer
                .unwrap_or_else(|| Box::new(MonitorTable::new())),
            settings,
        };
        let vm = Self {
            inner: Arc::new(inner),
        };
        vm.bootstrap()?;
        info!(
            "vm ready: {} bootstrap classes, {:?} addresses",
            vm.inner.loader.len(),
            vm.inner.settings.strategy
        );
        Ok(vm)
    }

    fn bootstrap(&self) -> Result<(), Fault> {
        for ty in bootstrap::PRIMITIVES {
            self.inner
                .loader
                .register(JavaClass::new_primitive(ty, self.inner.loader.id()));
        }
        for definition in bootstrap::core_classes() {
            self.inner.loader.define(definition)?;
        }
        // Object and Class first, everything else can get its mirror
        // right away after that
        for name in bootstrap::CORE_CLASS_NAMES {
            let class = self
                .inner
                .loader
                .find(name)
                .ok_or(Fault::MissingBootstrapType(name))?;
            self.link(&class).map_err(|error| match error {
                crate::VmError::Fault(fault) => fault,
                crate::VmError::Thrown(_) => Fault::NotLinked(name.to_owned()),
            })?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &VMSettings {
        &self.inner.settings
    }

    pub fn allocator(&self) -> &impl MemoryAllocator {
        &self.inner.allocator
    }

    pub fn resolver(&self) -> &dyn LinkResolver {
        self.inner.resolver.as_ref()
    }

    pub fn synchronizer(&self) -> &dyn Synchronizer {
        self.inner.synchronizer.as_ref()
    }

    pub fn loader(&self) -> &ClassLoader {
        &self.inner.loader
    }

    /// Registers a class. It is linked the first time it is loaded.
    pub fn define_class(&self, definition: ClassDefinition) -> Result<Arc<JavaClass>, Fault> {
        self.inner.loader.define(definition)
    }

    /// Finds (creating array classes on demand) and links a class.
    /// Unknown names throw `java/lang/NoClassDefFoundError`.
    pub fn load_class(&self, name: &str) -> VmResult<Arc<JavaClass>> {
        let class = match self.inner.loader.find(name) {
            Some(class) => class,
            None if name.starts_with('[') => self.create_array_class(name)?,
            None => return Err(self.throw_new("java/lang/NoClassDefFoundError", Some(name))),
        };
        self.link(&class)?;
        Ok(class)
    }

    fn create_array_class(&self, name: &str) -> VmResult<Arc<JavaClass>> {
        let ty = FieldType::from_internal_name(name)?;
        let Some(element) = ty.component() else {
            return Err(Fault::MalformedDescriptor(name.to_owned()).into());
        };
        let component = self.load_class(&element.internal_name())?;
        let interfaces = bootstrap::ARRAY_INTERFACES
            .iter()
            .filter(|iface| self.inner.loader.find(iface).is_some())
            .map(|iface| iface.to_string())
            .collect();
        let class = JavaClass::new_array(
            element.clone(),
            component,
            interfaces,
            self.inner.loader.id(),
        );
        Ok(self.inner.loader.register(class))
    }

    /// a bootstrap class, always defined and linked
    pub(crate) fn core_class(&self, name: &'static str) -> Result<Arc<JavaClass>, Fault> {
        self.inner
            .loader
            .find(name)
            .filter(|class| class.is_linked())
            .ok_or(Fault::MissingBootstrapType(name))
    }
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("settings", &self.inner.settings)
            .field("classes", &self.inner.loader.len())
            .field("objects", &self.inner.objects.read().len())
            .finish()
    }
}
