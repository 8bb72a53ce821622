use std::sync::Arc;

use log::{debug, trace};

use crate::{AccessFlags, JavaClass, Layout, OBJECT_HEADER_SIZE, ObjectKind, VM, VmResult};

impl VM {
    /// Resolves supertypes (linking them first), then computes the
    /// instance layout, the static layout and the metaclass object.
    /// Linking an already linked class does nothing.
    pub fn link(&self, class: &Arc<JavaClass>) -> VmResult<()> {
        if class.is_linked() {
            return Ok(());
        }
        let _guard = self.inner.link_lock.lock();
        if class.is_linked() {
            return Ok(());
        }
        if !class.enter_linking() {
            return Err(self.throw_new("java/lang/ClassCircularityError", Some(class.name())));
        }
        let result = self.link_locked(class);
        class.leave_linking();
        result
    }

    fn link_locked(&self, class: &Arc<JavaClass>) -> VmResult<()> {
        trace!("linking {}", class.name());
        let superclass = class
            .super_name()
            .map(|name| self.load_class(name))
            .transpose()?;
        if let Some(parent) = superclass.as_ref().filter(|parent| parent.is_interface()) {
            return Err(self.throw_new(
                "java/lang/IncompatibleClassChangeError",
                Some(&format!("{} extends interface {}", class.name(), parent.name())),
            ));
        }
        let interfaces = class
            .interface_names()
            .iter()
            .map(|name| self.load_class(name))
            .collect::<VmResult<Vec<_>>>()?;

        let inherited = superclass
            .as_ref()
            .map(|parent| parent.instance_layout())
            .transpose()?;
        let layout = Layout::build(
            class.name(),
            OBJECT_HEADER_SIZE,
            0,
            inherited,
            class
                .field_definitions()
                .iter()
                .filter(|field| !field.access.contains(AccessFlags::STATIC)),
        )?;
        debug!(
            "linked {}: {} fields, {} bytes",
            class.name(),
            layout.len(),
            layout.size()
        );
        class.set_supertypes(superclass, interfaces);
        class.set_instance_layout(layout);
        self.complete_statics(class)
    }

    /// Statics live in the metaclass object after `java/lang/Class`'s own
    /// fields, so they wait until that class is linked.
    fn complete_statics(&self, class: &Arc<JavaClass>) -> VmResult<()> {
        let metaclass = self
            .inner
            .loader
            .find("java/lang/Class")
            .filter(|metaclass| metaclass.is_linked());
        let Some(metaclass) = metaclass else {
            trace!("deferring statics of {}", class.name());
            self.inner.deferred_statics.lock().push(class.clone());
            return Ok(());
        };
        self.build_statics(class, &metaclass)?;
        if Arc::ptr_eq(class, &metaclass) {
            let deferred = std::mem::take(&mut *self.inner.deferred_statics.lock());
            for class in deferred {
                self.build_statics(&class, &metaclass)?;
            }
        }
        Ok(())
    }

    fn build_statics(&self, class: &Arc<JavaClass>, metaclass: &Arc<JavaClass>) -> VmResult<()> {
        if class.has_static_layout() {
            return Ok(());
        }
        let statics = Layout::build(
            class.name(),
            metaclass.instance_size()?,
            class.instance_layout()?.len(),
            None,
            class
                .field_definitions()
                .iter()
                .filter(|field| field.access.contains(AccessFlags::STATIC)),
        )?;
        let size = statics.size();
        class.set_static_layout(statics);
        let mirror = self.allocate_object(
            metaclass.clone(),
            size,
            ObjectKind::Mirror(Arc::downgrade(class)),
        )?;
        class.set_mirror(mirror);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AccessFlags, ClassDefinition, FieldDefinition, testing::test_vm,
    };

    #[test]
    fn subclass_layout_extends_superclass() {
        let vm = test_vm();
        vm.define_class(
            ClassDefinition::new("demo/Base")
                .field(FieldDefinition::new("a", "I", AccessFlags::PRIVATE))
                .field(FieldDefinition::new("b", "B", AccessFlags::PRIVATE))
                .field(FieldDefinition::new("count", "J", AccessFlags::STATIC)),
        )
        .unwrap();
        vm.define_class(
            ClassDefinition::new("demo/Derived")
                .extends("demo/Base")
                .field(FieldDefinition::new("c", "D", AccessFlags::PRIVATE))
                .field(FieldDefinition::new("d", "Ljava/lang/Object;", AccessFlags::PRIVATE)),
        )
        .unwrap();
        let derived = vm.load_class("demo/Derived").unwrap();
        let base = derived.superclass().unwrap().clone();
        assert_eq!(base.name(), "demo/Base");

        let base_layout = base.instance_layout().unwrap();
        let layout = derived.instance_layout().unwrap();
        assert_eq!(base_layout.len(), 2);
        assert_eq!(layout.len(), 4);
        let mut last_end = 0;
        for field in layout.fields() {
            assert!(field.offset() >= last_end);
            last_end = field.offset() + field.ty().size();
        }
        for own in layout.declared_by("demo/Derived") {
            assert!(own.offset() >= base_layout.size());
        }
        assert!(layout.fields()[0].offset() >= crate::OBJECT_HEADER_SIZE);

        let statics = base.static_layout().unwrap();
        assert_eq!(statics.len(), 1);
        let count = &statics.fields()[0];
        assert_eq!(count.slot(), 2);
        let metaclass = vm.load_class("java/lang/Class").unwrap();
        assert!(count.offset() >= metaclass.instance_size().unwrap());
        assert!(base.mirror().unwrap().data().length() >= count.offset() + 8);
    }

    #[test]
    fn circular_hierarchy_is_rejected() {
        let vm = test_vm();
        vm.define_class(ClassDefinition::new("demo/A").extends("demo/B"))
            .unwrap();
        vm.define_class(ClassDefinition::new("demo/B").extends("demo/A"))
            .unwrap();
        let error = vm.load_class("demo/A").unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/ClassCircularityError"
        );
        assert!(!vm.loader().find("demo/A").unwrap().is_linked());
    }

    #[test]
    fn missing_superclass_fails_linking() {
        let vm = test_vm();
        vm.define_class(ClassDefinition::new("demo/Orphan").extends("demo/Nowhere"))
            .unwrap();
        let error = vm.load_class("demo/Orphan").unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/NoClassDefFoundError"
        );
    }
}
