use std::sync::Arc;

use crate::{JavaClass, JavaField, JavaMethod};

/// Call-time lookup of members against a linked hierarchy.
pub trait LinkResolver: Send + Sync {
    /// own fields, then superinterfaces, then the superclass chain
    fn resolve_field(&self, class: &JavaClass, name: &str, desc: &str) -> Option<Arc<JavaField>>;

    /// superclass chain first, then superinterfaces
    fn resolve_method(&self, class: &JavaClass, name: &str, desc: &str)
    -> Option<Arc<JavaMethod>>;

    /// Picks the implementation a virtual or interface call on `receiver`
    /// runs. Abstract results are returned as is.
    fn select_virtual(
        &self,
        receiver: &JavaClass,
        name: &str,
        desc: &str,
    ) -> Option<Arc<JavaMethod>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchyResolver;

impl HierarchyResolver {
    fn interface_field(class: &JavaClass, name: &str, desc: &str) -> Option<Arc<JavaField>> {
        class.interfaces().iter().find_map(|iface| {
            iface
                .declared_field(name, desc)
                .cloned()
                .or_else(|| Self::interface_field(iface, name, desc))
        })
    }

    /// Depth-first over superinterfaces. A concrete (default) method wins
    /// over an abstract declaration.
    fn interface_method(class: &JavaClass, name: &str, desc: &str) -> Option<Arc<JavaMethod>> {
        let mut abstract_match = None;
        for iface in class.interfaces() {
            let found = iface
                .declared_method(name, desc)
                .filter(|method| !method.is_static())
                .cloned()
                .or_else(|| Self::interface_method(iface, name, desc));
            match found {
                Some(method) if !method.is_abstract() => return Some(method),
                Some(method) => abstract_match = abstract_match.or(Some(method)),
                None => {}
            }
        }
        abstract_match
    }
}

impl LinkResolver for HierarchyResolver {
    fn resolve_field(&self, class: &JavaClass, name: &str, desc: &str) -> Option<Arc<JavaField>> {
        class.ancestors().find_map(|class| {
            class
                .declared_field(name, desc)
                .cloned()
                .or_else(|| Self::interface_field(class, name, desc))
        })
    }

    fn resolve_method(
        &self,
        class: &JavaClass,
        name: &str,
        desc: &str,
    ) -> Option<Arc<JavaMethod>> {
        class
            .ancestors()
            .find_map(|class| class.declared_method(name, desc).cloned())
            .or_else(|| {
                class
                    .ancestors()
                    .find_map(|class| Self::interface_method(class, name, desc))
            })
    }

    fn select_virtual(
        &self,
        receiver: &JavaClass,
        name: &str,
        desc: &str,
    ) -> Option<Arc<JavaMethod>> {
        let declared = receiver.ancestors().find_map(|class| {
            class
                .declared_method(name, desc)
                .filter(|method| !method.is_static())
                .cloned()
        });
        match declared {
            Some(method) if !method.is_abstract() => Some(method),
            declared => receiver
                .ancestors()
                .find_map(|class| Self::interface_method(class, name, desc))
                .filter(|method| !method.is_abstract())
                .or(declared),
        }
    }
}
