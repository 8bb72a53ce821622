use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::RwLock;

use crate::{ClassDefinition, Fault, JavaClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(pub u32);

impl LoaderId {
    pub const BOOTSTRAP: Self = Self(0);
}

/// Name to class registry of one loader.
#[derive(Debug)]
pub struct ClassLoader {
    id: LoaderId,
    classes: RwLock<HashMap<String, Arc<JavaClass>, ahash::RandomState>>,
}

impl ClassLoader {
    pub fn new(id: LoaderId) -> Self {
        Self {
            id,
            classes: RwLock::new(HashMap::default()),
        }
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// Registers an unlinked class built from `definition`.
    pub fn define(&self, definition: ClassDefinition) -> Result<Arc<JavaClass>, Fault> {
        let mut classes = self.classes.write();
        if classes.contains_key(&definition.name) {
            return Err(Fault::DuplicateClass(definition.name));
        }
        let class = JavaClass::from_definition(definition, self.id)?;
        debug!("defined class {}", class.name());
        classes.insert(class.name().to_owned(), class.clone());
        Ok(class)
    }

    pub fn find(&self, name: &str) -> Option<Arc<JavaClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Registers a VM-created class (array or primitive). When another
    /// thread got there first its class wins.
    pub fn register(&self, class: Arc<JavaClass>) -> Arc<JavaClass> {
        self.classes
            .write()
            .entry(class.name().to_owned())
            .or_insert(class)
            .clone()
    }

    pub fn classes(&self) -> Vec<Arc<JavaClass>> {
        self.classes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldType;

    #[test]
    fn define_rejects_duplicates() {
        let loader = ClassLoader::new(LoaderId::BOOTSTRAP);
        let class = loader.define(ClassDefinition::new("demo/A")).unwrap();
        assert_eq!(class.loader(), LoaderId::BOOTSTRAP);
        assert!(!class.is_linked());
        assert!(matches!(
            loader.define(ClassDefinition::new("demo/A")),
            Err(Fault::DuplicateClass(name)) if name == "demo/A"
        ));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn first_registration_wins() {
        let loader = ClassLoader::new(LoaderId(3));
        let first = loader.register(JavaClass::new_primitive(Some(FieldType::Int), loader.id()));
        let second = loader.register(JavaClass::new_primitive(Some(FieldType::Int), loader.id()));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.find("int").unwrap().descriptor(), "I");
    }

    #[test]
    fn bad_method_descriptor_is_a_fault() {
        let loader = ClassLoader::new(LoaderId::BOOTSTRAP);
        let definition = ClassDefinition::new("demo/B").method(
            crate::MethodDefinition::abstract_method("f", "(X)V", crate::AccessFlags::PUBLIC),
        );
        assert!(matches!(
            loader.define(definition),
            Err(Fault::MalformedDescriptor(_))
        ));
        assert!(loader.find("demo/B").is_none());
    }
}
