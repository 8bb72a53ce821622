use std::{collections::HashMap, sync::Arc};

use crate::{AccessFlags, Constant, Fault, FieldDefinition, FieldType};

/// A linked field: where it lives and how it is read.
#[derive(Debug)]
pub struct JavaField {
    owner: String,
    name: String,
    desc: String,
    ty: FieldType,
    access: AccessFlags,
    slot: usize,
    offset: usize,
    constant: Option<Constant>,
}

impl JavaField {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// byte offset inside the object (or the mirror, for statics)
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn constant(&self) -> Option<&Constant> {
        self.constant.as_ref()
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    pub fn is_volatile(&self) -> bool {
        self.access.contains(AccessFlags::VOLATILE)
    }
}

/// Immutable `(name, desc) -> field` map plus the occupied span.
///
/// A virtual layout lists the inherited fields first, so a subclass layout
/// is always a suffix extension of its superclass layout.
#[derive(Debug, Default)]
pub struct Layout {
    fields: Vec<Arc<JavaField>>,
    index: HashMap<(String, String), usize, ahash::RandomState>,
    base: usize,
    size: usize,
}

impl Layout {
    /// Appends `declared` after `inherited` (or after `base` when there is
    /// nothing to inherit). Fields are packed: each starts where the
    /// previous one ends.
    pub fn build<'a>(
        owner: &str,
        base: usize,
        first_slot: usize,
        inherited: Option<&Layout>,
        declared: impl IntoIterator<Item = &'a FieldDefinition>,
    ) -> Result<Self, Fault> {
        let mut layout = match inherited {
            Some(parent) => Self {
                fields: parent.fields.clone(),
                index: parent.index.clone(),
                base: parent.base,
                size: parent.size.max(base),
            },
            None => Self {
                base,
                size: base,
                ..Self::default()
            },
        };
        let mut slot = first_slot + layout.fields.len();
        for definition in declared {
            let ty = FieldType::parse(&definition.desc)?;
            let width = ty.size();
            let offset = layout.size;
            layout.size = offset + width;
            layout.index.insert(
                (definition.name.clone(), definition.desc.clone()),
                layout.fields.len(),
            );
            layout.fields.push(Arc::new(JavaField {
                owner: owner.to_owned(),
                name: definition.name.clone(),
                desc: definition.desc.clone(),
                ty,
                access: definition.access,
                slot,
                offset,
                constant: definition.constant.clone(),
            }));
            slot += 1;
        }
        Ok(layout)
    }

    /// most derived field with this name and descriptor
    pub fn lookup(&self, name: &str, desc: &str) -> Option<&Arc<JavaField>> {
        let index = self.index.get(&(name.to_owned(), desc.to_owned()))?;
        self.fields.get(*index)
    }

    pub fn fields(&self) -> &[Arc<JavaField>] {
        &self.fields
    }

    /// fields declared by `owner` itself
    pub fn declared_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Arc<JavaField>> {
        self.fields.iter().filter(move |field| field.owner == owner)
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// end of the last field, including the base
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
