use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{FieldType, Fault, JavaClass, MemoryData, MethodDescriptor, MethodHandle};

/// Bytes reserved at the start of every object before the first field.
pub const OBJECT_HEADER_SIZE: usize = 8;
/// Offset of the `i32` length word in array storage.
pub const ARRAY_LENGTH_OFFSET: usize = 0;
/// Offset of element 0 in array storage.
pub const ARRAY_BASE_OFFSET: usize = 8;

pub type ObjectRef = Arc<Object>;

#[derive(Debug)]
pub enum ObjectKind {
    Instance,
    Array { length: usize },
    /// metaclass object of a class; also holds that class's static storage
    Mirror(Weak<JavaClass>),
    MethodType(MethodDescriptor),
    MethodHandle(MethodHandle),
}

/// A heap object: its emulated address, runtime class and raw storage.
pub struct Object {
    address: u64,
    class: Arc<JavaClass>,
    data: MemoryData,
    kind: ObjectKind,
}

impl Object {
    pub(crate) fn new(
        address: u64,
        class: Arc<JavaClass>,
        data: MemoryData,
        kind: ObjectKind,
    ) -> Self {
        Self {
            address,
            class,
            data,
            kind,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn class(&self) -> &Arc<JavaClass> {
        &self.class
    }

    pub fn data(&self) -> &MemoryData {
        &self.data
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn array_length(&self) -> Option<usize> {
        match self.kind {
            ObjectKind::Array { length } => Some(length),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array { .. })
    }

    /// class this metaclass object stands for
    pub fn mirrored_class(&self) -> Option<Arc<JavaClass>> {
        match &self.kind {
            ObjectKind::Mirror(class) => class.upgrade(),
            _ => None,
        }
    }

    pub fn method_handle(&self) -> Option<&MethodHandle> {
        match &self.kind {
            ObjectKind::MethodHandle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn method_type(&self) -> Option<&MethodDescriptor> {
        match &self.kind {
            ObjectKind::MethodType(desc) => Some(desc),
            _ => None,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("address", &format_args!("{:#x}", self.address))
            .field("class", &self.class.name())
            .field("kind", &self.kind)
            .finish()
    }
}

/// One operand stack or local variable slot.
///
/// `Long` and `Double` take two slots: the value followed by `Top`.
#[derive(Clone, Default)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Reference(ObjectRef),
    #[default]
    Null,
    Top,
}

impl Value {
    pub fn from_bool(value: bool) -> Self {
        Self::Int(value as i32)
    }

    /// zero value a field or array element of this type starts with
    pub fn default_for(ty: &FieldType) -> Self {
        match ty {
            FieldType::Long => Self::Long(0),
            FieldType::Float => Self::Float(0.0),
            FieldType::Double => Self::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Self::Null,
            _ => Self::Int(0),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Reference(_) => "reference",
            Self::Null => "null",
            Self::Top => "top",
        }
    }

    fn mismatch(&self, expected: &'static str) -> Fault {
        Fault::SlotMismatch {
            expected,
            found: self.kind_name(),
        }
    }

    pub fn as_int(&self) -> Result<i32, Fault> {
        match self {
            Self::Int(value) => Ok(*value),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_long(&self) -> Result<i64, Fault> {
        match self {
            Self::Long(value) => Ok(*value),
            other => Err(other.mismatch("long")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Fault> {
        match self {
            Self::Float(value) => Ok(*value),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_double(&self) -> Result<f64, Fault> {
        match self {
            Self::Double(value) => Ok(*value),
            other => Err(other.mismatch("double")),
        }
    }

    /// `Ok(None)` for null
    pub fn as_reference(&self) -> Result<Option<&ObjectRef>, Fault> {
        match self {
            Self::Reference(object) => Ok(Some(object)),
            Self::Null => Ok(None),
            other => Err(other.mismatch("reference")),
        }
    }

    /// storage form of a reference: its address, `0` for null
    pub fn address(&self) -> Result<u64, Fault> {
        Ok(self.as_reference()?.map_or(0, |object| object.address()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Reference(a), Self::Reference(b)) => Arc::ptr_eq(a, b),
            (Self::Null, Self::Null) | (Self::Top, Self::Top) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "Int({value})"),
            Self::Long(value) => write!(f, "Long({value})"),
            Self::Float(value) => write!(f, "Float({value})"),
            Self::Double(value) => write!(f, "Double({value})"),
            Self::Reference(object) => {
                write!(f, "Reference({}@{:#x})", object.class().name(), object.address())
            }
            Self::Null => f.write_str("Null"),
            Self::Top => f.write_str("Top"),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Reference(object)
    }
}

impl From<Option<ObjectRef>> for Value {
    fn from(object: Option<ObjectRef>) -> Self {
        object.map_or(Self::Null, Self::Reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(Value::Float(f32::NAN), Value::Float(f32::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_ne!(Value::Int(1), Value::Long(1));
    }

    #[test]
    fn typed_views() {
        assert_eq!(Value::Int(3).as_int().unwrap(), 3);
        assert!(matches!(
            Value::Top.as_long(),
            Err(Fault::SlotMismatch {
                expected: "long",
                found: "top"
            })
        ));
        assert!(Value::Null.as_reference().unwrap().is_none());
        assert_eq!(Value::Null.address().unwrap(), 0);
        assert!(Value::Int(0).as_reference().is_err());
    }

    #[test]
    fn widths_and_defaults() {
        assert!(Value::Long(0).is_wide());
        assert!(!Value::Float(0.0).is_wide());
        assert_eq!(Value::default_for(&FieldType::Boolean), Value::Int(0));
        assert_eq!(Value::default_for(&FieldType::Double), Value::Double(0.0));
        assert_eq!(
            Value::default_for(&FieldType::Object("java/lang/Object".into())),
            Value::Null
        );
    }
}
