use std::sync::Arc;

use log::{trace, warn};

use crate::{
    ARRAY_BASE_OFFSET, ARRAY_LENGTH_OFFSET, Fault, FieldOps, FieldType, JavaClass, JavaField,
    MemoryAllocator, MemoryData, OBJECT_HEADER_SIZE, Object, ObjectKind, ObjectRef, Scalar, VM,
    Value, VmError, VmResult,
};

impl VM {
    /// Carves a heap block for a new object and registers it under its
    /// address. No checks, no initialization.
    pub(crate) fn allocate_object(
        &self,
        class: Arc<JavaClass>,
        bytes: usize,
        kind: ObjectKind,
    ) -> Result<ObjectRef, Fault> {
        let bytes = bytes.max(OBJECT_HEADER_SIZE);
        let Some(block) = self.inner.allocator.allocate_heap(bytes) else {
            warn!("heap exhausted allocating {bytes} bytes for {}", class.name());
            return Err(Fault::OutOfMemory(bytes));
        };
        trace!("{} at {:#x}", class.name(), block.address());
        let object = Arc::new(Object::new(
            block.address(),
            class,
            block.data().clone(),
            kind,
        ));
        self.inner
            .objects
            .write()
            .insert(block.address(), object.clone());
        Ok(object)
    }

    /// Raw array of `length` elements of `array_class`, zero filled.
    pub(crate) fn allocate_array_object(
        &self,
        array_class: Arc<JavaClass>,
        length: usize,
    ) -> Result<ObjectRef, Fault> {
        let width = array_class
            .element_type()
            .map(FieldType::size)
            .ok_or_else(|| Fault::MalformedDescriptor(array_class.name().to_owned()))?;
        let bytes = length
            .checked_mul(width)
            .and_then(|bytes| bytes.checked_add(ARRAY_BASE_OFFSET))
            .ok_or(Fault::OutOfMemory(usize::MAX))?;
        let array = self.allocate_object(array_class, bytes, ObjectKind::Array { length })?;
        array.data().write_int(ARRAY_LENGTH_OFFSET, length as i32);
        Ok(array)
    }

    /// Reads a `ty`-typed slot. Sub-int kinds widen to `Int`,
    /// references come back as the object at the stored address.
    pub(crate) fn read_value(
        &self,
        data: &MemoryData,
        offset: usize,
        ty: &FieldType,
        volatile: bool,
    ) -> Result<Value, Fault> {
        fn load<T: Scalar>(data: &MemoryData, offset: usize, volatile: bool) -> T {
            if volatile {
                data.volatile().read(offset)
            } else {
                data.read(offset)
            }
        }
        Ok(match ty {
            FieldType::Boolean | FieldType::Byte => {
                Value::Int(load::<i8>(data, offset, volatile).into())
            }
            FieldType::Char => Value::Int(load::<u16>(data, offset, volatile).into()),
            FieldType::Short => Value::Int(load::<i16>(data, offset, volatile).into()),
            FieldType::Int => Value::Int(load(data, offset, volatile)),
            FieldType::Long => Value::Long(load(data, offset, volatile)),
            FieldType::Float => Value::Float(load(data, offset, volatile)),
            FieldType::Double => Value::Double(load(data, offset, volatile)),
            FieldType::Object(_) | FieldType::Array(_) => {
                self.object_at(load(data, offset, volatile))?.into()
            }
        })
    }

    /// Writes `value` into a `ty`-typed slot, narrowing ints and storing
    /// booleans as their low bit.
    pub(crate) fn write_value(
        &self,
        data: &MemoryData,
        offset: usize,
        ty: &FieldType,
        value: &Value,
        volatile: bool,
    ) -> Result<(), Fault> {
        fn store<T: Scalar>(data: &MemoryData, offset: usize, value: T, volatile: bool) {
            if volatile {
                data.volatile().write(offset, value)
            } else {
                data.write(offset, value)
            }
        }
        match ty {
            FieldType::Boolean => store(data, offset, (value.as_int()? & 1) as i8, volatile),
            FieldType::Byte => store(data, offset, value.as_int()? as i8, volatile),
            FieldType::Char => store(data, offset, value.as_int()? as u16, volatile),
            FieldType::Short => store(data, offset, value.as_int()? as i16, volatile),
            FieldType::Int => store(data, offset, value.as_int()?, volatile),
            FieldType::Long => store(data, offset, value.as_long()?, volatile),
            FieldType::Float => store(data, offset, value.as_float()?, volatile),
            FieldType::Double => store(data, offset, value.as_double()?, volatile),
            FieldType::Object(_) | FieldType::Array(_) => {
                store(data, offset, value.address()?, volatile)
            }
        }
        Ok(())
    }

    /// Object living at `address`; `0` is null.
    pub fn object_at(&self, address: u64) -> Result<Option<ObjectRef>, Fault> {
        if address == 0 {
            return Ok(None);
        }
        self.inner
            .objects
            .read()
            .get(&address)
            .cloned()
            .map(Some)
            .ok_or(Fault::DanglingReference(address))
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.read().len()
    }

    /// Interned `java/lang/String` for `text`.
    pub fn intern(&self, text: &str) -> VmResult<ObjectRef> {
        if let Some(string) = self.inner.strings.lock().get(text) {
            return Ok(string.clone());
        }
        let string = self.new_string(text)?;
        // another thread may have interned the same text meanwhile
        Ok(self
            .inner
            .strings
            .lock()
            .entry(text.to_owned())
            .or_insert(string)
            .clone())
    }

    /// Fresh, not interned `java/lang/String` backed by a `[C`.
    pub fn new_string(&self, text: &str) -> VmResult<ObjectRef> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let chars = self.allocate_array_object(self.load_class("[C")?, units.len())?;
        chars.data().write_array(ARRAY_BASE_OFFSET, &units);

        let class = self.core_class("java/lang/String")?;
        let string =
            self.allocate_object(class.clone(), class.instance_size()?, ObjectKind::Instance)?;
        let value = self.core_field("java/lang/String", "value", "[C")?;
        self.write_field(&string, &value, chars.into())?;
        Ok(string)
    }

    /// Host copy of a `java/lang/String`'s text.
    pub fn string_value(&self, string: &ObjectRef) -> VmResult<String> {
        let value = self.read_field(string, &*self.core_field("java/lang/String", "value", "[C")?)?;
        let Some(chars) = value.as_reference()? else {
            return Ok(String::new());
        };
        let mut units = vec![0u16; chars.array_length().unwrap_or(0)];
        chars.data().read_array(ARRAY_BASE_OFFSET, &mut units);
        Ok(String::from_utf16_lossy(&units))
    }

    /// Instance of a throwable class with message and cause set directly,
    /// without running a constructor.
    pub fn new_throwable(
        &self,
        class_name: &str,
        message: Option<&str>,
        cause: Option<ObjectRef>,
    ) -> VmResult<ObjectRef> {
        let class = self.load_class(class_name)?;
        self.initialize(&class)?;
        let throwable =
            self.allocate_object(class.clone(), class.instance_size()?, ObjectKind::Instance)?;
        if let Some(message) = message {
            let message = self.new_string(message)?;
            self.write_field(&throwable, &*self.throwable_field("detailMessage")?, message.into())?;
        }
        if cause.is_some() {
            self.write_field(&throwable, &*self.throwable_field("cause")?, cause.into())?;
        }
        Ok(throwable)
    }

    /// Error to return for a guest fault of type `class_name`. A host
    /// fault while building the exception wins.
    pub fn throw_new(&self, class_name: &str, message: Option<&str>) -> VmError {
        match self.new_throwable(class_name, message, None) {
            Ok(throwable) => VmError::Thrown(throwable),
            Err(error) => error,
        }
    }

    pub fn exception_message(&self, throwable: &ObjectRef) -> VmResult<Option<String>> {
        let message = self.read_field(throwable, &*self.throwable_field("detailMessage")?)?;
        message
            .as_reference()?
            .map(|message| self.string_value(message))
            .transpose()
    }

    pub fn exception_cause(&self, throwable: &ObjectRef) -> VmResult<Option<ObjectRef>> {
        let cause = self.read_field(throwable, &*self.throwable_field("cause")?)?;
        Ok(cause.as_reference()?.cloned())
    }

    fn throwable_field(&self, name: &'static str) -> Result<Arc<JavaField>, Fault> {
        let desc = match name {
            "cause" => "Ljava/lang/Throwable;",
            _ => "Ljava/lang/String;",
        };
        self.core_field("java/lang/Throwable", name, desc)
    }

    /// instance field of a bootstrap class
    pub(crate) fn core_field(
        &self,
        owner: &'static str,
        name: &str,
        desc: &str,
    ) -> Result<Arc<JavaField>, Fault> {
        self.core_class(owner)?
            .declared_field(name, desc)
            .cloned()
            .ok_or(Fault::MissingBootstrapType(owner))
    }

    /// value of `owner.name` as a [`Value`], for embedders and tests
    pub fn static_value(&self, owner: &str, name: &str, desc: &str) -> VmResult<Value> {
        let field = self.resolve_field(owner, name, desc)?;
        self.read_static(&field)
    }
}

#[cfg(test)]
mod tests {
    use crate::{ARRAY_BASE_OFFSET, Fault, testing::test_vm};

    #[test]
    fn strings_round_trip_and_intern() {
        let vm = test_vm();
        let fresh = vm.new_string("héllo ☃").unwrap();
        assert_eq!(vm.string_value(&fresh).unwrap(), "héllo ☃");
        let a = vm.intern("key").unwrap();
        let b = vm.intern("key").unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert!(!std::sync::Arc::ptr_eq(&a, &vm.new_string("key").unwrap()));
    }

    #[test]
    fn objects_resolve_by_address() {
        let vm = test_vm();
        let string = vm.new_string("x").unwrap();
        let found = vm.object_at(string.address()).unwrap().unwrap();
        assert!(std::sync::Arc::ptr_eq(&found, &string));
        assert!(vm.object_at(0).unwrap().is_none());
        assert!(matches!(
            vm.object_at(string.address() + 1),
            Err(Fault::DanglingReference(_))
        ));
    }

    #[test]
    fn dropped_objects_stay_addressable() {
        let vm = test_vm();
        let before = vm.object_count();
        let address = vm.new_string("gone").unwrap().address();
        assert!(vm.object_count() > before);
        assert!(vm.object_at(address).unwrap().is_some());
    }

    #[test]
    fn arrays_store_their_length() {
        let vm = test_vm();
        let class = vm.load_class("[J").unwrap();
        let array = vm.allocate_array_object(class, 5).unwrap();
        assert_eq!(array.array_length(), Some(5));
        assert_eq!(array.data().read_int(0), 5);
        assert_eq!(array.data().length(), ARRAY_BASE_OFFSET + 40);
    }

    #[test]
    fn throwables_carry_message_and_cause() {
        let vm = test_vm();
        let cause = vm
            .new_throwable("java/lang/ArithmeticException", Some("/ by zero"), None)
            .unwrap();
        let wrapper = vm
            .new_throwable("java/lang/ExceptionInInitializerError", None, Some(cause.clone()))
            .unwrap();
        assert_eq!(
            vm.exception_message(&cause).unwrap().as_deref(),
            Some("/ by zero")
        );
        assert_eq!(vm.exception_message(&wrapper).unwrap(), None);
        let found = vm.exception_cause(&wrapper).unwrap().unwrap();
        assert!(std::sync::Arc::ptr_eq(&found, &cause));
    }
}
