use std::sync::Arc;

use crate::{
    ARRAY_BASE_OFFSET, FieldType, Frame, JavaClass, ObjectKind, ObjectRef, VM, VmResult,
};

pub trait AllocationOps {
    /// Initializes `class`, then allocates a zeroed instance of it.
    /// Abstract classes, interfaces and arrays throw
    /// `java/lang/InstantiationError`.
    fn allocate_instance(&self, class: &Arc<JavaClass>) -> VmResult<ObjectRef>;

    /// One-dimensional array of `element`.
    fn allocate_array(&self, element: &FieldType, length: i32) -> VmResult<ObjectRef>;

    /// Nested arrays of `array_class` for every given dimension. Deeper
    /// levels stay null.
    fn allocate_multi_array(
        &self,
        array_class: &Arc<JavaClass>,
        dimensions: &[i32],
    ) -> VmResult<ObjectRef>;

    /// `new`
    fn new_object(&self, frame: &mut Frame, class: &Arc<JavaClass>) -> VmResult<()>;
    /// `newarray` / `anewarray`
    fn new_array(&self, frame: &mut Frame, element: &FieldType) -> VmResult<()>;
    /// `multianewarray`
    fn new_multi_array(
        &self,
        frame: &mut Frame,
        array_class: &Arc<JavaClass>,
        dimensions: u8,
    ) -> VmResult<()>;
}

impl AllocationOps for VM {
    fn allocate_instance(&self, class: &Arc<JavaClass>) -> VmResult<ObjectRef> {
        if class.is_abstract() || class.is_interface() || class.is_array() || class.is_primitive()
        {
            return Err(self.throw_new("java/lang/InstantiationError", Some(class.name())));
        }
        self.initialize(class)?;
        Ok(self.allocate_object(class.clone(), class.instance_size()?, ObjectKind::Instance)?)
    }

    fn allocate_array(&self, element: &FieldType, length: i32) -> VmResult<ObjectRef> {
        let length = self.array_size(length)?;
        let class = self.load_class(&FieldType::Array(Box::new(element.clone())).to_string())?;
        Ok(self.allocate_array_object(class, length)?)
    }

    fn allocate_multi_array(
        &self,
        array_class: &Arc<JavaClass>,
        dimensions: &[i32],
    ) -> VmResult<ObjectRef> {
        let lengths = dimensions
            .iter()
            .map(|&length| self.array_size(length))
            .collect::<VmResult<Vec<_>>>()?;
        self.nested_array(array_class, &lengths)
    }

    fn new_object(&self, frame: &mut Frame, class: &Arc<JavaClass>) -> VmResult<()> {
        let object = self.allocate_instance(class)?;
        frame.push(object.into())?;
        Ok(())
    }

    fn new_array(&self, frame: &mut Frame, element: &FieldType) -> VmResult<()> {
        let length = frame.pop_int()?;
        let array = self.allocate_array(element, length)?;
        frame.push(array.into())?;
        Ok(())
    }

    fn new_multi_array(
        &self,
        frame: &mut Frame,
        array_class: &Arc<JavaClass>,
        dimensions: u8,
    ) -> VmResult<()> {
        let dimensions = frame
            .pop_slots(usize::from(dimensions))?
            .iter()
            .map(|slot| slot.as_int())
            .collect::<Result<Vec<_>, _>>()?;
        let array = self.allocate_multi_array(array_class, &dimensions)?;
        frame.push(array.into())?;
        Ok(())
    }
}

impl VM {
    /// Throws `java/lang/NegativeArraySizeException` for negative lengths.
    fn array_size(&self, length: i32) -> VmResult<usize> {
        usize::try_from(length).map_err(|_| {
            self.throw_new(
                "java/lang/NegativeArraySizeException",
                Some(&length.to_string()),
            )
        })
    }

    fn nested_array(&self, class: &Arc<JavaClass>, lengths: &[usize]) -> VmResult<ObjectRef> {
        let Some((&length, rest)) = lengths.split_first() else {
            return Ok(self.allocate_array_object(class.clone(), 0)?);
        };
        let array = self.allocate_array_object(class.clone(), length)?;
        let Some(component) = class.component().filter(|_| !rest.is_empty()) else {
            return Ok(array);
        };
        for index in 0..length {
            let inner = self.nested_array(component, rest)?;
            array
                .data()
                .write::<u64>(ARRAY_BASE_OFFSET + index * 8, inner.address());
        }
        Ok(array)
    }
}
