use crate::{
    ARRAY_BASE_OFFSET, ArrayKind, Fault, FieldType, Frame, ObjectRef, TypeOps, VM, Value,
    VmResult,
};

pub trait ArrayOps {
    /// `xaload`
    fn array_load(&self, frame: &mut Frame, kind: ArrayKind) -> VmResult<()>;
    /// `xastore`
    fn array_store(&self, frame: &mut Frame, kind: ArrayKind) -> VmResult<()>;
    /// `arraylength`
    fn array_length(&self, frame: &mut Frame) -> VmResult<()>;

    fn load_element(&self, array: &ObjectRef, index: i32) -> VmResult<Value>;

    /// Bounds-checked store. Reference stores check the value against the
    /// component type first and leave the slot untouched on failure.
    fn store_element(&self, array: &ObjectRef, index: i32, value: Value) -> VmResult<()>;

    /// `System.arraycopy`.
    fn array_copy(
        &self,
        src: Option<&ObjectRef>,
        src_pos: i32,
        dst: Option<&ObjectRef>,
        dst_pos: i32,
        length: i32,
    ) -> VmResult<()>;
}

fn kind_of(element: &FieldType) -> ArrayKind {
    match element {
        FieldType::Boolean | FieldType::Byte => ArrayKind::Byte,
        FieldType::Char => ArrayKind::Char,
        FieldType::Short => ArrayKind::Short,
        FieldType::Int => ArrayKind::Int,
        FieldType::Long => ArrayKind::Long,
        FieldType::Float => ArrayKind::Float,
        FieldType::Double => ArrayKind::Double,
        FieldType::Object(_) | FieldType::Array(_) => ArrayKind::Reference,
    }
}

fn kind_name(kind: ArrayKind) -> &'static str {
    match kind {
        ArrayKind::Int => "int[]",
        ArrayKind::Long => "long[]",
        ArrayKind::Float => "float[]",
        ArrayKind::Double => "double[]",
        ArrayKind::Reference => "reference[]",
        ArrayKind::Byte => "byte[]",
        ArrayKind::Char => "char[]",
        ArrayKind::Short => "short[]",
    }
}

/// Element type of `array`, checked against the instruction's kind.
fn element_type(array: &ObjectRef, kind: Option<ArrayKind>) -> Result<&FieldType, Fault> {
    let element = array.class().element_type().ok_or(Fault::SlotMismatch {
        expected: "array",
        found: "object",
    })?;
    match kind {
        Some(kind) if kind != kind_of(element) => Err(Fault::SlotMismatch {
            expected: kind_name(kind),
            found: kind_name(kind_of(element)),
        }),
        _ => Ok(element),
    }
}

fn element_offset(element: &FieldType, index: usize) -> usize {
    ARRAY_BASE_OFFSET + index * element.size()
}

impl VM {
    fn checked_index(&self, array: &ObjectRef, index: i32) -> VmResult<usize> {
        let length = array.array_length().unwrap_or(0);
        match usize::try_from(index) {
            Ok(index) if index < length => Ok(index),
            _ => Err(self.throw_new(
                "java/lang/ArrayIndexOutOfBoundsException",
                Some(&format!("Index {index} out of bounds for length {length}")),
            )),
        }
    }

    fn array_store_error(&self, value: &ObjectRef, array: &ObjectRef) -> crate::VmError {
        self.throw_new(
            "java/lang/ArrayStoreException",
            Some(&format!(
                "{} into {}",
                value.class().name(),
                array.class().name()
            )),
        )
    }
}

impl ArrayOps for VM {
    fn array_load(&self, frame: &mut Frame, kind: ArrayKind) -> VmResult<()> {
        let index = frame.pop_int()?;
        let array = self.null_checked(frame.pop_reference()?)?;
        element_type(&array, Some(kind))?;
        let value = self.load_element(&array, index)?;
        frame.push_value(value)?;
        Ok(())
    }

    fn array_store(&self, frame: &mut Frame, kind: ArrayKind) -> VmResult<()> {
        let value = match kind {
            ArrayKind::Long | ArrayKind::Double => frame.pop_wide()?,
            _ => frame.pop()?,
        };
        let index = frame.pop_int()?;
        let array = self.null_checked(frame.pop_reference()?)?;
        element_type(&array, Some(kind))?;
        self.store_element(&array, index, value)
    }

    fn array_length(&self, frame: &mut Frame) -> VmResult<()> {
        let array = self.null_checked(frame.pop_reference()?)?;
        element_type(&array, None)?;
        let length = array.array_length().unwrap_or(0);
        frame.push_int(length as i32)?;
        Ok(())
    }

    fn load_element(&self, array: &ObjectRef, index: i32) -> VmResult<Value> {
        let element = element_type(array, None)?;
        let index = self.checked_index(array, index)?;
        Ok(self.read_value(array.data(), element_offset(element, index), element, false)?)
    }

    fn store_element(&self, array: &ObjectRef, index: i32, value: Value) -> VmResult<()> {
        let element = element_type(array, None)?;
        let index = self.checked_index(array, index)?;
        let object = value.as_reference().ok().flatten();
        if let (Some(component), Some(object)) = (array.class().component(), object) {
            if !self.is_instance(object, component) {
                return Err(self.array_store_error(object, array));
            }
        }
        self.write_value(array.data(), element_offset(element, index), element, &value, false)?;
        Ok(())
    }

    fn array_copy(
        &self,
        src: Option<&ObjectRef>,
        src_pos: i32,
        dst: Option<&ObjectRef>,
        dst_pos: i32,
        length: i32,
    ) -> VmResult<()> {
        let src = self.null_checked(src.cloned())?;
        let dst = self.null_checked(dst.cloned())?;
        let (Some(src_element), Some(dst_element)) =
            (src.class().element_type(), dst.class().element_type())
        else {
            return Err(self.throw_new(
                "java/lang/ArrayStoreException",
                Some("arraycopy: argument is not an array"),
            ));
        };
        let references = src_element.is_reference() && dst_element.is_reference();
        if !references && src_element != dst_element {
            return Err(self.array_store_error(&src, &dst));
        }

        let src_length = src.array_length().unwrap_or(0) as i64;
        let dst_length = dst.array_length().unwrap_or(0) as i64;
        let (src_pos, dst_pos, length) =
            (i64::from(src_pos), i64::from(dst_pos), i64::from(length));
        if src_pos < 0
            || dst_pos < 0
            || length < 0
            || src_pos + length > src_length
            || dst_pos + length > dst_length
        {
            return Err(self.throw_new(
                "java/lang/ArrayIndexOutOfBoundsException",
                Some(&format!(
                    "arraycopy: last index {} out of bounds for length {}",
                    (src_pos + length).max(dst_pos + length),
                    src_length.min(dst_length)
                )),
            ));
        }
        if length == 0 {
            return Ok(());
        }

        let checked = references
            && !matches!(
                (src.class().component(), dst.class().component()),
                (Some(from), Some(to)) if self.is_assignable(from, to)
            );
        if !checked {
            let (from, to) = (
                element_offset(src_element, src_pos as usize),
                element_offset(dst_element, dst_pos as usize),
            );
            let (src, dst, count) = (src.data(), dst.data(), length as usize);
            match src_element.size() {
                1 => src.copy_elements::<i8>(from, dst, to, count),
                2 => src.copy_elements::<i16>(from, dst, to, count),
                4 => src.copy_elements::<i32>(from, dst, to, count),
                _ => src.copy_elements::<i64>(from, dst, to, count),
            }
            return Ok(());
        }
        // different arrays here, so a forward walk cannot clobber its source
        for offset in 0..length {
            let value = self.load_element(&src, (src_pos + offset) as i32)?;
            self.store_element(&dst, (dst_pos + offset) as i32, value)?;
        }
        Ok(())
    }
}
