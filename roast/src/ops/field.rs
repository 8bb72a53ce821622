use std::sync::Arc;

use crate::{
    FieldOp, Fault, Frame, JavaField, ObjectRef, VM, Value, VmResult,
};

pub trait FieldOps {
    /// Looks `owner.name:desc` up through the resolver.
    /// Throws `java/lang/NoSuchFieldError` when nothing matches.
    fn resolve_field(&self, owner: &str, name: &str, desc: &str) -> VmResult<Arc<JavaField>>;

    /// `getstatic`/`putstatic`/`getfield`/`putfield` by symbolic reference.
    fn field_access(
        &self,
        frame: &mut Frame,
        op: FieldOp,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> VmResult<()>;

    /// Runs `op` against an already resolved field.
    fn access_resolved(&self, frame: &mut Frame, op: FieldOp, field: &JavaField) -> VmResult<()>;

    fn read_field(&self, object: &ObjectRef, field: &JavaField) -> VmResult<Value>;
    fn write_field(&self, object: &ObjectRef, field: &JavaField, value: Value) -> VmResult<()>;

    /// Initializes the declaring class, then reads.
    fn read_static(&self, field: &JavaField) -> VmResult<Value>;
    /// Initializes the declaring class, then writes.
    fn write_static(&self, field: &JavaField, value: Value) -> VmResult<()>;
    /// Writes without triggering initialization, for the initializer itself.
    fn write_static_unchecked(&self, field: &JavaField, value: Value) -> VmResult<()>;
}

impl FieldOps for VM {
    fn resolve_field(&self, owner: &str, name: &str, desc: &str) -> VmResult<Arc<JavaField>> {
        let class = self.load_class(owner)?;
        self.resolver()
            .resolve_field(&class, name, desc)
            .ok_or_else(|| {
                self.throw_new(
                    "java/lang/NoSuchFieldError",
                    Some(&format!("{owner}.{name}:{desc}")),
                )
            })
    }

    fn field_access(
        &self,
        frame: &mut Frame,
        op: FieldOp,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> VmResult<()> {
        let field = self.resolve_field(owner, name, desc)?;
        self.access_resolved(frame, op, &field)
    }

    fn access_resolved(&self, frame: &mut Frame, op: FieldOp, field: &JavaField) -> VmResult<()> {
        if op.is_static() != field.is_static() {
            let expected = if op.is_static() { "static" } else { "non-static" };
            return Err(self.throw_new(
                "java/lang/IncompatibleClassChangeError",
                Some(&format!(
                    "expected {expected} field {}.{}",
                    field.owner(),
                    field.name()
                )),
            ));
        }
        match op {
            FieldOp::GetStatic => frame.push_value(self.read_static(field)?)?,
            FieldOp::PutStatic => {
                let value = pop_field_value(frame, field)?;
                self.write_static(field, value)?;
            }
            FieldOp::GetField => {
                let object = self.null_checked(frame.pop_reference()?)?;
                frame.push_value(self.read_field(&object, field)?)?;
            }
            FieldOp::PutField => {
                let value = pop_field_value(frame, field)?;
                let object = self.null_checked(frame.pop_reference()?)?;
                self.write_field(&object, field, value)?;
            }
        }
        Ok(())
    }

    fn read_field(&self, object: &ObjectRef, field: &JavaField) -> VmResult<Value> {
        check_holder(object, field)?;
        Ok(self.read_value(object.data(), field.offset(), field.ty(), field.is_volatile())?)
    }

    fn write_field(&self, object: &ObjectRef, field: &JavaField, value: Value) -> VmResult<()> {
        check_holder(object, field)?;
        Ok(self.write_value(
            object.data(),
            field.offset(),
            field.ty(),
            &value,
            field.is_volatile(),
        )?)
    }

    fn read_static(&self, field: &JavaField) -> VmResult<Value> {
        let class = self.load_class(field.owner())?;
        self.initialize(&class)?;
        let storage = class.mirror()?;
        Ok(self.read_value(storage.data(), field.offset(), field.ty(), field.is_volatile())?)
    }

    fn write_static(&self, field: &JavaField, value: Value) -> VmResult<()> {
        let class = self.load_class(field.owner())?;
        self.initialize(&class)?;
        self.write_static_unchecked(field, value)
    }

    fn write_static_unchecked(&self, field: &JavaField, value: Value) -> VmResult<()> {
        let class = self.load_class(field.owner())?;
        let storage = class.mirror()?;
        Ok(self.write_value(
            storage.data(),
            field.offset(),
            field.ty(),
            &value,
            field.is_volatile(),
        )?)
    }
}

fn pop_field_value(frame: &mut Frame, field: &JavaField) -> Result<Value, Fault> {
    if field.ty().is_wide() {
        frame.pop_wide()
    } else {
        frame.pop()
    }
}

fn check_holder(object: &ObjectRef, field: &JavaField) -> Result<(), Fault> {
    let holds = !field.is_static()
        && object
            .class()
            .ancestors()
            .any(|class| class.name() == field.owner());
    if holds {
        Ok(())
    } else {
        Err(Fault::WrongHolder {
            field: format!("{}.{}", field.owner(), field.name()),
            class: object.class().name().to_owned(),
        })
    }
}

impl VM {
    /// The reference, or a thrown `java/lang/NullPointerException`.
    pub(crate) fn null_checked(&self, object: Option<ObjectRef>) -> VmResult<ObjectRef> {
        object.ok_or_else(|| self.throw_new("java/lang/NullPointerException", None))
    }
}
