use crate::{
    Constant, HandleKind, HandleRef, InvocationOps, MethodDescriptor, MethodHandle, ObjectKind,
    ObjectRef, VM, Value, VmResult,
};

/// `ldc` and the heap objects behind non-primitive constants.
pub trait ConstantOps {
    fn ldc(&self, constant: &Constant) -> VmResult<Value>;

    /// metaclass object of the named class
    fn class_mirror(&self, name: &str) -> VmResult<ObjectRef>;

    /// fresh `java/lang/invoke/MethodType` for a method descriptor
    fn method_type(&self, desc: &str) -> VmResult<ObjectRef>;

    /// fresh `java/lang/invoke/MethodHandle` for a resolved method
    fn method_handle(&self, handle: &HandleRef) -> VmResult<ObjectRef>;
}

impl ConstantOps for VM {
    fn ldc(&self, constant: &Constant) -> VmResult<Value> {
        Ok(match constant {
            Constant::Int(value) => Value::Int(*value),
            Constant::Long(value) => Value::Long(*value),
            Constant::Float(value) => Value::Float(*value),
            Constant::Double(value) => Value::Double(*value),
            Constant::String(text) => self.intern(text)?.into(),
            Constant::Type(name) => self.class_mirror(name)?.into(),
            Constant::MethodType(desc) => self.method_type(desc)?.into(),
            Constant::MethodHandle(handle) => self.method_handle(handle)?.into(),
        })
    }

    fn class_mirror(&self, name: &str) -> VmResult<ObjectRef> {
        let class = self.load_class(name)?;
        Ok(class.mirror()?.clone())
    }

    fn method_type(&self, desc: &str) -> VmResult<ObjectRef> {
        let descriptor = MethodDescriptor::parse(desc)?;
        let class = self.core_class("java/lang/invoke/MethodType")?;
        let size = class.instance_size()?;
        Ok(self.allocate_object(class, size, ObjectKind::MethodType(descriptor))?)
    }

    fn method_handle(&self, handle: &HandleRef) -> VmResult<ObjectRef> {
        let method = self.resolve_method(&handle.owner, &handle.name, &handle.desc)?;
        let is_constructor = method.is_initializer();
        if (handle.kind == HandleKind::NewInvokeSpecial) != is_constructor
            || (handle.kind == HandleKind::InvokeStatic) != method.is_static()
        {
            return Err(self.throw_new(
                "java/lang/IncompatibleClassChangeError",
                Some(&format!("{:?} handle to {}", handle.kind, method.qualified_name())),
            ));
        }
        let class = self.core_class("java/lang/invoke/MethodHandle")?;
        let size = class.instance_size()?;
        Ok(self.allocate_object(
            class,
            size,
            ObjectKind::MethodHandle(MethodHandle {
                kind: handle.kind,
                method,
            }),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{AccessFlags, ClassDefinition, MethodDefinition, testing::test_vm};

    #[test]
    fn primitives_fold_and_strings_intern() {
        let vm = test_vm();
        assert_eq!(vm.ldc(&Constant::Long(-3)).unwrap(), Value::Long(-3));
        let a = vm.ldc(&Constant::String("hi".into())).unwrap();
        let b = vm.ldc(&Constant::String("hi".into())).unwrap();
        assert_eq!(a, b);
        let string = a.as_reference().unwrap().unwrap();
        assert_eq!(string.class().name(), "java/lang/String");
    }

    #[test]
    fn types_yield_mirrors() {
        let vm = test_vm();
        let mirror = vm.ldc(&Constant::Type("java/lang/String".into())).unwrap();
        let mirror = mirror.as_reference().unwrap().unwrap().clone();
        assert_eq!(mirror.class().name(), "java/lang/Class");
        let string = vm.load_class("java/lang/String").unwrap();
        assert!(Arc::ptr_eq(&mirror.mirrored_class().unwrap(), &string));

        let ints = vm.class_mirror("[I").unwrap();
        assert_eq!(ints.mirrored_class().unwrap().name(), "[I");
    }

    #[test]
    fn method_types_and_handles() {
        let vm = test_vm();
        vm.define_class(ClassDefinition::new("demo/Target").method(MethodDefinition::native(
            "twice",
            "(I)I",
            AccessFlags::STATIC,
            |_, args| Ok(Some(Value::Int(args[0].as_int()? * 2))),
        )))
        .unwrap();

        let ty = vm.method_type("(IJ)Ljava/lang/String;").unwrap();
        assert_eq!(ty.method_type().unwrap().arg_slots(), 3);

        let handle = HandleRef::new(HandleKind::InvokeStatic, "demo/Target", "twice", "(I)I");
        let value = vm.ldc(&Constant::MethodHandle(handle)).unwrap();
        let object = value.as_reference().unwrap().unwrap();
        let handle = object.method_handle().unwrap();
        assert_eq!(handle.method.qualified_name(), "demo/Target.twice(I)I");

        let wrong = HandleRef::new(HandleKind::InvokeVirtual, "demo/Target", "twice", "(I)I");
        let error = vm.method_handle(&wrong).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/IncompatibleClassChangeError"
        );
    }
}
