use crate::{Frame, JavaClass, ObjectRef, VM, VmResult, bootstrap};

/// `checkcast`, `instanceof` and the assignability relation behind them.
pub trait TypeOps {
    /// Whether a value of runtime class `from` may be stored where `to`
    /// is expected.
    fn is_assignable(&self, from: &JavaClass, to: &JavaClass) -> bool;

    fn is_instance(&self, object: &ObjectRef, class: &JavaClass) -> bool {
        self.is_assignable(object.class(), class)
    }

    /// Leaves the reference on the stack; null always passes.
    /// Throws `java/lang/ClassCastException` otherwise.
    fn check_cast(&self, frame: &mut Frame, class: &JavaClass) -> VmResult<()>;

    /// Replaces the reference with `1` or `0`; null yields `0`.
    fn instance_of(&self, frame: &mut Frame, class: &JavaClass) -> VmResult<()>;
}

impl TypeOps for VM {
    fn is_assignable(&self, from: &JavaClass, to: &JavaClass) -> bool {
        if std::ptr::eq(from, to) {
            return true;
        }
        match (from.component(), to.component()) {
            (Some(from), Some(to)) if from.is_primitive() || to.is_primitive() => {
                std::ptr::eq(from.as_ref(), to.as_ref())
            }
            (Some(from), Some(to)) => self.is_assignable(from, to),
            (Some(_), None) if to.is_interface() => {
                bootstrap::ARRAY_INTERFACES.contains(&to.name())
            }
            (Some(_), None) => to.name() == "java/lang/Object",
            (None, Some(_)) => false,
            (None, None) if to.is_interface() => from.implements(to),
            (None, None) => from.is_subclass_of(to),
        }
    }

    fn check_cast(&self, frame: &mut Frame, class: &JavaClass) -> VmResult<()> {
        let Some(object) = frame.peek(0)?.as_reference()?.cloned() else {
            return Ok(());
        };
        if self.is_instance(&object, class) {
            return Ok(());
        }
        Err(self.throw_new(
            "java/lang/ClassCastException",
            Some(&format!(
                "class {} cannot be cast to class {}",
                object.class().name(),
                class.name()
            )),
        ))
    }

    fn instance_of(&self, frame: &mut Frame, class: &JavaClass) -> VmResult<()> {
        let object = frame.pop_reference()?;
        let result = object.is_some_and(|object| self.is_instance(&object, class));
        frame.push_int(result.into())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDefinition, Value, testing::test_vm};

    fn define(vm: &VM) {
        vm.define_class(ClassDefinition::interface("demo/Shape")).unwrap();
        vm.define_class(ClassDefinition::new("demo/Base").implements("demo/Shape"))
            .unwrap();
        vm.define_class(ClassDefinition::new("demo/Square").extends("demo/Base"))
            .unwrap();
    }

    #[test]
    fn classes_and_interfaces() {
        let vm = test_vm();
        define(&vm);
        let shape = vm.load_class("demo/Shape").unwrap();
        let base = vm.load_class("demo/Base").unwrap();
        let square = vm.load_class("demo/Square").unwrap();
        let object = vm.load_class("java/lang/Object").unwrap();

        assert!(vm.is_assignable(&square, &base));
        assert!(vm.is_assignable(&square, &shape));
        assert!(vm.is_assignable(&shape, &object));
        assert!(!vm.is_assignable(&base, &square));
        assert!(!vm.is_assignable(&object, &shape));
    }

    #[test]
    fn arrays_are_covariant_over_references_only() {
        let vm = test_vm();
        define(&vm);
        let squares = vm.load_class("[Ldemo/Square;").unwrap();
        let shapes = vm.load_class("[Ldemo/Shape;").unwrap();
        let ints = vm.load_class("[I").unwrap();
        let longs = vm.load_class("[J").unwrap();
        let nested = vm.load_class("[[I").unwrap();
        let objects = vm.load_class("[Ljava/lang/Object;").unwrap();

        assert!(vm.is_assignable(&squares, &shapes));
        assert!(!vm.is_assignable(&shapes, &squares));
        assert!(!vm.is_assignable(&ints, &longs));
        assert!(vm.is_assignable(&nested, &objects));
        assert!(!vm.is_assignable(&ints, &objects));
        for name in ["java/lang/Object", "java/lang/Cloneable", "java/io/Serializable"] {
            assert!(vm.is_assignable(&ints, &vm.load_class(name).unwrap()), "{name}");
        }
        assert!(!vm.is_assignable(&ints, &vm.load_class("demo/Shape").unwrap()));
    }

    #[test]
    fn casts_on_the_stack() {
        let vm = test_vm();
        let string = vm.intern("text").unwrap();
        let object = vm.load_class("java/lang/Object").unwrap();
        let throwable = vm.load_class("java/lang/Throwable").unwrap();
        let mut frame = Frame::new(0, 2);

        frame.push(string.clone().into()).unwrap();
        vm.check_cast(&mut frame, &object).unwrap();
        let error = vm.check_cast(&mut frame, &throwable).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/ClassCastException"
        );

        vm.instance_of(&mut frame, &throwable).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 0);
        frame.push(Value::Null).unwrap();
        vm.check_cast(&mut frame, &throwable).unwrap();
        vm.instance_of(&mut frame, &object).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 0);
        frame.push(string.into()).unwrap();
        vm.instance_of(&mut frame, &object).unwrap();
        assert_eq!(frame.pop_int().unwrap(), 1);
    }
}
