use std::sync::Arc;

use log::{debug, warn};

use crate::{
    ConstantOps, FieldOps, InitEntry, InvocationOps, JavaClass, ObjectRef, TypeOps, VM, VmError,
    VmResult,
};

impl VM {
    /// Runs static initialization of `class` exactly once.
    ///
    /// Re-entry from the initializing thread returns immediately, other
    /// threads wait. A failed class stays failed and throws
    /// `java/lang/NoClassDefFoundError` from then on.
    pub fn initialize(&self, class: &Arc<JavaClass>) -> VmResult<()> {
        self.link(class)?;
        let guard = match class.init().begin() {
            InitEntry::Ready => return Ok(()),
            InitEntry::Failed(cause) => {
                let error = self.new_throwable(
                    "java/lang/NoClassDefFoundError",
                    Some(&format!("Could not initialize class {}", class.name())),
                    cause,
                )?;
                return Err(VmError::Thrown(error));
            }
            InitEntry::Run(guard) => guard,
        };
        debug!("initializing {}", class.name());
        match self.run_initializer(class) {
            Ok(()) => {
                guard.complete();
                debug!("initialized {}", class.name());
                Ok(())
            }
            Err(VmError::Thrown(exception)) => {
                warn!(
                    "initializer of {} threw {}",
                    class.name(),
                    exception.class().name()
                );
                guard.fail(Some(exception.clone()));
                Err(VmError::Thrown(self.wrap_initializer_failure(exception)?))
            }
            // the dropped guard records the failure and wakes waiters
            Err(fault) => Err(fault),
        }
    }

    fn run_initializer(&self, class: &Arc<JavaClass>) -> VmResult<()> {
        if let Some(superclass) = class.superclass().filter(|_| !class.is_interface()) {
            self.initialize(superclass)?;
        }
        let statics = class.static_layout()?;
        for field in statics.fields() {
            if let Some(constant) = field.constant() {
                let value = self.ldc(constant)?;
                self.write_static_unchecked(field, value)?;
            }
        }
        if let Some(clinit) = class.declared_method("<clinit>", "()V") {
            self.invoke(clinit, Vec::new())?;
        }
        Ok(())
    }

    /// `java/lang/Error`s propagate unchanged, anything else is wrapped.
    fn wrap_initializer_failure(&self, exception: ObjectRef) -> VmResult<ObjectRef> {
        let error = self.core_class("java/lang/Error")?;
        if self.is_instance(&exception, &error) {
            return Ok(exception);
        }
        self.new_throwable(
            "java/lang/ExceptionInInitializerError",
            None,
            Some(exception),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    use crate::{
        AccessFlags, ClassDefinition, Code, Constant, FieldDefinition, FieldOp, Insn,
        InitState, MethodDefinition, Opcode, VM, Value, testing::test_vm,
    };

    fn static_method(
        name: &str,
        body: impl Fn(&VM) -> crate::VmResult<()> + Send + Sync + 'static,
    ) -> MethodDefinition {
        MethodDefinition::native(name, "()V", AccessFlags::STATIC, move |vm, _| {
            body(vm)?;
            Ok(None)
        })
    }

    #[test]
    fn constant_values_are_written() {
        let vm = test_vm();
        vm.define_class(
            ClassDefinition::new("demo/Consts")
                .field(
                    FieldDefinition::new("N", "I", AccessFlags::STATIC | AccessFlags::FINAL)
                        .with_constant(Constant::Int(7)),
                )
                .field(
                    FieldDefinition::new("TEXT", "Ljava/lang/String;", AccessFlags::STATIC)
                        .with_constant(Constant::String("hi".into())),
                ),
        )
        .unwrap();
        let n = vm.static_value("demo/Consts", "N", "I").unwrap();
        assert_eq!(n, Value::Int(7));
        let text = vm
            .static_value("demo/Consts", "TEXT", "Ljava/lang/String;")
            .unwrap();
        let text = text.as_reference().unwrap().unwrap().clone();
        assert_eq!(vm.string_value(&text).unwrap(), "hi");
    }

    #[test]
    fn initializer_runs_exactly_once_across_threads() {
        let vm = test_vm();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        vm.define_class(ClassDefinition::new("demo/Once").method(static_method(
            "<clinit>",
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(())
            },
        )))
        .unwrap();
        let class = vm.load_class("demo/Once").unwrap();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let vm = vm.clone();
                let class = class.clone();
                thread::spawn(move || vm.initialize(&class).unwrap())
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(class.init().is_complete());
    }

    #[test]
    fn self_reentry_does_not_block() {
        let vm = test_vm();
        vm.define_class(ClassDefinition::new("demo/Reentrant").method(static_method(
            "<clinit>",
            |vm| {
                let this = vm.load_class("demo/Reentrant")?;
                vm.initialize(&this)
            },
        )))
        .unwrap();
        let class = vm.load_class("demo/Reentrant").unwrap();
        vm.initialize(&class).unwrap();
        assert!(class.init().is_complete());
    }

    #[test]
    fn superclass_initializes_first() {
        let vm = test_vm();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());
        vm.define_class(ClassDefinition::new("demo/Parent").method(static_method(
            "<clinit>",
            move |_| {
                first.lock().push("parent");
                Ok(())
            },
        )))
        .unwrap();
        vm.define_class(
            ClassDefinition::new("demo/Child")
                .extends("demo/Parent")
                .method(static_method("<clinit>", move |_| {
                    second.lock().push("child");
                    Ok(())
                })),
        )
        .unwrap();
        let child = vm.load_class("demo/Child").unwrap();
        vm.initialize(&child).unwrap();
        assert_eq!(*order.lock(), vec!["parent", "child"]);
    }

    #[test]
    fn failure_is_wrapped_then_memoized() {
        let vm = test_vm();
        // <clinit> divides by zero
        let code = Code::new(
            2,
            0,
            vec![
                Insn::IntConst(1),
                Insn::IntConst(0),
                Insn::Op(Opcode::IDiv),
                Insn::field(FieldOp::PutStatic, "demo/Broken", "x", "I"),
                Insn::Op(Opcode::Return),
            ],
        );
        vm.define_class(
            ClassDefinition::new("demo/Broken")
                .field(FieldDefinition::new("x", "I", AccessFlags::STATIC))
                .method(MethodDefinition::code("<clinit>", "()V", AccessFlags::STATIC, code)),
        )
        .unwrap();
        let class = vm.load_class("demo/Broken").unwrap();

        let first = vm.initialize(&class).unwrap_err();
        let first = first.thrown().unwrap().clone();
        assert_eq!(first.class().name(), "java/lang/ExceptionInInitializerError");
        let cause = vm.exception_cause(&first).unwrap().unwrap();
        assert_eq!(cause.class().name(), "java/lang/ArithmeticException");
        assert!(matches!(class.init().state(), InitState::Failed(Some(_))));

        let second = vm.initialize(&class).unwrap_err();
        let second = second.thrown().unwrap().clone();
        assert_eq!(second.class().name(), "java/lang/NoClassDefFoundError");
        let cause = vm.exception_cause(&second).unwrap().unwrap();
        assert!(Arc::ptr_eq(&cause, &vm.exception_cause(&first).unwrap().unwrap()));
    }

    #[test]
    fn errors_are_not_wrapped() {
        let vm = test_vm();
        vm.define_class(ClassDefinition::new("demo/Fatal").method(static_method(
            "<clinit>",
            |vm| Err(vm.throw_new("java/lang/StackOverflowError", None)),
        )))
        .unwrap();
        let class = vm.load_class("demo/Fatal").unwrap();
        let error = vm.initialize(&class).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/StackOverflowError"
        );
    }
}
