use log::debug;

use crate::{
    AllocationOps, Constant, ConstantOps, Fault, Frame, HandleKind, HandleRef, InvocationOps,
    InvokeKind, JavaMethod, MethodDescriptor, ObjectRef, VM, Value, VmResult,
    ops::invocation::pop_arguments,
};

/// A dynamic call site as it appears in code.
#[derive(Debug, Clone, Copy)]
pub struct DynamicSite<'a> {
    /// index of the `invokedynamic` instruction in its method
    pub index: usize,
    pub name: &'a str,
    pub desc: &'a str,
    pub bootstrap: &'a HandleRef,
    pub args: &'a [Constant],
}

pub trait DynamicOps {
    /// Target handle of `site` in `method`, running its bootstrap method
    /// on first use. Concurrent first uses link once.
    fn link_call_site(&self, method: &JavaMethod, site: DynamicSite<'_>) -> VmResult<ObjectRef>;

    /// `invokedynamic`
    fn invoke_dynamic(
        &self,
        frame: &mut Frame,
        method: &JavaMethod,
        site: DynamicSite<'_>,
    ) -> VmResult<()>;

    /// Calls through a `java/lang/invoke/MethodHandle` object.
    fn invoke_handle(&self, handle: &ObjectRef, args: Vec<Value>) -> VmResult<Option<Value>>;
}

impl DynamicOps for VM {
    fn link_call_site(&self, method: &JavaMethod, site: DynamicSite<'_>) -> VmResult<ObjectRef> {
        let call_site = method
            .call_site(site.index)
            .ok_or_else(|| Fault::BadCallSite(site.name.to_owned()))?;
        call_site.link_with(|| {
            debug!(
                "linking call site {} in {} via {}.{}",
                site.name,
                method.qualified_name(),
                site.bootstrap.owner,
                site.bootstrap.name
            );
            let bootstrap = self.method_handle(site.bootstrap)?;
            let mut args = Vec::with_capacity(site.args.len() + 2);
            args.push(self.intern(site.name)?.into());
            args.push(self.method_type(site.desc)?.into());
            for constant in site.args {
                args.push(self.ldc(constant)?);
            }
            match self.invoke_handle(&bootstrap, args)? {
                Some(Value::Reference(target)) if target.method_handle().is_some() => Ok(target),
                _ => Err(Fault::BadCallSite(site.name.to_owned()).into()),
            }
        })
    }

    fn invoke_dynamic(
        &self,
        frame: &mut Frame,
        method: &JavaMethod,
        site: DynamicSite<'_>,
    ) -> VmResult<()> {
        let target = self.link_call_site(method, site)?;
        let args = pop_arguments(frame, &MethodDescriptor::parse(site.desc)?)?;
        if let Some(result) = self.invoke_handle(&target, args)? {
            frame.push_value(result)?;
        }
        Ok(())
    }

    fn invoke_handle(&self, handle: &ObjectRef, mut args: Vec<Value>) -> VmResult<Option<Value>> {
        let handle = handle
            .method_handle()
            .ok_or_else(|| Fault::BadCallSite(handle.class().name().to_owned()))?;
        let method = &handle.method;
        match handle.kind {
            HandleKind::InvokeStatic => {
                if let Some(owner) = method.owner() {
                    self.initialize(&owner)?;
                }
                self.invoke(method, args)
            }
            HandleKind::InvokeSpecial => self.invoke(method, args),
            HandleKind::InvokeVirtual | HandleKind::InvokeInterface => {
                let receiver = args
                    .first()
                    .map(Value::as_reference)
                    .transpose()?
                    .flatten()
                    .cloned();
                let receiver = self.null_checked(receiver)?;
                let kind = match handle.kind {
                    HandleKind::InvokeInterface => InvokeKind::Interface,
                    _ => InvokeKind::Virtual,
                };
                let target = self.dispatch_target(kind, method, &receiver)?;
                self.invoke(&target, args)
            }
            HandleKind::NewInvokeSpecial => {
                let class = method
                    .owner()
                    .ok_or_else(|| Fault::NotLinked(method.owner_name().to_owned()))?;
                let object = self.allocate_instance(&class)?;
                args.insert(0, object.clone().into());
                self.invoke(method, args)?;
                Ok(Some(object.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        AccessFlags, ClassDefinition, Code, FieldDefinition, FieldOps, Insn, MethodDefinition,
        testing::test_vm,
    };

    const BOOTSTRAP_DESC: &str =
        "(Ljava/lang/String;Ljava/lang/invoke/MethodType;I)Ljava/lang/invoke/MethodHandle;";

    /// `demo/Indy.add(II)I` plus a bootstrap method counting its runs
    fn define(vm: &VM, runs: Arc<AtomicUsize>) {
        vm.define_class(
            ClassDefinition::new("demo/Indy")
                .method(MethodDefinition::native(
                    "add",
                    "(II)I",
                    AccessFlags::STATIC,
                    |_, args| Ok(Some(Value::Int(args[0].as_int()? + args[1].as_int()?))),
                ))
                .method(MethodDefinition::native(
                    "bootstrap",
                    BOOTSTRAP_DESC,
                    AccessFlags::STATIC,
                    move |vm, args| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let name = vm.null_checked(args[0].as_reference()?.cloned())?;
                        assert_eq!(vm.string_value(&name)?, "plus");
                        assert_eq!(args[2], Value::Int(42));
                        let target = HandleRef::new(
                            HandleKind::InvokeStatic,
                            "demo/Indy",
                            "add",
                            "(II)I",
                        );
                        Ok(Some(vm.method_handle(&target)?.into()))
                    },
                )),
        )
        .unwrap();
    }

    fn caller(vm: &VM) -> Arc<JavaMethod> {
        let code = Code::new(
            2,
            0,
            vec![Insn::InvokeDynamic {
                name: "plus".into(),
                desc: "(II)I".into(),
                bootstrap: bootstrap_ref(),
                args: vec![Constant::Int(42)],
            }],
        );
        vm.define_class(ClassDefinition::new("demo/Caller").method(MethodDefinition::code(
            "run",
            "()V",
            AccessFlags::STATIC,
            code,
        )))
        .unwrap();
        vm.resolve_method("demo/Caller", "run", "()V").unwrap()
    }

    fn bootstrap_ref() -> HandleRef {
        HandleRef::new(HandleKind::InvokeStatic, "demo/Indy", "bootstrap", BOOTSTRAP_DESC)
    }

    #[test]
    fn call_site_links_once() {
        let vm = test_vm();
        let runs = Arc::new(AtomicUsize::new(0));
        define(&vm, runs.clone());
        let method = caller(&vm);
        let bootstrap = bootstrap_ref();
        let args = [Constant::Int(42)];
        let site = DynamicSite {
            index: 0,
            name: "plus",
            desc: "(II)I",
            bootstrap: &bootstrap,
            args: &args,
        };

        for round in 0..3 {
            let mut frame = Frame::new(0, 2);
            frame.push_int(round).unwrap();
            frame.push_int(10).unwrap();
            vm.invoke_dynamic(&mut frame, &method, site).unwrap();
            assert_eq!(frame.pop_int().unwrap(), round + 10);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(method.call_site(0).unwrap().target().is_some());
    }

    #[test]
    fn concurrent_first_use_links_once() {
        let vm = test_vm();
        let runs = Arc::new(AtomicUsize::new(0));
        define(&vm, runs.clone());
        let method = caller(&vm);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let (vm, method) = (vm.clone(), method.clone());
                std::thread::spawn(move || {
                    let bootstrap = bootstrap_ref();
                    let args = [Constant::Int(42)];
                    let site = DynamicSite {
                        index: 0,
                        name: "plus",
                        desc: "(II)I",
                        bootstrap: &bootstrap,
                        args: &args,
                    };
                    vm.link_call_site(&method, site).unwrap()
                })
            })
            .collect();
        let targets: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(targets.iter().all(|target| Arc::ptr_eq(target, &targets[0])));
    }

    #[test]
    fn handles_dispatch_by_kind() {
        let vm = test_vm();
        vm.define_class(
            ClassDefinition::new("demo/Box")
                .field(FieldDefinition::new("v", "I", AccessFlags::PRIVATE))
                .method(MethodDefinition::native(
                    "<init>",
                    "(I)V",
                    AccessFlags::PUBLIC,
                    |vm, args| {
                        let this = args[0].as_reference()?.cloned();
                        let this = vm.null_checked(this)?;
                        let field = vm.resolve_field("demo/Box", "v", "I")?;
                        vm.write_field(&this, &field, args[1].clone())?;
                        Ok(None)
                    },
                )),
        )
        .unwrap();
        let constructor = vm
            .method_handle(&HandleRef::new(
                HandleKind::NewInvokeSpecial,
                "demo/Box",
                "<init>",
                "(I)V",
            ))
            .unwrap();
        let boxed = vm
            .invoke_handle(&constructor, vec![Value::Int(5)])
            .unwrap()
            .unwrap();
        let boxed = boxed.as_reference().unwrap().unwrap();
        assert_eq!(boxed.class().name(), "demo/Box");
        let field = vm.resolve_field("demo/Box", "v", "I").unwrap();
        assert_eq!(vm.read_field(boxed, &field).unwrap(), Value::Int(5));

        let hash = vm
            .method_handle(&HandleRef::new(
                HandleKind::InvokeVirtual,
                "java/lang/Object",
                "hashCode",
                "()I",
            ))
            .unwrap();
        let error = vm.invoke_handle(&hash, vec![Value::Null]).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/NullPointerException"
        );
    }
}
