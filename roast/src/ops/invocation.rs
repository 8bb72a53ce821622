use std::{cell::Cell, sync::Arc};

use log::trace;

use crate::{
    Code, Fault, Frame, Implementation, InvokeKind, JavaMethod, MethodDescriptor, MonitorOps,
    ObjectRef, TypeOps, VM, Value, VmResult, interpreter, jit,
};

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of guest call depth, released on drop.
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Option<Self> {
        CALL_DEPTH.with(|depth| {
            let current = depth.get();
            (current < limit).then(|| {
                depth.set(current + 1);
                Self
            })
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub trait InvocationOps {
    /// Looks `owner.name desc` up through the resolver.
    /// Throws `java/lang/NoSuchMethodError` when nothing matches.
    fn resolve_method(&self, owner: &str, name: &str, desc: &str) -> VmResult<Arc<JavaMethod>>;

    /// Calls `method` with one [`Value`] per parameter, receiver first.
    /// The body is whatever implementation is active at entry.
    fn invoke(&self, method: &Arc<JavaMethod>, args: Vec<Value>) -> VmResult<Option<Value>>;

    /// `invokestatic`/`invokespecial`/`invokevirtual`/`invokeinterface`
    /// by symbolic reference.
    fn invoke_method(
        &self,
        frame: &mut Frame,
        kind: InvokeKind,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> VmResult<()>;

    /// Pops the arguments of an already resolved call, dispatches and
    /// pushes a non-void result.
    fn invoke_resolved(
        &self,
        frame: &mut Frame,
        kind: InvokeKind,
        method: &Arc<JavaMethod>,
    ) -> VmResult<()>;

    /// Initializes `owner`, then calls one of its static methods.
    fn call_static(
        &self,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> VmResult<Option<Value>>;
}

/// Pops one value per parameter of `descriptor`, returned in call order.
pub(crate) fn pop_arguments(
    frame: &mut Frame,
    descriptor: &MethodDescriptor,
) -> Result<Vec<Value>, Fault> {
    let mut args = Vec::with_capacity(descriptor.params.len() + 1);
    for param in descriptor.params.iter().rev() {
        args.push(if param.is_wide() {
            frame.pop_wide()?
        } else {
            frame.pop()?
        });
    }
    args.reverse();
    Ok(args)
}

impl InvocationOps for VM {
    fn resolve_method(&self, owner: &str, name: &str, desc: &str) -> VmResult<Arc<JavaMethod>> {
        let class = self.load_class(owner)?;
        self.resolver()
            .resolve_method(&class, name, desc)
            .ok_or_else(|| {
                self.throw_new(
                    "java/lang/NoSuchMethodError",
                    Some(&format!("{owner}.{name}{desc}")),
                )
            })
    }

    fn invoke(&self, method: &Arc<JavaMethod>, args: Vec<Value>) -> VmResult<Option<Value>> {
        let Some(_depth) = DepthGuard::enter(self.settings().max_call_depth) else {
            return Err(self.throw_new(
                "java/lang/StackOverflowError",
                Some(&method.qualified_name()),
            ));
        };
        let count = method.record_invocation();
        if self
            .settings()
            .translate_after
            .is_some_and(|threshold| count >= threshold)
        {
            jit::translate(method);
        }

        let monitor = if method.is_synchronized() {
            Some(self.monitor_of(method, &args)?)
        } else {
            None
        };
        if let Some(monitor) = &monitor {
            self.enter_monitor(Some(monitor))?;
        }
        let result = self.run(method, args);
        match &monitor {
            Some(monitor) => {
                let released = self.exit_monitor(Some(monitor));
                result.and_then(|value| released.map(|()| value))
            }
            None => result,
        }
    }

    fn invoke_method(
        &self,
        frame: &mut Frame,
        kind: InvokeKind,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> VmResult<()> {
        let method = self.resolve_method(owner, name, desc)?;
        self.invoke_resolved(frame, kind, &method)
    }

    fn invoke_resolved(
        &self,
        frame: &mut Frame,
        kind: InvokeKind,
        method: &Arc<JavaMethod>,
    ) -> VmResult<()> {
        if (kind == InvokeKind::Static) != method.is_static() {
            return Err(self.throw_new(
                "java/lang/IncompatibleClassChangeError",
                Some(&format!("{kind:?} call of {}", method.qualified_name())),
            ));
        }
        let mut args = pop_arguments(frame, method.descriptor())?;
        let target = if kind == InvokeKind::Static {
            if let Some(owner) = method.owner() {
                self.initialize(&owner)?;
            }
            method.clone()
        } else {
            let receiver = self.null_checked(frame.pop_reference()?)?;
            let target = self.dispatch_target(kind, method, &receiver)?;
            args.insert(0, receiver.into());
            target
        };
        trace!("invoke {}", target.qualified_name());
        if let Some(result) = self.invoke(&target, args)? {
            frame.push_value(result)?;
        }
        Ok(())
    }

    fn call_static(
        &self,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        let class = self.load_class(owner)?;
        self.initialize(&class)?;
        let method = self.resolve_method(owner, name, desc)?;
        if !method.is_static() {
            return Err(self.throw_new(
                "java/lang/IncompatibleClassChangeError",
                Some(&method.qualified_name()),
            ));
        }
        self.invoke(&method, args)
    }
}

impl VM {
    /// Method a non-static call on `receiver` runs.
    pub(crate) fn dispatch_target(
        &self,
        kind: InvokeKind,
        method: &Arc<JavaMethod>,
        receiver: &ObjectRef,
    ) -> VmResult<Arc<JavaMethod>> {
        if kind == InvokeKind::Special {
            return Ok(method.clone());
        }
        if kind == InvokeKind::Interface {
            let implemented = method
                .owner()
                .is_none_or(|owner| self.is_instance(receiver, &owner));
            if !implemented {
                return Err(self.throw_new(
                    "java/lang/IncompatibleClassChangeError",
                    Some(&format!(
                        "{} does not implement {}",
                        receiver.class().name(),
                        method.owner_name()
                    )),
                ));
            }
        }
        self.resolver()
            .select_virtual(receiver.class(), method.name(), method.desc())
            .ok_or_else(|| {
                self.throw_new(
                    "java/lang/AbstractMethodError",
                    Some(&method.qualified_name()),
                )
            })
    }

    /// receiver, or the class mirror for static methods
    fn monitor_of(&self, method: &JavaMethod, args: &[Value]) -> VmResult<ObjectRef> {
        if method.is_static() {
            let owner = self.load_class(method.owner_name())?;
            return Ok(owner.mirror()?.clone());
        }
        let receiver = args.first().map(Value::as_reference).transpose()?.flatten();
        self.null_checked(receiver.cloned())
    }

    fn run(&self, method: &Arc<JavaMethod>, args: Vec<Value>) -> VmResult<Option<Value>> {
        match method.implementation() {
            Implementation::Interpreted(code) => {
                let frame = self.entry_frame(method, &code, args)?;
                interpreter::execute(self, method, &code, frame)
            }
            Implementation::Compiled(compiled) => {
                let code = method
                    .code()
                    .ok_or_else(|| Fault::NoCode(method.qualified_name()))?;
                let frame = self.entry_frame(method, code, args)?;
                compiled.execute(self, frame)
            }
            Implementation::Native(function) => function(self, &args),
            Implementation::Abstract => Err(self.throw_new(
                "java/lang/AbstractMethodError",
                Some(&method.qualified_name()),
            )),
        }
    }

    fn entry_frame(
        &self,
        method: &JavaMethod,
        code: &Code,
        args: Vec<Value>,
    ) -> Result<Frame, Fault> {
        let max_locals = usize::from(code.max_locals).max(method.parameter_slots());
        let max_stack = match code.max_stack {
            0 => self.settings().operand_stack,
            declared => usize::from(declared),
        };
        let mut frame = Frame::new(max_locals, max_stack);
        frame.store_arguments(args)?;
        Ok(frame)
    }
}
