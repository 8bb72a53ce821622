use log::trace;

use crate::{Code, Frame, ObjectRef, TypeOps, VM, VmError, VmResult};

pub trait ExceptionOps {
    /// `athrow`: pops the exception and wraps it for propagation.
    fn athrow(&self, frame: &mut Frame) -> VmError;

    /// Throwing null throws a fresh `java/lang/NullPointerException`.
    fn throw(&self, exception: Option<ObjectRef>) -> VmError;

    /// First handler of `code` covering `pc` whose catch type accepts
    /// `exception`, as an instruction index.
    fn find_handler(&self, code: &Code, pc: usize, exception: &ObjectRef)
    -> VmResult<Option<usize>>;
}

impl ExceptionOps for VM {
    fn athrow(&self, frame: &mut Frame) -> VmError {
        match frame.pop_reference() {
            Ok(exception) => self.throw(exception),
            Err(fault) => fault.into(),
        }
    }

    fn throw(&self, exception: Option<ObjectRef>) -> VmError {
        match exception {
            Some(exception) => VmError::Thrown(exception),
            None => self.throw_new("java/lang/NullPointerException", None),
        }
    }

    fn find_handler(
        &self,
        code: &Code,
        pc: usize,
        exception: &ObjectRef,
    ) -> VmResult<Option<usize>> {
        for handler in &code.handlers {
            let range = code.target(handler.start)?..code.target(handler.end)?;
            if !range.contains(&pc) {
                continue;
            }
            let catches = match &handler.catch_type {
                None => true,
                Some(name) => self.is_instance(exception, &*self.load_class(name)?),
            };
            if catches {
                let target = code.target(handler.handler)?;
                trace!(
                    "{} at {pc} caught by handler at {target}",
                    exception.class().name()
                );
                return Ok(Some(target));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Insn, Label, Opcode, TryCatchBlock, Value, testing::test_vm};

    fn guarded() -> Code {
        Code::new(
            1,
            0,
            vec![
                Insn::Label(Label(0)),
                Insn::Op(Opcode::AThrow),
                Insn::Label(Label(1)),
                Insn::Label(Label(2)),
                Insn::Op(Opcode::Return),
                Insn::Label(Label(3)),
                Insn::Op(Opcode::Return),
            ],
        )
        .with_handler(TryCatchBlock {
            start: Label(0),
            end: Label(1),
            handler: Label(2),
            catch_type: Some("java/lang/ArithmeticException".into()),
        })
        .with_handler(TryCatchBlock {
            start: Label(0),
            end: Label(1),
            handler: Label(3),
            catch_type: None,
        })
    }

    #[test]
    fn throwing_null_throws_npe() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 1);
        frame.push(Value::Null).unwrap();
        let error = vm.athrow(&mut frame);
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/NullPointerException"
        );
    }

    #[test]
    fn handlers_match_in_order() {
        let vm = test_vm();
        let code = guarded();
        let arithmetic = vm
            .new_throwable("java/lang/ArithmeticException", None, None)
            .unwrap();
        let other = vm
            .new_throwable("java/lang/IllegalMonitorStateException", None, None)
            .unwrap();
        assert_eq!(vm.find_handler(&code, 1, &arithmetic).unwrap(), Some(3));
        assert_eq!(vm.find_handler(&code, 1, &other).unwrap(), Some(5));
        assert_eq!(vm.find_handler(&code, 4, &other).unwrap(), None);
    }
}
