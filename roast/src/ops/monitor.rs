use log::trace;

use crate::{Frame, ObjectRef, VM, VmResult};

pub trait MonitorOps {
    /// `monitorenter`
    fn monitor_enter(&self, frame: &mut Frame) -> VmResult<()>;
    /// `monitorexit`
    fn monitor_exit(&self, frame: &mut Frame) -> VmResult<()>;
    fn enter_monitor(&self, object: Option<&ObjectRef>) -> VmResult<()>;
    /// Throws `java/lang/IllegalMonitorStateException` when the calling
    /// thread does not own the monitor.
    fn exit_monitor(&self, object: Option<&ObjectRef>) -> VmResult<()>;
}

impl MonitorOps for VM {
    fn monitor_enter(&self, frame: &mut Frame) -> VmResult<()> {
        let object = frame.pop_reference()?;
        self.enter_monitor(object.as_ref())
    }

    fn monitor_exit(&self, frame: &mut Frame) -> VmResult<()> {
        let object = frame.pop_reference()?;
        self.exit_monitor(object.as_ref())
    }

    fn enter_monitor(&self, object: Option<&ObjectRef>) -> VmResult<()> {
        let object = self.null_checked(object.cloned())?;
        trace!("monitor enter {:#x}", object.address());
        self.synchronizer().enter(object.address());
        Ok(())
    }

    fn exit_monitor(&self, object: Option<&ObjectRef>) -> VmResult<()> {
        let object = self.null_checked(object.cloned())?;
        trace!("monitor exit {:#x}", object.address());
        if self.synchronizer().exit(object.address()) {
            Ok(())
        } else {
            Err(self.throw_new("java/lang/IllegalMonitorStateException", None))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{Value, testing::test_vm};

    #[test]
    fn reentrant_enter_and_balanced_exit() {
        let vm = test_vm();
        let object = vm.new_string("lock").unwrap();
        vm.enter_monitor(Some(&object)).unwrap();
        vm.enter_monitor(Some(&object)).unwrap();
        vm.exit_monitor(Some(&object)).unwrap();
        vm.exit_monitor(Some(&object)).unwrap();
        let error = vm.exit_monitor(Some(&object)).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/IllegalMonitorStateException"
        );
    }

    #[test]
    fn null_monitor_throws() {
        let vm = test_vm();
        let mut frame = Frame::new(0, 1);
        frame.push(Value::Null).unwrap();
        let error = vm.monitor_enter(&mut frame).unwrap_err();
        assert_eq!(
            error.thrown().unwrap().class().name(),
            "java/lang/NullPointerException"
        );
    }

    #[test]
    fn other_threads_wait_for_release() {
        let vm = test_vm();
        let object = vm.new_string("lock").unwrap();
        vm.enter_monitor(Some(&object)).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let (vm, object, acquired) = (vm.clone(), object.clone(), acquired.clone());
            thread::spawn(move || {
                assert!(vm.exit_monitor(Some(&object)).is_err());
                vm.enter_monitor(Some(&object)).unwrap();
                acquired.store(true, Ordering::SeqCst);
                vm.exit_monitor(Some(&object)).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(30));
        assert!(!acquired.load(Ordering::SeqCst));
        vm.exit_monitor(Some(&object)).unwrap();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
