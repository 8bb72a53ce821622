use crate::{VM, VMCreateInfo};

/// VM with reproducible addresses.
pub(crate) fn test_vm() -> VM {
    VM::new(VMCreateInfo {
        seed: Some(42),
        ..Default::default()
    })
    .unwrap()
}
