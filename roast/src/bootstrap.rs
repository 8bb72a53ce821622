//! Types the VM itself constructs or links against, defined at creation.

use crate::{
    AccessFlags, ArrayOps, ClassDefinition, Fault, FieldDefinition, FieldOps, FieldType,
    MethodDefinition, ObjectRef, VM, Value, VmResult,
};

/// Primitive classes; `None` is `void`.
pub(crate) const PRIMITIVES: [Option<FieldType>; 9] = [
    Some(FieldType::Boolean),
    Some(FieldType::Byte),
    Some(FieldType::Char),
    Some(FieldType::Short),
    Some(FieldType::Int),
    Some(FieldType::Long),
    Some(FieldType::Float),
    Some(FieldType::Double),
    None,
];

/// Interfaces every array class implements.
pub(crate) const ARRAY_INTERFACES: [&str; 2] = ["java/lang/Cloneable", "java/io/Serializable"];

/// Link order at startup. `Object` and `Class` lead, the rest may then
/// get their mirrors immediately.
pub(crate) const CORE_CLASS_NAMES: [&str; 33] = [
    "java/lang/Object",
    "java/lang/Class",
    "java/lang/String",
    "java/lang/System",
    "java/lang/Cloneable",
    "java/io/Serializable",
    "java/lang/invoke/MethodHandle",
    "java/lang/invoke/MethodType",
    "java/lang/Throwable",
    "java/lang/Exception",
    "java/lang/RuntimeException",
    "java/lang/NullPointerException",
    "java/lang/ArithmeticException",
    "java/lang/IndexOutOfBoundsException",
    "java/lang/ArrayIndexOutOfBoundsException",
    "java/lang/NegativeArraySizeException",
    "java/lang/ArrayStoreException",
    "java/lang/ClassCastException",
    "java/lang/IllegalMonitorStateException",
    "java/lang/Error",
    "java/lang/LinkageError",
    "java/lang/NoClassDefFoundError",
    "java/lang/ExceptionInInitializerError",
    "java/lang/ClassCircularityError",
    "java/lang/IncompatibleClassChangeError",
    "java/lang/NoSuchFieldError",
    "java/lang/NoSuchMethodError",
    "java/lang/AbstractMethodError",
    "java/lang/InstantiationError",
    "java/lang/VirtualMachineError",
    "java/lang/StackOverflowError",
    "java/lang/OutOfMemoryError",
    "java/lang/BootstrapMethodError",
];

/// `(name, superclass)` of every throwable below `Throwable`.
const THROWABLES: [(&str, &str); 24] = [
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    (
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
    ),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/Error", "java/lang/Throwable"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    ("java/lang/ClassCircularityError", "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/InstantiationError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/BootstrapMethodError", "java/lang/LinkageError"),
];

const STRING: &str = "Ljava/lang/String;";
const THROWABLE: &str = "Ljava/lang/Throwable;";

fn receiver(vm: &VM, args: &[Value]) -> VmResult<ObjectRef> {
    let this = args.first().map(Value::as_reference).transpose()?.flatten();
    vm.null_checked(this.cloned())
}

fn nothing(_: &VM, _: &[Value]) -> VmResult<Option<Value>> {
    Ok(None)
}

fn object() -> ClassDefinition {
    ClassDefinition::new("java/lang/Object")
        .root()
        .method(MethodDefinition::native("<init>", "()V", AccessFlags::PUBLIC, nothing))
        .method(MethodDefinition::native(
            "hashCode",
            "()I",
            AccessFlags::PUBLIC,
            |vm, args| {
                let address = receiver(vm, args)?.address();
                Ok(Some(Value::Int((address ^ (address >> 32)) as i32)))
            },
        ))
        .method(MethodDefinition::native(
            "getClass",
            "()Ljava/lang/Class;",
            AccessFlags::PUBLIC | AccessFlags::FINAL,
            |vm, args| Ok(Some(receiver(vm, args)?.class().mirror()?.clone().into())),
        ))
}

fn class() -> ClassDefinition {
    ClassDefinition::new("java/lang/Class")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
        .method(MethodDefinition::native(
            "getName",
            "()Ljava/lang/String;",
            AccessFlags::PUBLIC,
            |vm, args| {
                let mirror = receiver(vm, args)?;
                let name = mirror
                    .mirrored_class()
                    .map(|class| class.name().replace('/', "."))
                    .unwrap_or_default();
                Ok(Some(vm.intern(&name)?.into()))
            },
        ))
}

fn string() -> ClassDefinition {
    ClassDefinition::new("java/lang/String")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
        .implements("java/io/Serializable")
        .field(FieldDefinition::new(
            "value",
            "[C",
            AccessFlags::PRIVATE | AccessFlags::FINAL,
        ))
        .method(MethodDefinition::native(
            "length",
            "()I",
            AccessFlags::PUBLIC,
            |vm, args| {
                let chars = string_chars(vm, args)?;
                let length = chars.and_then(|chars| chars.array_length()).unwrap_or(0);
                Ok(Some(Value::Int(length as i32)))
            },
        ))
        .method(MethodDefinition::native(
            "charAt",
            "(I)C",
            AccessFlags::PUBLIC,
            |vm, args| {
                let index = args.get(1).map_or(Ok(0), Value::as_int)?;
                let chars = vm.null_checked(string_chars(vm, args)?)?;
                Ok(Some(vm.load_element(&chars, index)?))
            },
        ))
}

fn string_chars(vm: &VM, args: &[Value]) -> VmResult<Option<ObjectRef>> {
    let this = receiver(vm, args)?;
    let field = vm.resolve_field("java/lang/String", "value", "[C")?;
    Ok(vm.read_field(&this, &field)?.as_reference()?.cloned())
}

fn system() -> ClassDefinition {
    ClassDefinition::new("java/lang/System")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
        .method(MethodDefinition::native(
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            |vm, args| {
                let [src, src_pos, dst, dst_pos, length] = args else {
                    return Err(Fault::StackUnderflow.into());
                };
                vm.array_copy(
                    src.as_reference()?,
                    src_pos.as_int()?,
                    dst.as_reference()?,
                    dst_pos.as_int()?,
                    length.as_int()?,
                )?;
                Ok(None)
            },
        ))
}

fn throwable() -> ClassDefinition {
    ClassDefinition::new("java/lang/Throwable")
        .implements("java/io/Serializable")
        .field(FieldDefinition::new("detailMessage", STRING, AccessFlags::PRIVATE))
        .field(FieldDefinition::new("cause", THROWABLE, AccessFlags::PRIVATE))
        .method(MethodDefinition::native("<init>", "()V", AccessFlags::PUBLIC, nothing))
        .method(MethodDefinition::native(
            "<init>",
            "(Ljava/lang/String;)V",
            AccessFlags::PUBLIC,
            |vm, args| {
                let this = receiver(vm, args)?;
                let message = args.get(1).cloned().unwrap_or_default();
                let field = vm.resolve_field("java/lang/Throwable", "detailMessage", STRING)?;
                vm.write_field(&this, &field, message)?;
                Ok(None)
            },
        ))
        .method(MethodDefinition::native(
            "getMessage",
            "()Ljava/lang/String;",
            AccessFlags::PUBLIC,
            |vm, args| {
                let field = vm.resolve_field("java/lang/Throwable", "detailMessage", STRING)?;
                Ok(Some(vm.read_field(&receiver(vm, args)?, &field)?))
            },
        ))
        .method(MethodDefinition::native(
            "getCause",
            "()Ljava/lang/Throwable;",
            AccessFlags::PUBLIC,
            |vm, args| {
                let field = vm.resolve_field("java/lang/Throwable", "cause", THROWABLE)?;
                Ok(Some(vm.read_field(&receiver(vm, args)?, &field)?))
            },
        ))
}

pub(crate) fn core_classes() -> Vec<ClassDefinition> {
    let mut classes = vec![
        object(),
        class(),
        string(),
        system(),
        ClassDefinition::interface("java/lang/Cloneable"),
        ClassDefinition::interface("java/io/Serializable"),
        ClassDefinition::new("java/lang/invoke/MethodHandle")
            .access(AccessFlags::PUBLIC | AccessFlags::ABSTRACT | AccessFlags::SUPER),
        ClassDefinition::new("java/lang/invoke/MethodType")
            .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
            .implements("java/io/Serializable"),
        throwable(),
    ];
    classes.extend(
        THROWABLES
            .iter()
            .map(|(name, parent)| ClassDefinition::new(name).extends(parent)),
    );
    classes
}
