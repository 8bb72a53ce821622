use crate::{Fault, ObjectRef, Value};

/// Operand stack and local variables of one activation.
#[derive(Debug, Clone)]
pub struct Frame {
    locals: Vec<Value>,
    stack: Vec<Value>,
    max_stack: usize,
}

impl Frame {
    pub fn new(max_locals: usize, max_stack: usize) -> Self {
        Self {
            locals: vec![Value::Top; max_locals],
            stack: Vec::with_capacity(max_stack),
            max_stack,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn max_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    pub fn push(&mut self, value: Value) -> Result<(), Fault> {
        if self.stack.len() >= self.max_stack {
            return Err(Fault::StackOverflow(self.max_stack));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    pub fn peek(&self, depth: usize) -> Result<&Value, Fault> {
        let len = self.stack.len();
        if depth >= len {
            return Err(Fault::StackUnderflow);
        }
        Ok(&self.stack[len - 1 - depth])
    }

    /// pushes a two-slot value followed by its padding slot
    pub fn push_wide(&mut self, value: Value) -> Result<(), Fault> {
        self.push(value)?;
        self.push(Value::Top)
    }

    pub fn pop_wide(&mut self) -> Result<Value, Fault> {
        match self.pop()? {
            Value::Top => {}
            other => {
                return Err(Fault::SlotMismatch {
                    expected: "top",
                    found: other.kind_name(),
                });
            }
        }
        self.pop()
    }

    /// push honouring the value's width
    pub fn push_value(&mut self, value: Value) -> Result<(), Fault> {
        if value.is_wide() {
            self.push_wide(value)
        } else {
            self.push(value)
        }
    }

    pub fn push_int(&mut self, value: i32) -> Result<(), Fault> {
        self.push(Value::Int(value))
    }

    pub fn push_long(&mut self, value: i64) -> Result<(), Fault> {
        self.push_wide(Value::Long(value))
    }

    pub fn push_float(&mut self, value: f32) -> Result<(), Fault> {
        self.push(Value::Float(value))
    }

    pub fn push_double(&mut self, value: f64) -> Result<(), Fault> {
        self.push_wide(Value::Double(value))
    }

    pub fn push_reference(&mut self, object: Option<ObjectRef>) -> Result<(), Fault> {
        self.push(object.into())
    }

    pub fn pop_int(&mut self) -> Result<i32, Fault> {
        self.pop()?.as_int()
    }

    pub fn pop_long(&mut self) -> Result<i64, Fault> {
        self.pop_wide()?.as_long()
    }

    pub fn pop_float(&mut self) -> Result<f32, Fault> {
        self.pop()?.as_float()
    }

    pub fn pop_double(&mut self) -> Result<f64, Fault> {
        self.pop_wide()?.as_double()
    }

    pub fn pop_reference(&mut self) -> Result<Option<ObjectRef>, Fault> {
        Ok(self.pop()?.as_reference()?.cloned())
    }

    /// Pops `count` slots, returning them bottom first.
    pub fn pop_slots(&mut self, count: usize) -> Result<Vec<Value>, Fault> {
        let len = self.stack.len();
        if count > len {
            return Err(Fault::StackUnderflow);
        }
        Ok(self.stack.split_off(len - count))
    }

    /// Pushes raw slots, bottom first.
    pub fn push_slots(&mut self, slots: impl IntoIterator<Item = Value>) -> Result<(), Fault> {
        for slot in slots {
            self.push(slot)?;
        }
        Ok(())
    }

    fn local(&self, index: usize) -> Result<&Value, Fault> {
        self.locals.get(index).ok_or(Fault::LocalOutOfRange(index))
    }

    pub fn load(&self, index: usize) -> Result<Value, Fault> {
        self.local(index).cloned()
    }

    pub fn load_wide(&self, index: usize) -> Result<Value, Fault> {
        match self.local(index + 1)? {
            Value::Top => self.load(index),
            other => Err(Fault::SlotMismatch {
                expected: "top",
                found: other.kind_name(),
            }),
        }
    }

    pub fn store(&mut self, index: usize, value: Value) -> Result<(), Fault> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or(Fault::LocalOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    pub fn store_wide(&mut self, index: usize, value: Value) -> Result<(), Fault> {
        if index + 1 >= self.locals.len() {
            return Err(Fault::LocalOutOfRange(index + 1));
        }
        self.locals[index] = value;
        self.locals[index + 1] = Value::Top;
        Ok(())
    }

    /// Stores arguments into consecutive locals from slot 0, two slots
    /// for wide values. Returns the next free slot.
    pub fn store_arguments(
        &mut self,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<usize, Fault> {
        let mut slot = 0;
        for arg in args {
            if arg.is_wide() {
                self.store_wide(slot, arg)?;
                slot += 2;
            } else {
                self.store(slot, arg)?;
                slot += 1;
            }
        }
        Ok(slot)
    }
}
