use crate::{VM, VmResult};

/// Integer arithmetic that can throw. Float arithmetic never does and
/// lives in the free functions below.
pub trait ArithmeticOps {
    fn int_divide(&self, dividend: i32, divisor: i32) -> VmResult<i32>;
    fn int_remainder(&self, dividend: i32, divisor: i32) -> VmResult<i32>;
    fn long_divide(&self, dividend: i64, divisor: i64) -> VmResult<i64>;
    fn long_remainder(&self, dividend: i64, divisor: i64) -> VmResult<i64>;
}

impl ArithmeticOps for VM {
    fn int_divide(&self, dividend: i32, divisor: i32) -> VmResult<i32> {
        if divisor == 0 {
            return Err(self.division_by_zero());
        }
        Ok(dividend.wrapping_div(divisor))
    }

    fn int_remainder(&self, dividend: i32, divisor: i32) -> VmResult<i32> {
        if divisor == 0 {
            return Err(self.division_by_zero());
        }
        Ok(dividend.wrapping_rem(divisor))
    }

    fn long_divide(&self, dividend: i64, divisor: i64) -> VmResult<i64> {
        if divisor == 0 {
            return Err(self.division_by_zero());
        }
        Ok(dividend.wrapping_div(divisor))
    }

    fn long_remainder(&self, dividend: i64, divisor: i64) -> VmResult<i64> {
        if divisor == 0 {
            return Err(self.division_by_zero());
        }
        Ok(dividend.wrapping_rem(divisor))
    }
}

impl VM {
    fn division_by_zero(&self) -> crate::VmError {
        self.throw_new("java/lang/ArithmeticException", Some("/ by zero"))
    }
}

/// Which result a float comparison yields when either side is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanResult {
    /// `fcmpl` / `dcmpl`
    Less,
    /// `fcmpg` / `dcmpg`
    Greater,
}

impl NanResult {
    fn value(self) -> i32 {
        match self {
            Self::Less => -1,
            Self::Greater => 1,
        }
    }
}

pub fn long_compare(a: i64, b: i64) -> i32 {
    a.cmp(&b) as i32
}

pub fn float_compare(a: f32, b: f32, nan: NanResult) -> i32 {
    a.partial_cmp(&b).map_or(nan.value(), |ordering| ordering as i32)
}

pub fn double_compare(a: f64, b: f64, nan: NanResult) -> i32 {
    a.partial_cmp(&b).map_or(nan.value(), |ordering| ordering as i32)
}

// `as` from a float saturates and maps NaN to zero

pub fn float_to_int(value: f32) -> i32 {
    value as i32
}

pub fn float_to_long(value: f32) -> i64 {
    value as i64
}

pub fn double_to_int(value: f64) -> i32 {
    value as i32
}

pub fn double_to_long(value: f64) -> i64 {
    value as i64
}

pub fn int_shift_left(value: i32, distance: i32) -> i32 {
    value.wrapping_shl(distance as u32)
}

pub fn int_shift_right(value: i32, distance: i32) -> i32 {
    value.wrapping_shr(distance as u32)
}

pub fn int_unsigned_shift_right(value: i32, distance: i32) -> i32 {
    (value as u32).wrapping_shr(distance as u32) as i32
}

pub fn long_shift_left(value: i64, distance: i32) -> i64 {
    value.wrapping_shl(distance as u32)
}

pub fn long_shift_right(value: i64, distance: i32) -> i64 {
    value.wrapping_shr(distance as u32)
}

pub fn long_unsigned_shift_right(value: i64, distance: i32) -> i64 {
    (value as u64).wrapping_shr(distance as u32) as i64
}
