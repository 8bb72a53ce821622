use std::fmt;

use crate::Fault;

/// A parsed field descriptor (`I`, `J`, `Ljava/lang/String;`, `[[D`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(desc: &str) -> Result<Self, Fault> {
        match Self::parse_prefix(desc) {
            Some((ty, "")) => Ok(ty),
            _ => Err(Fault::MalformedDescriptor(desc.to_owned())),
        }
    }

    fn parse_prefix(desc: &str) -> Option<(Self, &str)> {
        let mut chars = desc.chars();
        let ty = match chars.next()? {
            'B' => Self::Byte,
            'C' => Self::Char,
            'D' => Self::Double,
            'F' => Self::Float,
            'I' => Self::Int,
            'J' => Self::Long,
            'S' => Self::Short,
            'Z' => Self::Boolean,
            'L' => {
                let rest = chars.as_str();
                let end = rest.find(';')?;
                if end == 0 {
                    return None;
                }
                return Some((Self::Object(rest[..end].to_owned()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(chars.as_str())?;
                return Some((Self::Array(Box::new(component)), rest));
            }
            _ => return None,
        };
        Some((ty, chars.as_str()))
    }

    /// Type named by a class-loader name: array names are descriptors,
    /// everything else is an internal class name.
    pub fn from_internal_name(name: &str) -> Result<Self, Fault> {
        if name.starts_with('[') {
            Self::parse(name)
        } else if name.is_empty() {
            Err(Fault::MalformedDescriptor(name.to_owned()))
        } else {
            Ok(Self::Object(name.to_owned()))
        }
    }

    /// name the class loader knows this type by
    pub fn internal_name(&self) -> String {
        match self {
            Self::Object(name) => name.clone(),
            Self::Array(_) => self.to_string(),
            primitive => primitive.primitive_name().unwrap_or_default().to_owned(),
        }
    }

    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Double => "double",
            Self::Float => "float",
            Self::Int => "int",
            Self::Long => "long",
            Self::Short => "short",
            Self::Boolean => "boolean",
            Self::Object(_) | Self::Array(_) => return None,
        })
    }

    /// bytes occupied inside an object or array
    pub fn size(&self) -> usize {
        match self {
            Self::Long | Self::Double => 8,
            Self::Int | Self::Float => 4,
            Self::Short | Self::Char => 2,
            Self::Byte | Self::Boolean => 1,
            Self::Object(_) | Self::Array(_) => 8,
        }
    }

    /// operand stack / local variable slots
    pub fn slots(&self) -> usize {
        if self.is_wide() { 2 } else { 1 }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference()
    }

    pub fn component(&self) -> Option<&FieldType> {
        match self {
            Self::Array(component) => Some(component),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Double => f.write_str("D"),
            Self::Float => f.write_str("F"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Short => f.write_str("S"),
            Self::Boolean => f.write_str("Z"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// A parsed method descriptor, `None` return means `V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<Self, Fault> {
        let malformed = || Fault::MalformedDescriptor(desc.to_owned());
        let mut rest = desc.strip_prefix('(').ok_or_else(malformed)?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = FieldType::parse_prefix(rest).ok_or_else(malformed)?;
            params.push(ty);
            rest = tail;
        }
        let ret = match &rest[1..] {
            "V" => None,
            ret => Some(FieldType::parse(ret).map_err(|_| malformed())?),
        };
        Ok(Self { params, ret })
    }

    /// slots taken by the arguments, without a receiver
    pub fn arg_slots(&self) -> usize {
        self.params.iter().map(FieldType::slots).sum()
    }
}
