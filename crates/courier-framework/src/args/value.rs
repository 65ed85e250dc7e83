use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::ArgumentError;

/// A value produced by a resolver for one token-consuming parameter.
#[derive(Clone)]
pub enum ArgValue {
    /// An optional parameter with no token.
    Absent,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// The items of a vararg parameter.
    List(Vec<ArgValue>),
    /// The output of a custom resolver.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ArgValue {
    /// Wraps a custom resolver output.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Text(_) => "text",
            Self::Int(_) => "integer",
            Self::Float(_) => "number",
            Self::Bool(_) => "boolean",
            Self::List(_) => "list",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Self::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Token-consuming values bound for one invocation, in declaration order.
///
/// Value extractors pop from the front as the handler's parameters are
/// extracted.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BoundArgs {
    values: VecDeque<ArgValue>,
}

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: ArgValue) {
        self.values.push_back(value);
    }

    /// Takes the next value, or reports that the handler asked for more
    /// values than were declared.
    pub fn next_value(&mut self, expected: &'static str) -> Result<ArgValue, ArgumentError> {
        self.values.pop_front().ok_or(ArgumentError::TypeMismatch {
            expected,
            found: "nothing",
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.values.iter()
    }
}

impl FromIterator<ArgValue> for BoundArgs {
    fn from_iter<I: IntoIterator<Item = ArgValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Conversion from a bound [`ArgValue`] to a handler parameter type.
pub trait FromArgValue: Sized + Send + 'static {
    /// Name used in mismatch errors.
    const EXPECTED: &'static str;

    fn from_arg(value: ArgValue) -> Result<Self, ArgumentError>;
}

fn mismatch<T: FromArgValue>(value: &ArgValue) -> ArgumentError {
    ArgumentError::TypeMismatch {
        expected: T::EXPECTED,
        found: value.kind(),
    }
}

impl FromArgValue for String {
    const EXPECTED: &'static str = "text";

    fn from_arg(value: ArgValue) -> Result<Self, ArgumentError> {
        match value {
            ArgValue::Text(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromArgValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_arg(value: ArgValue) -> Result<Self, ArgumentError> {
        match value {
            ArgValue::Float(n) => Ok(n),
            ArgValue::Int(n) => Ok(n as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromArgValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_arg(value: ArgValue) -> Result<Self, ArgumentError> {
        match value {
            ArgValue::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! impl_from_arg_int {
    ($($ty:ty),*) => {
        $(
            impl FromArgValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn from_arg(value: ArgValue) -> Result<Self, ArgumentError> {
                    match value {
                        ArgValue::Int(n) => <$ty>::try_from(n).map_err(|_| {
                            ArgumentError::TypeMismatch {
                                expected: Self::EXPECTED,
                                found: "out-of-range integer",
                            }
                        }),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

impl_from_arg_int!(i64, i32, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_narrowing() {
        assert_eq!(u32::from_arg(ArgValue::Int(7)).unwrap(), 7);
        assert!(matches!(
            u32::from_arg(ArgValue::Int(-1)),
            Err(ArgumentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_mismatch_names_kinds() {
        let err = String::from_arg(ArgValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::TypeMismatch {
                expected: "text",
                found: "integer"
            }
        );
    }

    #[test]
    fn test_bound_args_pop_order() {
        let mut args: BoundArgs = [ArgValue::Text("a".into()), ArgValue::Int(2)]
            .into_iter()
            .collect();
        assert_eq!(args.next_value("text").unwrap(), ArgValue::Text("a".into()));
        assert_eq!(args.next_value("integer").unwrap(), ArgValue::Int(2));
        assert!(args.next_value("integer").is_err());
    }
}
