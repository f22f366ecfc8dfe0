use std::fmt::Display;

/// Dynamically-typed value reported by the runtime. Cost-analysis properties are always [`Value::F32`]s while
/// [`Device`](crate::Device) attributes can be of any type.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum Value {
    /// Boolean flag, such as whether a device supports a particular feature.
    Bool(bool),

    /// Signed integer attribute (e.g., a core index).
    I64(i64),

    /// List of signed integers, typically device coordinates in a mesh.
    I64List(Vec<i64>),

    /// Single-precision float. Every cost-analysis property uses this variant.
    F32(f32),

    /// Free-form text, such as a device kind or a hardware revision.
    String(String),
}

/// Implements a constructor, an [`Option`]-returning accessor, and a [`From`] conversion for each [`Value`] variant.
macro_rules! value_variant {
    ($variant:ident, $constructor:ident, $accessor:ident -> $output:ty, $type:ty, |$value:ident| $borrow:expr) => {
        impl Value {
            #[doc = concat!("Creates a new [`Value::", stringify!($variant), "`].")]
            pub fn $constructor<V: Into<$type>>(value: V) -> Self {
                Self::$variant(value.into())
            }

            #[doc = concat!("Returns the underlying value if this is a [`Value::", stringify!($variant), "`].")]
            pub fn $accessor(&self) -> Option<$output> {
                match self {
                    Self::$variant($value) => Some($borrow),
                    _ => None,
                }
            }
        }

        impl From<$type> for Value {
            fn from(value: $type) -> Self {
                Self::$variant(value)
            }
        }
    };
}

value_variant!(Bool, r#bool, as_bool -> bool, bool, |value| *value);
value_variant!(I64, i64, as_i64 -> i64, i64, |value| *value);
value_variant!(I64List, i64_list, as_i64_list -> &[i64], Vec<i64>, |value| value.as_slice());
value_variant!(F32, f32, as_f32 -> f32, f32, |value| *value);
value_variant!(String, string, as_str -> &str, String, |value| value.as_str());

impl Value {
    /// Returns this value as an [`f64`] if it is a [`Value::I64`] or a [`Value::F32`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I64(value) => Some(*value as f64),
            Self::F32(value) => Some(f64::from(*value)),
            _ => None,
        }
    }
}

impl<const N: usize> From<[i64; N]> for Value {
    fn from(value: [i64; N]) -> Self {
        Self::I64List(value.to_vec())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl Display for Value {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::I64(value) => write!(formatter, "{value}"),
            Self::I64List(values) => {
                write!(formatter, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(formatter, ", ")?;
                    }
                    write!(formatter, "{value}")?;
                }
                write!(formatter, "]")
            }
            Self::F32(value) => write!(formatter, "{value}"),
            Self::String(value) => write!(formatter, "{value:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::r#bool(true), Value::from(true));
        assert_eq!(Value::i64(-7), Value::from(-7i64));
        assert_eq!(Value::i64_list([4, 2]), Value::from(vec![4, 2]));
        assert_eq!(Value::f32(0.5f32), Value::from(0.5f32));
        assert_eq!(Value::string("cpu"), Value::from("cpu"));
        assert_ne!(Value::f32(0.0f32), Value::i64(0));
        assert!(Value::f32(1.0f32) < Value::f32(2.0f32));

        assert_eq!(Value::r#bool(true).as_bool(), Some(true));
        assert_eq!(Value::i64(12).as_i64(), Some(12));
        assert_eq!(Value::i64_list([3, 1]).as_i64_list(), Some([3, 1].as_slice()));
        assert_eq!(Value::f32(2.5f32).as_f32(), Some(2.5));
        assert_eq!(Value::string("flops").as_str(), Some("flops"));
        assert_eq!(Value::i64(12).as_f32(), None);
        assert_eq!(Value::i64_list([1]).as_str(), None);

        assert_eq!(Value::i64(12).as_f64(), Some(12.0));
        assert_eq!(Value::f32(0.25f32).as_f64(), Some(0.25));
        assert_eq!(Value::r#bool(false).as_f64(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::r#bool(false).to_string(), "false");
        assert_eq!(Value::i64(8).to_string(), "8");
        assert_eq!(Value::i64_list([2, 4]).to_string(), "[2, 4]");
        assert_eq!(Value::i64_list(Vec::<i64>::new()).to_string(), "[]");
        assert_eq!(Value::f32(1.5f32).to_string(), "1.5");
        assert_eq!(Value::string("tpu").to_string(), "\"tpu\"");
    }
}
