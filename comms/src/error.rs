use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for key construction and decoding.
pub type Result<T> = std::result::Result<T, KeyErr>;

/// Error returned whenever a routing key can't be built or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyErr {
    /// The base route key has bits set inside the phase, class or index fields.
    RouteOverlap { route: u32 },
    /// The unit or block index doesn't fit in the index field.
    IndexOutOfRange { index: usize },
    /// The class bits of a received key don't name any message class.
    UnknownClass { key: u32 },
}

impl Display for KeyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyErr::RouteOverlap { route } => {
                write!(f, "route key 0x{route:08x} overlaps the low key fields")
            }
            KeyErr::IndexOutOfRange { index } => {
                write!(f, "index {index} doesn't fit in the key index field")
            }
            KeyErr::UnknownClass { key } => {
                write!(f, "key 0x{key:08x} carries an unknown message class")
            }
        }
    }
}

impl Error for KeyErr {}
