//! Engine error type.

use core::fmt;

/// Error produced by serialization, deserialization, or converter-graph
/// construction.
///
/// Wire-level decode failures arrive through the [`Wire`](Error::Wire)
/// variant; everything else is a schema or usage error and is never retried.
#[derive(Debug)]
pub enum Error {
    /// Token-level failure from the wire layer.
    Wire(carapace_msgpack::Error),
    /// I/O failure from an async source or sink.
    Io(std::io::Error),
    /// A cancellation token was observed.
    Cancelled,
    /// The converter-call depth budget was exhausted.
    DepthLimitExceeded {
        /// The configured budget.
        limit: u32,
    },
    /// A concurrent resolver saw this type's converter fail to construct.
    ConverterUnavailable {
        /// The type whose converter was being built.
        type_name: &'static str,
    },
    /// Two union cases declared the same alias.
    DuplicateUnionAlias {
        /// The union base type.
        type_name: &'static str,
        /// Rendered alias.
        alias: String,
    },
    /// The wire carried an alias no union case declares.
    UnknownUnionAlias {
        /// The union base type.
        type_name: &'static str,
        /// Rendered alias.
        alias: String,
    },
    /// A value matched no declared union case on the write side.
    UnregisteredUnionCase {
        /// The union base type.
        type_name: &'static str,
    },
    /// A union envelope was not a two-element array.
    MalformedUnion {
        /// The element count found.
        len: usize,
    },
    /// A record declared key indices on some properties but not all, or
    /// declared the same index twice.
    InconsistentKeys {
        /// The record type.
        type_name: &'static str,
    },
    /// A record without a construction strategy was asked to deserialize.
    MissingConstructor {
        /// The record type.
        type_name: &'static str,
    },
    /// A required property was absent from the wire.
    MissingRequiredProperty {
        /// The record type.
        type_name: &'static str,
        /// The property name.
        property: &'static str,
    },
    /// A constructor argument slot was empty when the constructor ran.
    MissingArgument {
        /// Declaration-order property index.
        index: usize,
    },
    /// A constructor argument slot held a different type than requested.
    ArgumentTypeMismatch {
        /// Declaration-order property index.
        index: usize,
    },
    /// A name or ordinal matched no declared enum entry.
    UnknownEnumValue {
        /// The enum type.
        type_name: &'static str,
    },
    /// A fixed-size array shape met a different element count on the wire.
    ArrayLengthMismatch {
        /// Declared length.
        expected: usize,
        /// Length found on the wire.
        actual: usize,
    },
    /// Multidimensional array dimensions do not match the element count, or
    /// nested rows are not rectangular.
    InvalidDimensions,
    /// A back-reference pointed at a value whose contents are still being
    /// read; safe Rust cannot materialize such a cycle.
    ReferenceCycle {
        /// The referenced id.
        id: u32,
    },
    /// A back-reference pointed at a value of a different type.
    ReferenceTypeMismatch {
        /// The referenced id.
        id: u32,
    },
    /// A back-reference pointed past the values seen so far.
    UnknownReferenceId {
        /// The referenced id.
        id: u32,
    },
    /// A configured library extension code is in the range reserved by the
    /// format.
    ReservedExtensionCode {
        /// The offending code.
        code: i8,
    },
    /// A scalar payload was structurally valid but semantically out of range.
    InvalidValue {
        /// Description of the rejected value.
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wire(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Cancelled => f.write_str("the operation was cancelled"),
            Error::DepthLimitExceeded { limit } => {
                write!(f, "nesting exceeds the configured depth limit of {limit}")
            }
            Error::ConverterUnavailable { type_name } => {
                write!(f, "the converter for {type_name} failed to construct")
            }
            Error::DuplicateUnionAlias { type_name, alias } => {
                write!(f, "union {type_name} declares alias {alias} more than once")
            }
            Error::UnknownUnionAlias { type_name, alias } => {
                write!(f, "union {type_name} has no case with alias {alias}")
            }
            Error::UnregisteredUnionCase { type_name } => {
                write!(f, "value matches no declared case of union {type_name}")
            }
            Error::MalformedUnion { len } => {
                write!(f, "expected a two-element union envelope, found {len} elements")
            }
            Error::InconsistentKeys { type_name } => {
                write!(f, "record {type_name} mixes keyed and unkeyed properties")
            }
            Error::MissingConstructor { type_name } => {
                write!(f, "record {type_name} declares no construction strategy")
            }
            Error::MissingRequiredProperty {
                type_name,
                property,
            } => write!(f, "required property {type_name}.{property} is absent"),
            Error::MissingArgument { index } => {
                write!(f, "constructor argument {index} was never filled")
            }
            Error::ArgumentTypeMismatch { index } => {
                write!(f, "constructor argument {index} holds an unexpected type")
            }
            Error::UnknownEnumValue { type_name } => {
                write!(f, "value matches no declared entry of enum {type_name}")
            }
            Error::ArrayLengthMismatch { expected, actual } => {
                write!(f, "expected an array of {expected} elements, found {actual}")
            }
            Error::InvalidDimensions => {
                f.write_str("multidimensional array dimensions do not match its elements")
            }
            Error::ReferenceCycle { id } => {
                write!(f, "back-reference {id} forms a cycle, which cannot be materialized")
            }
            Error::ReferenceTypeMismatch { id } => {
                write!(f, "back-reference {id} resolves to a value of a different type")
            }
            Error::UnknownReferenceId { id } => {
                write!(f, "back-reference {id} points past the values seen so far")
            }
            Error::ReservedExtensionCode { code } => {
                write!(f, "extension code {code} is reserved by the format")
            }
            Error::InvalidValue { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Wire(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<carapace_msgpack::Error> for Error {
    fn from(err: carapace_msgpack::Error) -> Self {
        Error::Wire(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
