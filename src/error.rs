#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// Malformed schema path, or contradictory `[*]` declarations for the
    /// same prefix.
    Schema(String),
    /// A repeated field's value was not a list, a non-repeated field's
    /// value was a list, or a non-leaf non-repeated field's value was
    /// neither a mapping nor null.
    TypeMismatch(String),
    /// A column stream was read past its end during assembly. Indicates
    /// corrupt input; always fatal.
    Exhausted(String),
    /// The FSM builder was given a leaf that is not part of the schema.
    Selection(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Schema(message) => write!(fmt, "{}", message),
            Error::TypeMismatch(message) => write!(fmt, "{}", message),
            Error::Exhausted(message) => write!(fmt, "{}", message),
            Error::Selection(message) => write!(fmt, "{}", message),
        }
    }
}

/// A specialized `Result` for dremel errors.
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! schema_err {
    ($fmt:expr) => ($crate::error::Error::Schema($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => ($crate::error::Error::Schema(format!($fmt, $($args),*)));
}

macro_rules! type_mismatch_err {
    ($fmt:expr, $($args:expr),*) => ($crate::error::Error::TypeMismatch(format!($fmt, $($args),*)));
}
