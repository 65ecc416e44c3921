use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, NetErr>;

/// The network's error type.
#[derive(Debug)]
pub enum NetErr {
    /// An example or an input doesn't fit the shape of the network.
    InputShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The network has no layers to run the requested operation on.
    EmptyNetwork,
    /// A persisted header describes a different network than the live one.
    TopologyMismatch { expected: String, found: String },
    Io(io::Error),
    /// A line of a weight file couldn't be parsed. `line` is 1-based.
    MalformedRecord { line: usize, reason: String },
    Config(String),
}

impl Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetErr::InputShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "input shape mismatch on {what}: got {got} values, expected {expected}"
            ),
            NetErr::EmptyNetwork => write!(f, "the network has no layers"),
            NetErr::TopologyMismatch { expected, found } => {
                write!(f, "topology mismatch: network is {expected}, file is {found}")
            }
            NetErr::Io(e) => write!(f, "io error: {e}"),
            NetErr::MalformedRecord { line, reason } => {
                write!(f, "malformed record at line {line}: {reason}")
            }
            NetErr::Config(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for NetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NetErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
