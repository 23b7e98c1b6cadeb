use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use mvdb::Error;
/// err_at!(KeyNotFound, msg: "missing key {:?}", key)
/// ```
///
/// ```ignore
/// use mvdb::Error;
/// err_at!(IOError, fs::read(file_path))
/// ```
///
/// ```ignore
/// use mvdb::Error;
/// err_at!(IOError, fs::read(file_path), "reading snapshot {}", name)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Type alias for Result returned by functions and methods defined in this
/// package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, mostly a `file:line-no` of the call site
/// that originated the error, and a message describing the error condition.
#[derive(Clone)]
pub enum Error {
    /// Supplied key is not present in the database.
    KeyNotFound(String, String),
    /// Supplied revision is not present in the key's history.
    RevisionNotFound(String, String),
    /// Mutation would change or mismatch a key's fixed value-kind.
    IncompatibleValue(String, String),
    /// Range query supplied with `from > to`.
    InvertedRange(String, String),
    /// Terminal sentinel, the watched key/value pair got deleted.
    PairDeleted(String, String),
    /// Terminal sentinel, the notifier is shut down.
    NotifierCanceled(String, String),
    /// Error propagated from the persistent backend.
    BackendError(String, String),
    /// De-serialization failed, malformed block sequence.
    DecodeFail(String, String),
    /// API called with invalid arguments or invalid intermediate state.
    InvalidInput(String, String),
    /// Error from file-system or device.
    IOError(String, String),
    /// Inter-process-communication error from one of the threads.
    IPCFail(String, String),
    /// Thread failed to join.
    ThreadFail(String, String),
    /// Error converting one type to another type.
    FailConvert(String, String),
    /// Error from cbordata package while serializing backend meta.
    FailCbor(String, String),
    /// Invalid or corrupted file encountered by the backend.
    InvalidFile(String, String),
    /// Fatal failure, an invariant of the implementation is broken.
    Fatal(String, String),
}

impl Error {
    /// Return the variant name, without the enclosed details.
    pub fn to_name(&self) -> String {
        match self {
            Error::KeyNotFound(_, _) => "KeyNotFound",
            Error::RevisionNotFound(_, _) => "RevisionNotFound",
            Error::IncompatibleValue(_, _) => "IncompatibleValue",
            Error::InvertedRange(_, _) => "InvertedRange",
            Error::PairDeleted(_, _) => "PairDeleted",
            Error::NotifierCanceled(_, _) => "NotifierCanceled",
            Error::BackendError(_, _) => "BackendError",
            Error::DecodeFail(_, _) => "DecodeFail",
            Error::InvalidInput(_, _) => "InvalidInput",
            Error::IOError(_, _) => "IOError",
            Error::IPCFail(_, _) => "IPCFail",
            Error::ThreadFail(_, _) => "ThreadFail",
            Error::FailConvert(_, _) => "FailConvert",
            Error::FailCbor(_, _) => "FailCbor",
            Error::InvalidFile(_, _) => "InvalidFile",
            Error::Fatal(_, _) => "Fatal",
        }
        .to_string()
    }

    fn parts(&self) -> (&str, &str) {
        match self {
            Error::KeyNotFound(p, m) => (p, m),
            Error::RevisionNotFound(p, m) => (p, m),
            Error::IncompatibleValue(p, m) => (p, m),
            Error::InvertedRange(p, m) => (p, m),
            Error::PairDeleted(p, m) => (p, m),
            Error::NotifierCanceled(p, m) => (p, m),
            Error::BackendError(p, m) => (p, m),
            Error::DecodeFail(p, m) => (p, m),
            Error::InvalidInput(p, m) => (p, m),
            Error::IOError(p, m) => (p, m),
            Error::IPCFail(p, m) => (p, m),
            Error::ThreadFail(p, m) => (p, m),
            Error::FailConvert(p, m) => (p, m),
            Error::FailCbor(p, m) => (p, m),
            Error::InvalidFile(p, m) => (p, m),
            Error::Fatal(p, m) => (p, m),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let (prefix, msg) = self.parts();
        write!(f, "{} {} {}", self.to_name(), prefix, msg)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

// Two errors are equal when they are the same variant, the call-site
// prefix and message do not count.
impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        self.to_name() == other.to_name()
    }
}
