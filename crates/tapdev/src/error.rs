//! Error types for TUN/TAP operations.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for TUN/TAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle state of a [`TapDevice`](crate::TapDevice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No descriptor is held.
    Closed,
    /// The device descriptor is open.
    Open,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => f.write_str("closed"),
            State::Open => f.write_str("open"),
        }
    }
}

/// Errors that can occur during TUN/TAP operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The clone device could not be opened or `TUNSETIFF` was rejected.
    #[error("cannot create device via {}: {source}", path.display())]
    DeviceCreation {
        /// The clone device node that was used.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// An interface configuration request was rejected by the kernel.
    #[error("{op} on {interface} failed: {source}")]
    Configuration {
        /// The configuration operation that failed.
        op: &'static str,
        /// The interface the request addressed.
        interface: String,
        /// The underlying error.
        source: io::Error,
    },

    /// A caller-supplied value was out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the device's current state.
    #[error("cannot {op}: device is {state}")]
    InvalidState {
        /// The operation that was attempted.
        op: &'static str,
        /// The state the device was in.
        state: State,
    },

    /// Read or write on the device descriptor failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(op: &'static str, interface: impl Into<String>, source: io::Error) -> Self {
        Error::Configuration {
            op,
            interface: interface.into(),
            source,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// The OS error code behind this error, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::DeviceCreation { source, .. }
            | Error::Configuration { source, .. }
            | Error::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Check if the kernel refused the request for lack of privilege.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM) | Some(libc::EACCES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_and_permission() {
        let err = Error::configuration(
            "set_mtu",
            "tap0",
            io::Error::from_raw_os_error(libc::EPERM),
        );
        assert_eq!(err.errno(), Some(libc::EPERM));
        assert!(err.is_permission_denied());

        let err = Error::invalid_argument("mtu 0");
        assert_eq!(err.errno(), None);
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidState {
            op: "write",
            state: State::Closed,
        };
        assert_eq!(err.to_string(), "cannot write: device is closed");

        let err = Error::configuration(
            "up",
            "tun3",
            io::Error::from_raw_os_error(libc::ENODEV),
        );
        assert!(err.to_string().starts_with("up on tun3 failed"));
    }
}
