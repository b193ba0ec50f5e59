use std::fmt;

use thiserror::Error;

/// Error code reported by the native messaging engine, recorded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeError {
  code: i32,
}

impl NativeError {
  pub const INTERRUPTED: NativeError = NativeError::new(1);
  pub const NO_MEMORY: NativeError = NativeError::new(2);
  pub const INVALID: NativeError = NativeError::new(3);
  pub const BUSY: NativeError = NativeError::new(4);
  pub const TIMED_OUT: NativeError = NativeError::new(5);
  pub const CONNECTION_REFUSED: NativeError = NativeError::new(6);
  pub const CLOSED: NativeError = NativeError::new(7);
  pub const TRY_AGAIN: NativeError = NativeError::new(8);
  pub const NOT_SUPPORTED: NativeError = NativeError::new(9);
  pub const ADDRESS_IN_USE: NativeError = NativeError::new(10);
  pub const STATE: NativeError = NativeError::new(11);
  pub const NOT_FOUND: NativeError = NativeError::new(12);
  pub const PROTOCOL: NativeError = NativeError::new(13);
  pub const UNREACHABLE: NativeError = NativeError::new(14);
  pub const ADDRESS_INVALID: NativeError = NativeError::new(15);
  pub const PERMISSION: NativeError = NativeError::new(16);
  pub const MESSAGE_SIZE: NativeError = NativeError::new(17);
  pub const CONNECTION_ABORTED: NativeError = NativeError::new(18);
  pub const CONNECTION_RESET: NativeError = NativeError::new(19);
  pub const CANCELED: NativeError = NativeError::new(20);
  pub const CONNECTION_SHUTDOWN: NativeError = NativeError::new(31);

  pub const fn new(code: i32) -> Self {
    Self { code }
  }

  pub const fn code(&self) -> i32 {
    self.code
  }

  /// Human readable description of the code, `"Unknown error"` for codes the
  /// engine does not define.
  pub fn message(&self) -> &'static str {
    match self.code {
      1 => "Interrupted",
      2 => "Out of memory",
      3 => "Invalid argument",
      4 => "Resource busy",
      5 => "Timed out",
      6 => "Connection refused",
      7 => "Object closed",
      8 => "Try again",
      9 => "Not supported",
      10 => "Address in use",
      11 => "Incorrect state",
      12 => "Entry not found",
      13 => "Protocol error",
      14 => "Destination unreachable",
      15 => "Address invalid",
      16 => "Permission denied",
      17 => "Message too large",
      18 => "Connection aborted",
      19 => "Connection reset",
      20 => "Operation canceled",
      21 => "Out of files",
      22 => "Out of space",
      23 => "Resource already exists",
      24 => "Read only resource",
      25 => "Write only resource",
      26 => "Cryptographic error",
      27 => "Peer could not be authenticated",
      28 => "Option requires argument",
      29 => "Ambiguous option",
      30 => "Incorrect type",
      31 => "Connection shutdown",
      _ => "Unknown error",
    }
  }
}

impl fmt::Display for NativeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} | {}", self.code, self.message())
  }
}

impl std::error::Error for NativeError {}

/// Outcome of an operation or wait that did not produce a value.
///
/// Errors are plain values: operations store them, waits return them, and
/// nothing in this crate unwinds to report one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
  /// A bounded wait reached its deadline. The target is untouched and may be
  /// waited on again.
  #[error("wait timed out")]
  Timeout,
  /// The host requested an interrupt during an interruptible wait.
  #[error("wait interrupted by host")]
  Interrupted,
  /// The operation was cancelled before it produced a result.
  #[error("operation cancelled")]
  Cancelled,
  /// The native side went away without completing the operation.
  #[error("operation closed before completion")]
  Closed,
  #[error("native error {0}")]
  Native(#[from] NativeError),
}

impl Error {
  pub fn is_timeout(&self) -> bool {
    matches!(self, Error::Timeout | Error::Native(NativeError::TIMED_OUT))
  }

  pub fn is_interrupted(&self) -> bool {
    matches!(self, Error::Interrupted | Error::Native(NativeError::INTERRUPTED))
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Cancelled | Error::Native(NativeError::CANCELED))
  }

  /// The native code, if this error came from the engine.
  pub fn native(&self) -> Option<NativeError> {
    match self {
      Error::Native(native) => Some(*native),
      _ => None,
    }
  }
}
