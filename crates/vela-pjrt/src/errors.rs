use std::backtrace::Backtrace;
use std::fmt::Display;

use thiserror::Error;

/// Declares [`Error`] and [`ErrorCode`] from a single table of `code => Variant, constructor, "NAME";` entries so that
/// the two enums, their conversions, and the per-variant constructors cannot drift apart.
macro_rules! status_errors {
    ($($code:literal => $variant:ident, $constructor:ident, $name:literal;)*) => {
        /// Represents errors that can occur while compiling, loading, or inspecting executables. The error types
        /// follow the [Abseil status codes](https://abseil.io/docs/cpp/guides/status-codes) which native PJRT clients
        /// use internally, and errors returned by native collaborators are propagated as-is.
        ///
        /// Each variant includes a `backtrace` field that captures the call stack at the point where the error was
        /// created. It is stored as a rendered [`String`] so that errors remain [`Clone`], [`Eq`], and [`Hash`].
        #[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Error {
            $(
                #[doc = concat!("Error with status code `", $name, "`.")]
                #[error("{message}")]
                $variant { message: String, backtrace: String },
            )*
        }

        /// Status code of an [`Error`]. The numeric values match the
        /// [Abseil status codes](https://abseil.io/docs/cpp/guides/status-codes).
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        pub enum ErrorCode {
            $($variant = $code,)*
        }

        impl ErrorCode {
            /// Returns the [`ErrorCode`] with the provided numeric value, if there is one. `0` (i.e., `OK`) is not a
            /// valid error code.
            pub fn from_raw(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Returns the canonical upper-case name of this [`ErrorCode`] (e.g., `"INVALID_ARGUMENT"`).
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }

        impl Error {
            $(
                #[doc = concat!("Creates a new [`Error::", stringify!($variant), "`].")]
                pub fn $constructor<M: Into<String>>(message: M) -> Self {
                    Self::$variant { message: message.into(), backtrace: Backtrace::capture().to_string() }
                }
            )*

            /// Creates a new [`Error`] with the provided [`ErrorCode`] and message.
            pub fn new<M: Into<String>>(code: ErrorCode, message: M) -> Self {
                match code {
                    $(ErrorCode::$variant => Self::$constructor(message),)*
                }
            }

            /// Returns the [`ErrorCode`] that corresponds to this [`Error`].
            pub fn code(&self) -> ErrorCode {
                match self {
                    $(Self::$variant { .. } => ErrorCode::$variant,)*
                }
            }

            /// Returns the message that is stored in this [`Error`].
            pub fn message(&self) -> &str {
                match self {
                    $(Self::$variant { message, .. } => message.as_str(),)*
                }
            }

            /// Returns the rendered backtrace that was captured when this [`Error`] was created. This reads
            /// `disabled backtrace` unless backtraces are enabled through `RUST_BACKTRACE`.
            pub fn backtrace(&self) -> &str {
                match self {
                    $(Self::$variant { backtrace, .. } => backtrace.as_str(),)*
                }
            }
        }
    };
}

status_errors! {
    1 => Cancelled, cancelled, "CANCELLED";
    2 => Unknown, unknown, "UNKNOWN";
    3 => InvalidArgument, invalid_argument, "INVALID_ARGUMENT";
    4 => DeadlineExceeded, deadline_exceeded, "DEADLINE_EXCEEDED";
    5 => NotFound, not_found, "NOT_FOUND";
    6 => AlreadyExists, already_exists, "ALREADY_EXISTS";
    7 => PermissionDenied, permission_denied, "PERMISSION_DENIED";
    8 => ResourceExhausted, resource_exhausted, "RESOURCE_EXHAUSTED";
    9 => FailedPrecondition, failed_precondition, "FAILED_PRECONDITION";
    10 => Aborted, aborted, "ABORTED";
    11 => OutOfRange, out_of_range, "OUT_OF_RANGE";
    12 => Unimplemented, unimplemented, "UNIMPLEMENTED";
    13 => Internal, internal, "INTERNAL";
    14 => Unavailable, unavailable, "UNAVAILABLE";
    15 => DataLoss, data_loss, "DATA_LOSS";
    16 => Unauthenticated, unauthenticated, "UNAUTHENTICATED";
}

impl Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let errors = [
            Error::cancelled("cancelled"),
            Error::unknown("unknown"),
            Error::invalid_argument("invalid argument"),
            Error::deadline_exceeded("deadline exceeded"),
            Error::not_found("not found"),
            Error::already_exists("already exists"),
            Error::permission_denied("permission denied"),
            Error::resource_exhausted("resource exhausted"),
            Error::failed_precondition("failed precondition"),
            Error::aborted("aborted"),
            Error::out_of_range("out of range"),
            Error::unimplemented("unimplemented"),
            Error::internal("internal"),
            Error::unavailable("unavailable"),
            Error::data_loss("data loss"),
            Error::unauthenticated("unauthenticated"),
        ];
        for (index, error) in errors.iter().enumerate() {
            let code = error.code();
            assert_eq!(code as u32, index as u32 + 1);
            assert_eq!(ErrorCode::from_raw(code as u32), Some(code));
            assert_eq!(code.name().to_lowercase().replace('_', " "), error.message());
            let recreated = Error::new(code, error.message());
            assert_eq!(recreated.code(), code);
            assert_eq!(recreated.message(), error.message());
        }
        assert_eq!(ErrorCode::from_raw(0), None);
        assert_eq!(ErrorCode::from_raw(17), None);
        assert_eq!(ErrorCode::FailedPrecondition.to_string(), "FAILED_PRECONDITION");
    }

    #[test]
    fn test_error_equality() {
        let error = Error::not_found("missing module");
        assert_eq!(error.clone(), error);
        assert_ne!(error, Error::internal("missing module"));
        assert_ne!(error, Error::not_found("missing device"));
    }

    #[test]
    fn test_error_display_and_debug() {
        let error = Error::invalid_argument("bad input");
        assert_eq!(format!("{error}"), "bad input");
        assert!(format!("{error:?}").starts_with("InvalidArgument { message: \"bad input\", backtrace: \""));
        assert!(!error.backtrace().is_empty());

        let error = Error::new(ErrorCode::Unimplemented, "not yet");
        assert_eq!(format!("{error}"), "not yet");
        assert!(matches!(error, Error::Unimplemented { .. }));
    }
}
