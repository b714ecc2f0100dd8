// Error types for the Islet framework

use crate::HttpStatus;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::sync::Once;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Failure raised by a page handler, a middleware or a render call.
    #[error("{0}")]
    Handler(HandlerError),

    /// Island props (or another payload) could not be safely serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),

    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a handler failure, with a backtrace when enabled.
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(HandlerError::capture(message))
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.http_status().code()
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        match self {
            Error::RouteNotFound(_) => HttpStatus::NotFound,
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed,
            _ => HttpStatus::InternalServerError,
        }
    }

    /// Message and optional stack shown on diagnostic pages.
    pub fn diagnostic(&self) -> HandlerError {
        match self {
            Error::Handler(err) => err.clone(),
            other => HandlerError::new(other.to_string()),
        }
    }
}

/// An uncaught failure from user code, recovered at the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub message: String,
    pub stack: Option<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach an explicit stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture the current backtrace when `RUST_BACKTRACE` or
    /// `RUST_LIB_BACKTRACE` enables it.
    pub fn capture(message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            message: message.into(),
            stack,
        }
    }
}

thread_local! {
    /// Location and backtrace of the latest panic on this thread.
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that remembers where each panic happened, so a
/// caught panic can still report a stack. The previous hook keeps running.
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut stack = match info.location() {
                Some(loc) => format!("at {}:{}:{}", loc.file(), loc.line(), loc.column()),
                None => "at <unknown>".to_string(),
            };
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                stack.push('\n');
                stack.push_str(&backtrace.to_string());
            }
            PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Take the stack recorded by the latest panic on this thread.
pub(crate) fn take_panic_stack() -> Option<String> {
    PANIC_STACK.with(|slot| slot.borrow_mut().take())
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HandlerError> for Error {
    fn from(err: HandlerError) -> Self {
        Error::Handler(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
