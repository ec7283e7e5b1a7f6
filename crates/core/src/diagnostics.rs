//! Diagnostic errors with captured call stacks
//!
//! A [`DiagnosticError`] is a chain of context messages over a root (a plain
//! message or an underlying cause), optionally carrying a snapshot of the call
//! stack taken when the error was first escalated. Two flavours of wrapping
//! are offered:
//!
//! - stacked: [`capture_stack`], [`wrap_with_stack`] and
//!   [`DiagnosticError::new_with_stack`] record a backtrace (and the active
//!   `tracing` spans when a [`tracing_error::ErrorLayer`] is installed);
//! - unstacked: [`wrap`], [`DiagnosticError::new`] and
//!   [`DiagnosticError::context`] only add messages.
//!
//! The first capture in a chain wins. Later stacked wraps add context but
//! never take a second snapshot, so the verbose rendering always contains at
//! most one stack section.
//!
//! The plain `Display` form (`{}`) renders the message chain only. The
//! alternate form (`{:#}`), `Debug` and [`DiagnosticError::render_verbose`]
//! append the stack section, introduced by [`STACK_MARKER`].
//!
//! Diagnostic errors can also be escalated through a panic with [`escalate`]
//! and reconstructed unchanged on the other side with [`recover`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing_error::{SpanTrace, SpanTraceStatus};

/// Line that introduces the stack section of a verbose rendering.
pub const STACK_MARKER: &str = "stack backtrace:";

/// Line that introduces the captured span trace, when one is available.
pub const SPAN_TRACE_MARKER: &str = "span trace:";

/// Boxed error accepted by the wrapping helpers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Call-stack snapshot taken at the first stacked wrap.
struct CapturedStack {
    backtrace: Backtrace,
    span_trace: SpanTrace,
}

impl CapturedStack {
    fn capture() -> Self {
        Self {
            backtrace: Backtrace::force_capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl fmt::Display for CapturedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", STACK_MARKER)?;
        write!(f, "{}", self.backtrace)?;
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            write!(f, "\n{}\n{}", SPAN_TRACE_MARKER, self.span_trace)?;
        }
        Ok(())
    }
}

enum Root {
    Message(String),
    Cause(BoxError),
}

/// Error value carrying a message chain and an optional call-stack snapshot.
pub struct DiagnosticError {
    /// Context messages, innermost first.
    context: Vec<String>,
    root: Root,
    stack: Option<CapturedStack>,
}

impl DiagnosticError {
    /// Create an error from a message without capturing a stack.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            context: Vec::new(),
            root: Root::Message(message.into()),
            stack: None,
        }
    }

    /// Create an error from a message and capture the current call stack.
    ///
    /// Used when there is no underlying cause to wrap, e.g. a recursive
    /// helper reaching its base case.
    pub fn new_with_stack(message: impl Into<String>) -> Self {
        Self {
            context: Vec::new(),
            root: Root::Message(message.into()),
            stack: Some(CapturedStack::capture()),
        }
    }

    fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<DiagnosticError>() {
            Ok(diagnostic) => *diagnostic,
            Err(other) => Self {
                context: Vec::new(),
                root: Root::Cause(other),
                stack: None,
            },
        }
    }

    /// Add a context message on top of the chain. Any captured stack is kept.
    pub fn context(mut self, message: impl Into<String>) -> Self {
        self.context.push(message.into());
        self
    }

    /// Whether a stack snapshot exists anywhere in the chain.
    pub fn has_stack(&self) -> bool {
        self.stack().is_some()
    }

    fn stack(&self) -> Option<&CapturedStack> {
        if let Some(stack) = &self.stack {
            return Some(stack);
        }
        match &self.root {
            Root::Cause(cause) => find_stack(cause.as_ref()),
            Root::Message(_) => None,
        }
    }

    /// The wrapped cause, if this error was built from another error.
    pub fn root_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match &self.root {
            Root::Cause(cause) => Some(cause.as_ref()),
            Root::Message(_) => None,
        }
    }

    /// Find an error of type `E` among the wrapped cause and its sources.
    ///
    /// Wrapping does not change classification: an `ExecError` wrapped any
    /// number of times can still be recovered here to read its exit code.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn StdError + 'static)> = match &self.root {
            Root::Cause(cause) => Some(cause.as_ref() as &(dyn StdError + 'static)),
            Root::Message(_) => None,
        };
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            if let Some(inner) = err.downcast_ref::<DiagnosticError>() {
                return inner.downcast_ref::<E>();
            }
            current = err.source();
        }
        None
    }

    /// Render the message chain followed by the stack section, if any.
    pub fn render_verbose(&self) -> String {
        format!("{:#}", self)
    }

    fn write_messages(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in self.context.iter().rev() {
            write!(f, "{}: ", message)?;
        }
        match &self.root {
            Root::Message(message) => write!(f, "{}", message),
            Root::Cause(cause) => write!(f, "{}", cause),
        }
    }
}

/// Look for a stack snapshot on any diagnostic error in a source chain.
fn find_stack<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a CapturedStack> {
    let mut current: Option<&'a (dyn StdError + 'static)> = Some(err);
    while let Some(err) = current {
        if let Some(diagnostic) = err.downcast_ref::<DiagnosticError>() {
            return diagnostic.stack();
        }
        current = err.source();
    }
    None
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_messages(f)?;
        if f.alternate() {
            if let Some(stack) = self.stack() {
                write!(f, "\n{}", stack)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self)
    }
}

impl StdError for DiagnosticError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        // The root cause's own message is already part of Display.
        match &self.root {
            Root::Cause(cause) => cause.source(),
            Root::Message(_) => None,
        }
    }
}

/// Attach a call-stack snapshot to `err`.
///
/// If `err` already carries a stack, directly or anywhere in its source
/// chain, it is returned with that original capture and no new snapshot.
pub fn capture_stack<E>(err: E) -> DiagnosticError
where
    E: Into<BoxError>,
{
    let mut diagnostic = DiagnosticError::from_boxed(err.into());
    if !diagnostic.has_stack() {
        diagnostic.stack = Some(CapturedStack::capture());
    }
    diagnostic
}

/// Wrap `err` with a context message, without capturing a stack.
pub fn wrap<E>(err: E, message: impl Into<String>) -> DiagnosticError
where
    E: Into<BoxError>,
{
    DiagnosticError::from_boxed(err.into()).context(message)
}

/// Wrap `err` with a context message, capturing a stack if none exists yet.
pub fn wrap_with_stack<E>(err: E, message: impl Into<String>) -> DiagnosticError
where
    E: Into<BoxError>,
{
    capture_stack(err).context(message)
}

/// Escalate a diagnostic error through a panic.
///
/// The error itself is the panic payload, so [`recover`] can hand back the
/// same value.
pub fn escalate(err: DiagnosticError) -> ! {
    panic::panic_any(err)
}

/// Run `f`, turning a panic into the diagnostic error it carried.
///
/// Payloads raised by [`escalate`] come back unchanged. Ordinary panics with
/// a string message become unstacked diagnostic errors.
pub fn recover<F, T>(f: F) -> Result<T, DiagnosticError>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(from_panic_payload)
}

/// Rebuild a diagnostic error from a panic payload.
pub fn from_panic_payload(payload: Box<dyn Any + Send + 'static>) -> DiagnosticError {
    let payload = match payload.downcast::<DiagnosticError>() {
        Ok(diagnostic) => return *diagnostic,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<String>() {
        Ok(message) => return DiagnosticError::new(*message),
        Err(payload) => payload,
    };
    match payload.downcast::<&'static str>() {
        Ok(message) => DiagnosticError::new(*message),
        Err(_) => DiagnosticError::new("panic with a non-string payload"),
    }
}

/// Diagnostic wrapping for `Result`s.
pub trait DiagnosticResultExt<T> {
    /// Capture a stack on the error, keeping an existing one.
    fn with_stack(self) -> Result<T, DiagnosticError>;

    /// Add a context message to the error without capturing a stack.
    fn wrap_err(self, message: impl Into<String>) -> Result<T, DiagnosticError>;
}

impl<T, E> DiagnosticResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn with_stack(self) -> Result<T, DiagnosticError> {
        self.map_err(capture_stack)
    }

    fn wrap_err(self, message: impl Into<String>) -> Result<T, DiagnosticError> {
        self.map_err(|err| wrap(err, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecError;
    use tracing_subscriber::layer::SubscriberExt;

    fn error_with_stack(depth: usize, err: Option<BoxError>) -> DiagnosticError {
        if depth == 0 {
            match err {
                Some(err) => capture_stack(err),
                None => DiagnosticError::new_with_stack("reached the bottom of the error call stack"),
            }
        } else {
            error_with_stack(depth - 1, err)
        }
    }

    fn error_without_stack(depth: usize, err: Option<BoxError>) -> DiagnosticError {
        if depth == 0 {
            match err {
                Some(err) => DiagnosticError::from_boxed(err),
                None => DiagnosticError::new("reached the bottom of the error call stack"),
            }
        } else {
            error_without_stack(depth - 1, err)
        }
    }

    #[test]
    fn test_stacked_error_renders_stack_and_base_message() {
        let err1 = error_with_stack(5, Some("misc error".into()));
        let err2 = error_with_stack(5, None);

        let text1 = err1.render_verbose();
        let text2 = err2.render_verbose();

        assert!(text1.contains(STACK_MARKER));
        assert!(text1.contains("misc error"));
        assert!(text1.contains("error_with_stack"));
        assert!(text2.contains(STACK_MARKER));
        assert!(text2.contains("reached the bottom of the error call stack"));
    }

    #[test]
    fn test_plain_display_has_no_stack() {
        let err = error_with_stack(2, Some("misc error".into()));
        assert_eq!(err.to_string(), "misc error");
        assert!(err.has_stack());
    }

    #[test]
    fn test_unstacked_error_never_renders_marker() {
        let err = error_without_stack(5, Some("misc error".into()))
            .context("enable failed")
            .context("lifecycle step failed");

        assert!(!err.has_stack());
        assert_eq!(
            err.to_string(),
            "lifecycle step failed: enable failed: misc error"
        );
        assert!(!err.render_verbose().contains(STACK_MARKER));
        assert!(!format!("{:?}", err).contains(STACK_MARKER));
    }

    #[test]
    fn test_first_capture_wins() {
        let mut err = error_with_stack(3, Some("base failure".into()));
        for level in 0..4 {
            err = wrap_with_stack(err, format!("level {}", level));
        }
        err = capture_stack(err);

        let text = err.render_verbose();
        assert_eq!(text.matches(STACK_MARKER).count(), 1);
        assert!(text.contains("base failure"));
        assert!(text.starts_with("level 3: level 2: level 1: level 0: base failure"));
    }

    #[test]
    fn test_unstacked_wrap_preserves_inner_stack() {
        let inner = DiagnosticError::new_with_stack("disk full");
        let outer = wrap(inner, "could not stage package");

        assert!(outer.has_stack());
        let text = outer.render_verbose();
        assert!(text.starts_with("could not stage package: disk full"));
        assert_eq!(text.matches(STACK_MARKER).count(), 1);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("install step failed")]
    struct StepError {
        #[source]
        source: DiagnosticError,
    }

    #[test]
    fn test_stack_found_through_foreign_source_chain() {
        let step = StepError {
            source: DiagnosticError::new_with_stack("script missing"),
        };
        let err = capture_stack(step);

        let text = err.render_verbose();
        assert_eq!(text.matches(STACK_MARKER).count(), 1);
        assert!(text.starts_with("install step failed"));
    }

    #[test]
    fn test_downcast_keeps_classification() {
        let err = wrap_with_stack(ExecError::NonZeroExit { code: 52 }, "enable");
        let err = wrap(err, "extension handler");

        let exec = err.downcast_ref::<ExecError>();
        assert!(matches!(exec, Some(ExecError::NonZeroExit { code: 52 })));
        assert_eq!(exec.map(ExecError::exit_code), Some(52));
        assert!(err.to_string().contains("exit status=52"));
    }

    #[test]
    fn test_panic_with_call_stack() {
        let err = error_with_stack(5, Some("misc error".into()));
        let message = err.to_string();
        let before = err.render_verbose();

        let recovered = match recover::<_, ()>(move || escalate(err)) {
            Ok(()) => panic!("error not recovered"),
            Err(recovered) => recovered,
        };

        let after = recovered.render_verbose();
        assert_eq!(after, before);
        assert!(after.contains(&message));
        assert!(after.contains(STACK_MARKER));
        assert!(after.contains("error_with_stack"));
        assert_eq!(after.matches(STACK_MARKER).count(), 1);
    }

    #[test]
    fn test_panic_without_call_stack() {
        let err = error_without_stack(5, Some("misc error".into()));
        let message = err.to_string();

        let recovered = match recover::<_, ()>(move || escalate(err)) {
            Ok(()) => panic!("error not recovered"),
            Err(recovered) => recovered,
        };

        let text = recovered.render_verbose();
        assert!(text.contains(&message));
        assert!(!text.contains(STACK_MARKER));
        assert!(!text.contains("error_without_stack"));
    }

    #[test]
    fn test_recover_plain_panics() {
        let recovered = recover::<_, ()>(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(recovered.to_string(), "boom 7");
        assert!(!recovered.has_stack());

        let recovered = recover::<_, ()>(|| panic!("static boom")).unwrap_err();
        assert_eq!(recovered.to_string(), "static boom");

        let value = recover(|| 41 + 1).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_span_trace_captured_with_error_layer() {
        let subscriber = tracing_subscriber::registry().with(tracing_error::ErrorLayer::default());
        let err = tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("install_extension", name = "demo").entered();
            DiagnosticError::new_with_stack("install script failed")
        });

        let text = err.render_verbose();
        assert!(text.contains(SPAN_TRACE_MARKER));
        assert!(text.contains("install_extension"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), ExecError> = Err(ExecError::NonZeroExit { code: 3 });
        let err = result.with_stack().unwrap_err();
        assert!(err.has_stack());

        let result: Result<(), ExecError> = Err(ExecError::NonZeroExit { code: 4 });
        let err = result.wrap_err("disable").unwrap_err();
        assert!(!err.has_stack());
        assert_eq!(err.to_string(), "disable: command terminated with exit status=4");
    }
}
