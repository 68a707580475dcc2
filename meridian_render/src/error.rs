use std::{fmt, panic::Location};
use windows::{
    core::HRESULT,
    Win32::Foundation::{GetLastError, WIN32_ERROR},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The two failure classes this library distinguishes. Neither is
/// recoverable at this layer; the split lets the host decide whether to
/// log-and-terminate or propagate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The platform refused an operation (device lost, out of memory,
    /// object creation failure).
    Environment,
    /// A caller violated an API contract (closed list resubmitted, empty
    /// batch, malformed fence value).
    Precondition,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: String,
    hresult: Option<HRESULT>,
    last_error: Option<WIN32_ERROR>,
    location: &'static Location<'static>,
}

impl Error {
    #[track_caller]
    pub(crate) fn environment(context: impl Into<String>) -> Self {
        Self::build(ErrorKind::Environment, context.into(), None, Location::caller())
    }

    #[track_caller]
    pub(crate) fn precondition(context: impl Into<String>) -> Self {
        Self::build(ErrorKind::Precondition, context.into(), None, Location::caller())
    }

    #[track_caller]
    pub(crate) fn precondition_for(context: impl Into<String>, error: windows::core::Error) -> Self {
        Self::build(
            ErrorKind::Precondition,
            context.into(),
            Some(error.code()),
            Location::caller(),
        )
    }

    fn build(
        kind: ErrorKind,
        context: String,
        hresult: Option<HRESULT>,
        location: &'static Location<'static>,
    ) -> Self {
        let last_error = unsafe { GetLastError() };
        Self {
            kind,
            context,
            hresult,
            last_error: (last_error.0 != 0).then_some(last_error),
            location,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn hresult(&self) -> Option<HRESULT> {
        self.hresult
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.context)?;
        if let Some(hr) = self.hresult {
            write!(f, " | HRESULT=0x{:08X} ({})", hr.0 as u32, hr.message())?;
        }
        if let Some(err) = self.last_error {
            write!(
                f,
                " | Win32LastError={} ({})",
                err.0,
                err.to_hresult().message()
            )?;
        }
        write!(f, " | at {}:{}", self.location.file(), self.location.line())
    }
}

impl std::error::Error for Error {}

/// Adapter from `windows::core::Result` to this library's error type,
/// attaching a short context string and the caller's source location.
pub(crate) trait IntoDeviceResult<T> {
    #[track_caller]
    fn into_device_result(self, context: &str) -> Result<T>;
}

impl<T> IntoDeviceResult<T> for windows::core::Result<T> {
    fn into_device_result(self, context: &str) -> Result<T> {
        let location = Location::caller();
        self.map_err(|error| {
            Error::build(
                ErrorKind::Environment,
                context.to_owned(),
                Some(error.code()),
                location,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::E_FAIL;

    #[test]
    fn precondition_carries_context_and_location() {
        let error = Error::precondition("empty command list batch");
        assert_eq!(error.kind(), ErrorKind::Precondition);
        assert!(error.hresult().is_none());
        let message = error.to_string();
        assert!(message.starts_with("empty command list batch"));
        assert!(message.contains("error.rs"));
    }

    #[test]
    fn environment_formats_hresult() {
        let source = windows::core::Error::from(E_FAIL);
        let error: Result<()> = Err::<(), _>(source).into_device_result("fence signal");
        let message = error.unwrap_err().to_string();
        assert!(message.contains("fence signal"));
        assert!(message.contains("HRESULT=0x80004005"));
    }
}
