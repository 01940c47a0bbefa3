use std::any::Any;

/// Failures produced by the library itself.
///
/// Rejection reasons are generic, so every reason type `E` used with a
/// [`Future`](crate::Future) must implement `From<Error>` to carry these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("executor is not a function")]
    NotInvocable,
    #[error("circular resolution: a future cannot adopt itself")]
    CircularResolution,
    #[error("panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload);
        tracing::warn!(%message, "panic converted into a rejection");
        Error::Panicked(message)
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
