//! Errors raised by transactional updates.

/// A compare-and-set on a ref lost against a concurrent writer.
///
/// Retrying the whole update usually succeeds once the other writer is done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lock failure on {ref_name}: {message}")]
pub struct LockFailure {
    pub ref_name: String,
    pub message: String,
}

/// Error returned by an update action and by [`RetryHelper::execute_update`].
///
/// [`RetryHelper::execute_update`]: crate::retry::RetryHelper::execute_update
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    LockFailure(#[from] LockFailure),
    #[error("update failed")]
    Failed(#[source] anyhow::Error),
}

impl UpdateError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        UpdateError::Failed(anyhow::anyhow!("{}", msg))
    }
}

/// `true` if `err`, or anything it wraps, is a [`LockFailure`].
pub fn is_lock_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<LockFailure>()
            || matches!(
                cause.downcast_ref::<UpdateError>(),
                Some(UpdateError::LockFailure(_))
            )
    })
}

/// Bring an error leaving the retry loop back to an [`UpdateError`].
pub(crate) fn into_update_error(err: anyhow::Error) -> UpdateError {
    match err.downcast::<UpdateError>() {
        Ok(update) => update,
        Err(other) => match other.downcast::<LockFailure>() {
            Ok(lock) => UpdateError::LockFailure(lock),
            Err(other) => UpdateError::Failed(other),
        },
    }
}
