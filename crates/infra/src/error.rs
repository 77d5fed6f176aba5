use thiserror::Error;

use clinicflow_core::{DomainError, ErrorKind};

use crate::store::StoreError;

/// Failure of a service operation.
///
/// Domain errors are deterministic rejections; store errors mean the operation
/// could not be carried out and may succeed if repeated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The call never completed, e.g. the worker running it panicked.
    #[error("operation aborted: {0}")]
    Aborted(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::Store(_) | ServiceError::Aborted(_) => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.domain().map(DomainError::kind)
    }
}
