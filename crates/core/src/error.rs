use thiserror::Error;

use crate::model::{AttemptConfigError, AttemptStatusError, ContentError};
use crate::session::SessionStateError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Config(#[from] AttemptConfigError),
    #[error(transparent)]
    AttemptStatus(#[from] AttemptStatusError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
}
