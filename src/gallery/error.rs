use thiserror::Error;

use crate::cache::CacheError;
use crate::flickr::ApiError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
