/*!

*/

use thiserror::Error;

pub type Result<T, E = FoveaError> = std::result::Result<T, E>;

/// Errors surfaced by the extraction layer.
///
/// Nothing here is retried or recovered locally; every failure is handed
/// straight back to the caller.
#[derive(Error, Debug)]
pub enum FoveaError {
    /// The network or the preprocessing options are malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A batch contained images of inconsistent dimensions while no resize
    /// target was configured.
    #[error("image {index} in batch has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The same blob was requested more than once in a single extraction.
    #[error("duplicate blob name requested: {0:?}")]
    DuplicateBlob(String),

    /// The requested blob does not exist in the network's blob table.
    #[error("no blob named {0:?} in the network")]
    MissingBlob(String),

    /// The requested compute device cannot be selected. Fatal to loading.
    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An image file could not be decoded.
    #[error("failed to decode image")]
    Image(#[from] image::ImageError),

    /// Any other engine-internal failure, passed through unchanged.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}
