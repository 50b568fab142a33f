use thiserror::Error;

/// Failure inside one request's preprocessing or inference. Always caught
/// at the session boundary and reported as an error reply; never tears
/// down the connection or the process.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("model execution failed: {0}")]
    Model(#[from] tch::TchError),
    #[error("unexpected model output: {0}")]
    Output(String),
}
