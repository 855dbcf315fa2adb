use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("engine worker unavailable: {0}")]
    WorkerUnavailable(String),
}
