use crate::generation::GenerationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Client disconnected before the request completed.")]
	ClientDisconnected,
	#[error("Generation failed: {message}")]
	Generation { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<mousse_storage::Error> for Error {
	fn from(err: mousse_storage::Error) -> Self {
		match err {
			mousse_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			mousse_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			mousse_storage::Error::NotFound(message) => Self::NotFound { message },
		}
	}
}

impl From<mousse_domain::Error> for Error {
	fn from(err: mousse_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<mousse_providers::Error> for Error {
	fn from(err: mousse_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<GenerationError> for Error {
	fn from(err: GenerationError) -> Self {
		match err {
			GenerationError::ClientDisconnected => Self::ClientDisconnected,
			other => Self::Generation { message: other.to_string() },
		}
	}
}
