pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("Unknown filter topic '{topic}'.")]
	UnknownTopic { topic: String },
	#[error("Invalid {field}: {message}")]
	InvalidPredicate { field: &'static str, message: String },
	#[error("{path}: {message}")]
	InvalidGeometry { path: String, message: String },
	#[error("Clustering input rejected: {message}")]
	InvalidClustering { message: String },
}
