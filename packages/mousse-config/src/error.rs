pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read configuration from {path:?}.")]
	ReadConfig {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Cannot parse configuration from {path:?}: {source}")]
	ParseConfig {
		path: std::path::PathBuf,
		#[source]
		source: toml::de::Error,
	},
	#[error("Invalid configuration: {message}")]
	Validation { message: String },
}

impl Error {
	pub(crate) fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}
}
