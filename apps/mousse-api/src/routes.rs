use std::future::Future;

use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use mousse_service::{
	ClusterMembersRequest, ClusterMembersResponse, ClusterRequest, ClusteredSearchResponse, Error,
	NerAnalysisResponse, SearchRequest, SearchResponse,
};
use mousse_storage::models::CountryRow;

use crate::state::AppState;

const UNAVAILABLE_MESSAGE: &str = "The service is temporarily unavailable. Try again later.";
const GENERATION_MESSAGE: &str = "LLM did not return a meaningful response.";
const INTERNAL_MESSAGE: &str = "The request failed unexpectedly.";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/records/search", post(search))
		.route("/clustered/search", post(clustered_search))
		.route("/clustered/members", post(cluster_members))
		.route("/ner/analyze", get(ner_analyze))
		.route("/country/list", get(country_list))
		.route("/country/codes/{codes}", get(country_codes))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
struct NerQuery {
	query: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: &'static str,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
		Self { status, error_code, message: message.into() }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } => {
				Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
			},
			Error::NotFound { message } => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
			Error::ClientDisconnected => Self::new(
				StatusCode::BAD_REQUEST,
				"CLIENT_DISCONNECTED",
				"Client disconnected before the request completed.",
			),
			Error::Generation { message } => {
				tracing::error!(error = %message, "Generation failed.");

				Self::new(StatusCode::SERVICE_UNAVAILABLE, "GENERATION_FAILED", GENERATION_MESSAGE)
			},
			Error::Provider { message } => {
				tracing::error!(error = %message, "Provider request failed.");

				Self::new(StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE", UNAVAILABLE_MESSAGE)
			},
			Error::Storage { message } => {
				tracing::error!(error = %message, "Storage request failed.");

				Self::new(StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", UNAVAILABLE_MESSAGE)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn clustered_search(
	State(state): State<AppState>,
	Json(payload): Json<ClusterRequest>,
) -> Result<Json<ClusteredSearchResponse>, ApiError> {
	let response = cancel_on_disconnect(move |cancel| async move {
		state.service.clustered_search(payload, &cancel).await
	})
	.await?;

	Ok(Json(response))
}

async fn cluster_members(
	State(state): State<AppState>,
	Json(payload): Json<ClusterMembersRequest>,
) -> Result<Json<ClusterMembersResponse>, ApiError> {
	let response = cancel_on_disconnect(move |cancel| async move {
		state.service.cluster_members(payload, &cancel).await
	})
	.await?;

	Ok(Json(response))
}

async fn ner_analyze(
	State(state): State<AppState>,
	Query(params): Query<NerQuery>,
) -> Result<Json<NerAnalysisResponse>, ApiError> {
	let response = cancel_on_disconnect(move |cancel| async move {
		state.service.analyze(&params.query, &cancel).await
	})
	.await?;

	Ok(Json(response))
}

async fn country_list(State(state): State<AppState>) -> Result<Json<Vec<CountryRow>>, ApiError> {
	let response = state.service.countries().await?;

	Ok(Json(response))
}

async fn country_codes(
	State(state): State<AppState>,
	Path(codes): Path<String>,
) -> Result<Json<Value>, ApiError> {
	let response = state.service.country_geojson(&codes).await?;

	Ok(Json(response))
}

/// Runs `work` on its own task with a token that is cancelled when the handler is dropped,
/// which is what happens when the client goes away.
async fn cancel_on_disconnect<T, F, Fut>(work: F) -> Result<T, ApiError>
where
	T: Send + 'static,
	F: FnOnce(CancellationToken) -> Fut,
	Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
	let cancel = CancellationToken::new();
	let _guard = cancel.clone().drop_guard();
	let task = tokio::spawn(work(cancel));

	match task.await {
		Ok(result) => Ok(result?),
		Err(err) => Err(task_failure(err)),
	}
}

fn task_failure(err: JoinError) -> ApiError {
	tracing::error!(error = %err, panicked = err.is_panic(), "Request task failed.");

	ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL_MESSAGE)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn panicking_work_is_an_internal_error() {
		let err = cancel_on_disconnect(|_| async {
			if true {
				panic!("summary batch exploded");
			}

			Ok::<(), Error>(())
		})
		.await
		.expect_err("Expected the task failure to surface.");

		assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(err.error_code, "INTERNAL_ERROR");
		assert_eq!(err.message, INTERNAL_MESSAGE);
	}

	#[tokio::test]
	async fn service_errors_keep_their_mapping() {
		let err = cancel_on_disconnect(|_| async {
			Err::<(), Error>(Error::NotFound { message: "cluster 9 does not exist.".to_string() })
		})
		.await
		.expect_err("Expected the service error.");

		assert_eq!(err.status, StatusCode::NOT_FOUND);
		assert_eq!(err.message, "cluster 9 does not exist.");
	}
}
