//! Client for the external car depot.
//!
//! Every public call degrades to a solid-color car when the depot cannot be reached or answers
//! with something unexpected. Failures are logged here and never surface to callers.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::train::{GraceUser, TrainId};

/// Decorative payload rendered for a committed grace event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    /// Main color of the car.
    pub color: String,
    /// Richer attributes the depot may attach (sprite, rarity, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Car {
    /// Plain car painted in `color`, used when the depot has nothing better.
    pub fn solid(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            attributes: Map::new(),
        }
    }
}

/// What the depot reports when a train ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainEndOutcome {
    /// Number of cars that appeared for the first time on this train.
    pub debut_count: u32,
}

/// Car assignment seam used by the grace train machine.
pub trait CarDepot: Send + Sync {
    /// Car for the `index`-th committed event of a started train.
    fn assign_car(
        &self,
        train_id: TrainId,
        score: u64,
        participant: &GraceUser,
        index: usize,
    ) -> BoxFuture<'static, Car>;

    /// Cars for the buffered events of a train that just started, one per participant.
    fn start_batch(
        &self,
        train_id: TrainId,
        score: u64,
        participants: &[GraceUser],
    ) -> BoxFuture<'static, Vec<Car>>;

    /// Notify the depot that a train ended.
    fn end_train(&self, train_id: TrainId, score: u64) -> BoxFuture<'static, TrainEndOutcome>;
}

/// Connection settings for [`DepotClient`].
#[derive(Debug, Clone)]
pub struct DepotConfig {
    /// Base URL of the depot; `None` runs the client offline.
    pub base_url: Option<String>,
    /// Bearer token sent on every request.
    pub token: Option<String>,
    /// Transport timeout for a single request.
    pub timeout: Duration,
}

/// Failures talking to the depot. Only ever logged.
#[derive(Debug, Error)]
pub enum DepotError {
    /// Building the HTTP client failed.
    #[error("failed to build depot client")]
    ClientBuilder {
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent or timed out.
    #[error("failed to send depot request to `{path}`")]
    RequestSend {
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// The depot answered with a non-success status.
    #[error("unexpected depot response status {status} for `{path}`: {message}")]
    RequestStatus {
        /// Request path.
        path: String,
        /// Status returned.
        status: StatusCode,
        /// Error message.
        message: String,
    },
    /// The response body did not match the expected shape.
    #[error("failed to decode depot response for `{path}`")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// A batch start returned a different number of cars than requested.
    #[error("depot returned {got} cars for a batch of {expected}")]
    BatchSizeMismatch {
        /// Cars requested.
        expected: usize,
        /// Cars returned.
        got: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignCarBody<'a> {
    score: u64,
    index: usize,
    user: &'a GraceUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBatchBody<'a> {
    score: u64,
    users: &'a [GraceUser],
}

#[derive(Debug, Serialize)]
struct EndTrainBody {
    score: u64,
}

#[derive(Debug, Deserialize)]
struct StartBatchResponse {
    cars: Vec<Car>,
}

/// Body of `GET /api/user/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCars {
    /// Depot-side user id.
    pub user_id: String,
    /// Cars the user owns.
    pub cars: Vec<Car>,
}

#[derive(Debug, Deserialize)]
struct DepotErrorBody {
    message: String,
}

#[derive(Clone)]
struct Remote {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

/// HTTP implementation of [`CarDepot`].
#[derive(Clone)]
pub struct DepotClient {
    remote: Option<Remote>,
}

impl DepotClient {
    /// Build a client from `config`. Without a base URL every call returns its fallback.
    pub fn new(config: DepotConfig) -> Result<Self, DepotError> {
        let Some(base_url) = config.base_url else {
            return Ok(Self::offline());
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| DepotError::ClientBuilder { source })?;

        Ok(Self {
            remote: Some(Remote {
                client,
                base_url: Arc::from(base_url.trim_end_matches('/')),
                token: config.token.map(Arc::from),
            }),
        })
    }

    /// Client that never talks to the network.
    pub fn offline() -> Self {
        Self { remote: None }
    }

    /// Cars owned by a user; a 404 means none.
    pub async fn user_cars(&self, user_id: &str) -> Result<Vec<Car>, DepotError> {
        let Some(remote) = &self.remote else {
            return Ok(Vec::new());
        };
        let path = format!("api/user/{user_id}");
        match remote
            .call::<(), UserCars>(Method::GET, &path, None)
            .await
        {
            Ok(body) => Ok(body.cars),
            Err(DepotError::RequestStatus {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

impl Remote {
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.as_ref()),
            None => builder,
        }
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, DepotError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| DepotError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<DepotErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "no error message".into());
            return Err(DepotError::RequestStatus {
                path: path.to_string(),
                status,
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| DepotError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }
}

impl CarDepot for DepotClient {
    fn assign_car(
        &self,
        train_id: TrainId,
        score: u64,
        participant: &GraceUser,
        index: usize,
    ) -> BoxFuture<'static, Car> {
        let remote = self.remote.clone();
        let participant = participant.clone();
        Box::pin(async move {
            let Some(remote) = remote else {
                return Car::solid(participant.color);
            };
            let path = format!("api/trains/{train_id}/cars");
            let body = AssignCarBody {
                score,
                index,
                user: &participant,
            };
            match remote.call(Method::POST, &path, Some(&body)).await {
                Ok(car) => car,
                Err(err) => {
                    warn!(%train_id, user = %participant.id, error = %err, "depot car assignment failed; using fallback car");
                    Car::solid(participant.color)
                }
            }
        })
    }

    fn start_batch(
        &self,
        train_id: TrainId,
        score: u64,
        participants: &[GraceUser],
    ) -> BoxFuture<'static, Vec<Car>> {
        let remote = self.remote.clone();
        let participants = participants.to_vec();
        Box::pin(async move {
            let fallback = |participants: &[GraceUser]| {
                participants
                    .iter()
                    .map(|participant| Car::solid(participant.color.clone()))
                    .collect::<Vec<_>>()
            };
            let Some(remote) = remote else {
                return fallback(&participants);
            };

            let path = format!("api/trains/{train_id}/start");
            let body = StartBatchBody {
                score,
                users: &participants,
            };
            let result = remote
                .call::<_, StartBatchResponse>(Method::POST, &path, Some(&body))
                .await
                .and_then(|response| {
                    if response.cars.len() == participants.len() {
                        Ok(response.cars)
                    } else {
                        Err(DepotError::BatchSizeMismatch {
                            expected: participants.len(),
                            got: response.cars.len(),
                        })
                    }
                });

            match result {
                Ok(cars) => cars,
                Err(err) => {
                    warn!(%train_id, error = %err, "depot batch start failed; using fallback cars");
                    fallback(&participants)
                }
            }
        })
    }

    fn end_train(&self, train_id: TrainId, score: u64) -> BoxFuture<'static, TrainEndOutcome> {
        let remote = self.remote.clone();
        Box::pin(async move {
            let Some(remote) = remote else {
                debug!(%train_id, "depot offline; no debut count");
                return TrainEndOutcome::default();
            };
            let path = format!("api/trains/{train_id}/end");
            match remote
                .call(Method::POST, &path, Some(&EndTrainBody { score }))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(%train_id, error = %err, "depot end-of-train call failed");
                    TrainEndOutcome::default()
                }
            }
        })
    }
}
