use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::depot::Car;

/// Cars a chat user owns at the depot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCarsResponse {
    /// Depot user id.
    pub user_id: String,
    /// Owned cars; empty when the user is unknown.
    #[schema(value_type = Vec<Object>)]
    pub cars: Vec<Car>,
}
