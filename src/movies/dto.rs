use serde::{Deserialize, Serialize};

use super::repo::{Movie, MovieStats};

/// Create payload. Every field is optional at the serde level so that
/// missing required fields surface as a 400 with the reference message
/// instead of a deserialization rejection. There is deliberately no owner
/// field: the owner always comes from the authenticated identity.
#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<String>,
    pub poster: Option<String>,
    pub watched: Option<bool>,
    pub favorite: Option<bool>,
}

/// Partial update payload; absent fields keep their stored values.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<String>,
    pub poster: Option<String>,
    pub watched: Option<bool>,
    pub favorite: Option<bool>,
}

/// Query string for the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub genre: Option<String>,
    pub watched: Option<String>,
    pub favorite: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Movie>,
}

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Movie,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: MovieStats,
}
