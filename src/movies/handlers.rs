use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        CreateMovieRequest, ListQuery, MessageResponse, MovieListResponse, MovieResponse,
        StatsResponse, UpdateMovieRequest,
    },
    repo::{self, Genre, MovieChanges, MovieFilter, NewMovie, SortKey, DEFAULT_POSTER},
};
use crate::{auth::extractors::RequireUser, error::ApiError, state::AppState};

pub fn movie_routes() -> Router<AppState> {
    Router::new()
        // Literal route, kept ahead of /movie/:id.
        .route("/movie/stats", get(get_stats))
        .route("/movie", get(list_movies).post(create_movie))
        .route(
            "/movie/:id",
            get(get_movie).put(update_movie).delete(delete_movie),
        )
        .route("/movie/:id/watched", patch(toggle_watched))
        .route("/movie/:id/favorite", patch(toggle_favorite))
}

fn parse_genre(s: &str) -> Result<Genre, ApiError> {
    s.parse().map_err(ApiError::Validation)
}

fn check_rating(rating: f64) -> Result<(), ApiError> {
    if (0.0..=10.0).contains(&rating) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Rating must be between 0 and 10".into(),
        ))
    }
}

fn not_found() -> ApiError {
    // Also returned when the movie exists but belongs to someone else, so
    // foreign ids are indistinguishable from absent ones.
    ApiError::NotFound("Movie not found".into())
}

#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let data = repo::stats(&state.db, user.id).await?;
    Ok(Json(StatsResponse {
        success: true,
        data,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(payload): Json<CreateMovieRequest>,
) -> Result<(StatusCode, Json<MovieResponse>), ApiError> {
    let (Some(title), Some(description), Some(genre), Some(year), Some(duration)) = (
        payload.title.filter(|s| !s.is_empty()),
        payload.description.filter(|s| !s.is_empty()),
        payload.genre.filter(|s| !s.is_empty()),
        payload.year,
        payload.duration.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::Validation(
            "Please provide all required fields".into(),
        ));
    };

    let genre = parse_genre(&genre)?;
    let rating = payload.rating.unwrap_or(0.0);
    check_rating(rating)?;

    let new = NewMovie {
        title,
        description,
        rating,
        genre,
        year,
        duration,
        poster: payload.poster.unwrap_or_else(|| DEFAULT_POSTER.into()),
        watched: payload.watched.unwrap_or(false),
        favorite: payload.favorite.unwrap_or(false),
    };
    let movie = repo::insert(&state.db, user.id, new).await?;

    info!(user_id = %user.id, movie_id = %movie.id, "movie created");
    Ok((
        StatusCode::CREATED,
        Json(MovieResponse {
            success: true,
            message: Some("Movie added successfully".into()),
            data: movie,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_movies(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<MovieListResponse>, ApiError> {
    let genre = match query.genre.as_deref() {
        None | Some("all") | Some("") => None,
        Some(g) => Some(parse_genre(g)?),
    };
    let filter = MovieFilter {
        genre,
        watched: query.watched.as_deref().map(|w| w == "true"),
        favorite: query.favorite.as_deref() == Some("true"),
        search: query.search.filter(|s| !s.is_empty()),
        sort: SortKey::parse(query.sort_by.as_deref()),
    };

    let movies = repo::list(&state.db, user.id, &filter).await?;
    Ok(Json(MovieListResponse {
        success: true,
        count: movies.len(),
        data: movies,
    }))
}

#[instrument(skip(state))]
pub async fn get_movie(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MovieResponse>, ApiError> {
    let movie = repo::find_owned(&state.db, user.id, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(MovieResponse {
        success: true,
        message: None,
        data: movie,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_movie(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMovieRequest>,
) -> Result<Json<MovieResponse>, ApiError> {
    if matches!(&payload.title, Some(t) if t.is_empty())
        || matches!(&payload.description, Some(d) if d.is_empty())
    {
        return Err(ApiError::Validation(
            "Please provide all required fields".into(),
        ));
    }
    if let Some(rating) = payload.rating {
        check_rating(rating)?;
    }
    let changes = MovieChanges {
        title: payload.title,
        description: payload.description,
        rating: payload.rating,
        genre: payload.genre.as_deref().map(parse_genre).transpose()?,
        year: payload.year,
        duration: payload.duration,
        poster: payload.poster,
        watched: payload.watched,
        favorite: payload.favorite,
    };

    let movie = repo::update_owned(&state.db, user.id, id, &changes)
        .await?
        .ok_or_else(not_found)?;

    info!(user_id = %user.id, movie_id = %movie.id, "movie updated");
    Ok(Json(MovieResponse {
        success: true,
        message: Some("Movie updated successfully".into()),
        data: movie,
    }))
}

#[instrument(skip(state))]
pub async fn delete_movie(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !repo::delete_owned(&state.db, user.id, id).await? {
        return Err(not_found());
    }
    info!(user_id = %user.id, movie_id = %id, "movie deleted");
    Ok(Json(MessageResponse {
        success: true,
        message: "Movie deleted successfully".into(),
    }))
}

#[instrument(skip(state))]
pub async fn toggle_watched(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MovieResponse>, ApiError> {
    let movie = repo::toggle_watched(&state.db, user.id, id)
        .await?
        .ok_or_else(not_found)?;
    let message = format!(
        "Movie marked as {}",
        if movie.watched { "watched" } else { "unwatched" }
    );
    Ok(Json(MovieResponse {
        success: true,
        message: Some(message),
        data: movie,
    }))
}

#[instrument(skip(state))]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MovieResponse>, ApiError> {
    let movie = repo::toggle_favorite(&state.db, user.id, id)
        .await?
        .ok_or_else(not_found)?;
    let message = format!(
        "Movie {} favorites",
        if movie.favorite {
            "added to"
        } else {
            "removed from"
        }
    );
    Ok(Json(MovieResponse {
        success: true,
        message: Some(message),
        data: movie,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(check_rating(0.0).is_ok());
        assert!(check_rating(10.0).is_ok());
        assert!(check_rating(7.5).is_ok());
        assert!(check_rating(-0.1).is_err());
        assert!(check_rating(10.1).is_err());
    }

    #[test]
    fn stats_response_serializes_camel_case_aggregates() {
        let mut genre_breakdown = std::collections::BTreeMap::new();
        genre_breakdown.insert("Drama".to_string(), 2i64);
        genre_breakdown.insert("Sci-Fi".to_string(), 1i64);
        let res = StatsResponse {
            success: true,
            data: crate::movies::repo::MovieStats {
                total: 3,
                watched: 2,
                favorites: 1,
                avg_rating: 7.5,
                genre_breakdown,
            },
        };
        let v = serde_json::to_value(&res).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["total"], 3);
        assert_eq!(v["data"]["avgRating"], 7.5);
        assert_eq!(v["data"]["genreBreakdown"]["Sci-Fi"], 1);
        // The breakdown partitions the caller's set.
        let sum: i64 = v["data"]["genreBreakdown"]
            .as_object()
            .unwrap()
            .values()
            .map(|c| c.as_i64().unwrap())
            .sum();
        assert_eq!(sum, v["data"]["total"].as_i64().unwrap());
    }

    #[test]
    fn genre_all_disables_the_filter() {
        // Mirrors the list handler's match arms.
        for raw in [None, Some("all"), Some("")] {
            let parsed = match raw {
                None | Some("all") | Some("") => None,
                Some(g) => Some(parse_genre(g).unwrap()),
            };
            assert!(parsed.is_none());
        }
    }
}
