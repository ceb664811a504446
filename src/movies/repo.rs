use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_POSTER: &str =
    "https://images.unsplash.com/photo-1489599849927-2ee91cede3ba?w=300&h=450&fit=crop";

/// The fixed genre set, mirrored by the `genre` SQL enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "genre")]
pub enum Genre {
    #[sqlx(rename = "Action")]
    Action,
    #[serde(rename = "Sci-Fi")]
    #[sqlx(rename = "Sci-Fi")]
    SciFi,
    #[sqlx(rename = "Drama")]
    Drama,
    #[sqlx(rename = "Crime")]
    Crime,
    #[sqlx(rename = "Thriller")]
    Thriller,
    #[sqlx(rename = "Comedy")]
    Comedy,
    #[sqlx(rename = "Horror")]
    Horror,
    #[sqlx(rename = "Romance")]
    Romance,
    #[sqlx(rename = "Adventure")]
    Adventure,
    #[sqlx(rename = "Animation")]
    Animation,
}

impl Genre {
    pub const ALL: [Genre; 10] = [
        Genre::Action,
        Genre::SciFi,
        Genre::Drama,
        Genre::Crime,
        Genre::Thriller,
        Genre::Comedy,
        Genre::Horror,
        Genre::Romance,
        Genre::Adventure,
        Genre::Animation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::SciFi => "Sci-Fi",
            Genre::Drama => "Drama",
            Genre::Crime => "Crime",
            Genre::Thriller => "Thriller",
            Genre::Comedy => "Comedy",
            Genre::Horror => "Horror",
            Genre::Romance => "Romance",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| {
                let valid = Genre::ALL.map(|g| g.as_str()).join(", ");
                format!("Genre must be one of: {valid}")
            })
    }
}

/// Movie record in the database. Owned by exactly one user; the owner is
/// set at insert time and no query in this module can change it.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub rating: f64,
    pub genre: Genre,
    pub year: i32,
    pub duration: String,
    pub poster: String,
    pub watched: bool,
    pub favorite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub added_date: OffsetDateTime,
}

const MOVIE_COLUMNS: &str = "id, user_id, title, description, rating, genre, year, \
                             duration, poster, watched, favorite, added_date";

/// Validated fields for a new movie; the owner comes in separately from the
/// authenticated identity, never from the payload.
#[derive(Debug)]
pub struct NewMovie {
    pub title: String,
    pub description: String,
    pub rating: f64,
    pub genre: Genre,
    pub year: i32,
    pub duration: String,
    pub poster: String,
    pub watched: bool,
    pub favorite: bool,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub genre: Option<Genre>,
    pub year: Option<i32>,
    pub duration: Option<String>,
    pub poster: Option<String>,
    pub watched: Option<bool>,
    pub favorite: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    Rating,
    Year,
    Title,
    #[default]
    AddedDate,
}

impl SortKey {
    /// Keys outside the known set fall back to insertion order, as the
    /// reference behaves.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("rating") => SortKey::Rating,
            Some("year") => SortKey::Year,
            Some("title") => SortKey::Title,
            _ => SortKey::AddedDate,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            SortKey::Rating => " ORDER BY rating DESC",
            SortKey::Year => " ORDER BY year DESC",
            SortKey::Title => " ORDER BY title ASC",
            SortKey::AddedDate => " ORDER BY added_date DESC",
        }
    }
}

/// List filters; every one of them can only narrow the owner-scoped query.
#[derive(Debug, Default)]
pub struct MovieFilter {
    pub genre: Option<Genre>,
    pub watched: Option<bool>,
    pub favorite: bool,
    pub search: Option<String>,
    pub sort: SortKey,
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn build_list_query(user_id: Uuid, filter: &MovieFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {MOVIE_COLUMNS} FROM movies WHERE user_id = "
    ));
    qb.push_bind(user_id);
    if let Some(genre) = filter.genre {
        qb.push(" AND genre = ");
        qb.push_bind(genre);
    }
    if let Some(watched) = filter.watched {
        qb.push(" AND watched = ");
        qb.push_bind(watched);
    }
    if filter.favorite {
        qb.push(" AND favorite = TRUE");
    }
    if let Some(search) = &filter.search {
        qb.push(" AND title ILIKE ");
        qb.push_bind(format!("%{}%", escape_like(search)));
    }
    qb.push(filter.sort.order_clause());
    qb
}

pub async fn insert(db: &PgPool, user_id: Uuid, new: NewMovie) -> anyhow::Result<Movie> {
    let movie = sqlx::query_as::<_, Movie>(&format!(
        r#"
        INSERT INTO movies (user_id, title, description, rating, genre, year,
                            duration, poster, watched, favorite)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {MOVIE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.rating)
    .bind(new.genre)
    .bind(new.year)
    .bind(&new.duration)
    .bind(&new.poster)
    .bind(new.watched)
    .bind(new.favorite)
    .fetch_one(db)
    .await?;
    Ok(movie)
}

pub async fn list(db: &PgPool, user_id: Uuid, filter: &MovieFilter) -> anyhow::Result<Vec<Movie>> {
    let mut qb = build_list_query(user_id, filter);
    let movies = qb.build_query_as::<Movie>().fetch_all(db).await?;
    Ok(movies)
}

/// Ownership-checked lookup: an existing movie that belongs to another user
/// is indistinguishable from an absent one.
pub async fn find_owned(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Movie>> {
    let movie = sqlx::query_as::<_, Movie>(&format!(
        "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(movie)
}

pub async fn update_owned(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
    changes: &MovieChanges,
) -> anyhow::Result<Option<Movie>> {
    let movie = sqlx::query_as::<_, Movie>(&format!(
        r#"
        UPDATE movies SET
            title       = COALESCE($3, title),
            description = COALESCE($4, description),
            rating      = COALESCE($5, rating),
            genre       = COALESCE($6, genre),
            year        = COALESCE($7, year),
            duration    = COALESCE($8, duration),
            poster      = COALESCE($9, poster),
            watched     = COALESCE($10, watched),
            favorite    = COALESCE($11, favorite)
        WHERE id = $1 AND user_id = $2
        RETURNING {MOVIE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(changes.rating)
    .bind(changes.genre)
    .bind(changes.year)
    .bind(&changes.duration)
    .bind(&changes.poster)
    .bind(changes.watched)
    .bind(changes.favorite)
    .fetch_optional(db)
    .await?;
    Ok(movie)
}

pub async fn delete_owned(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM movies WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

// The toggles flip and return in one statement, so there is no window
// between the ownership check and the write.

pub async fn toggle_watched(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Movie>> {
    let movie = sqlx::query_as::<_, Movie>(&format!(
        "UPDATE movies SET watched = NOT watched WHERE id = $1 AND user_id = $2 \
         RETURNING {MOVIE_COLUMNS}"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(movie)
}

pub async fn toggle_favorite(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> anyhow::Result<Option<Movie>> {
    let movie = sqlx::query_as::<_, Movie>(&format!(
        "UPDATE movies SET favorite = NOT favorite WHERE id = $1 AND user_id = $2 \
         RETURNING {MOVIE_COLUMNS}"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(movie)
}

#[derive(Debug, FromRow)]
struct StatsTotals {
    total: i64,
    watched: i64,
    favorites: i64,
    avg_rating: f64,
}

/// Aggregates over the caller's movies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieStats {
    pub total: i64,
    pub watched: i64,
    pub favorites: i64,
    pub avg_rating: f64,
    pub genre_breakdown: BTreeMap<String, i64>,
}

pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub async fn stats(db: &PgPool, user_id: Uuid) -> anyhow::Result<MovieStats> {
    let totals = sqlx::query_as::<_, StatsTotals>(
        r#"
        SELECT COUNT(*)                        AS total,
               COUNT(*) FILTER (WHERE watched)  AS watched,
               COUNT(*) FILTER (WHERE favorite) AS favorites,
               COALESCE(AVG(rating), 0)         AS avg_rating
        FROM movies
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, (Genre, i64)>(
        "SELECT genre, COUNT(*) FROM movies WHERE user_id = $1 GROUP BY genre",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let genre_breakdown = rows
        .into_iter()
        .map(|(genre, count)| (genre.as_str().to_string(), count))
        .collect();

    Ok(MovieStats {
        total: totals.total,
        watched: totals.watched,
        favorites: totals.favorites,
        avg_rating: round1(totals.avg_rating),
        genre_breakdown,
    })
}
