use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Series,
    Anime,
    Movies,
    Games,
    Books,
    Manga,
}

impl MediaType {
    pub const ALL: [MediaType; 6] = [
        MediaType::Series,
        MediaType::Anime,
        MediaType::Movies,
        MediaType::Games,
        MediaType::Books,
        MediaType::Manga,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Series => "series",
            MediaType::Anime => "anime",
            MediaType::Movies => "movies",
            MediaType::Games => "games",
            MediaType::Books => "books",
            MediaType::Manga => "manga",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "series" => Ok(MediaType::Series),
            "anime" => Ok(MediaType::Anime),
            "movies" => Ok(MediaType::Movies),
            "games" => Ok(MediaType::Games),
            "books" => Ok(MediaType::Books),
            "manga" => Ok(MediaType::Manga),
            other => Err(MediaTypeError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaTypeError {
    #[error("Unknown media type: {0}")]
    Unknown(String),
}
