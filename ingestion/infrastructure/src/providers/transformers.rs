use chrono::DateTime;
use media_ingestion_application::{DetailsTransformer, MediaRecord, TransformError};
use serde_json::Value;

fn required_str<'a>(raw: &'a Value, field: &'static str) -> Result<&'a str, TransformError> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(TransformError::MissingField(field))
}

fn numeric_id(raw: &Value, field: &'static str) -> Result<String, TransformError> {
    match raw.get(field) {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(TransformError::InvalidField {
            field,
            reason: format!("expected an id, got {}", other),
        }),
        None => Err(TransformError::MissingField(field)),
    }
}

fn optional_str(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Names of `[{ "name": ... }]` style arrays.
fn names(raw: &Value, field: &str) -> Vec<String> {
    raw.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn strings(raw: &Value, field: &str) -> Vec<String> {
    raw.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Keeps only the `YYYY-MM-DD` part of dates like `2004-07-15T00:00:00+00:00`.
fn date_part(value: String) -> String {
    value.get(..10).map(str::to_string).unwrap_or(value)
}

pub struct TmdbMovieTransformer;

impl DetailsTransformer for TmdbMovieTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        Ok(MediaRecord {
            api_id: numeric_id(raw, "id")?,
            name: required_str(raw, "title")?.to_string(),
            release_date: optional_str(raw, "release_date"),
            synopsis: optional_str(raw, "overview"),
            genres: names(raw, "genres"),
            payload: raw.clone(),
        })
    }
}

pub struct TmdbTvTransformer;

impl DetailsTransformer for TmdbTvTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        Ok(MediaRecord {
            api_id: numeric_id(raw, "id")?,
            name: required_str(raw, "name")?.to_string(),
            release_date: optional_str(raw, "first_air_date"),
            synopsis: optional_str(raw, "overview"),
            genres: names(raw, "genres"),
            payload: raw.clone(),
        })
    }
}

pub struct GoogleBooksTransformer;

impl DetailsTransformer for GoogleBooksTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        let info = raw
            .get("volumeInfo")
            .ok_or(TransformError::MissingField("volumeInfo"))?;

        // Categories come as "Fiction / Fantasy / Epic"; keep the top level.
        let mut genres: Vec<String> = Vec::new();
        for category in strings(info, "categories") {
            let top = category.split('/').next().unwrap_or("").trim().to_string();
            if !top.is_empty() && !genres.contains(&top) {
                genres.push(top);
            }
        }

        Ok(MediaRecord {
            api_id: required_str(raw, "id")?.to_string(),
            name: required_str(info, "title")?.to_string(),
            release_date: optional_str(info, "publishedDate"),
            synopsis: optional_str(info, "description"),
            genres,
            payload: raw.clone(),
        })
    }
}

pub struct JikanMangaTransformer;

impl DetailsTransformer for JikanMangaTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        let release_date = raw
            .get("published")
            .and_then(|published| optional_str(published, "from"))
            .map(date_part);

        Ok(MediaRecord {
            api_id: numeric_id(raw, "mal_id")?,
            name: required_str(raw, "title")?.to_string(),
            release_date,
            synopsis: optional_str(raw, "synopsis"),
            genres: names(raw, "genres"),
            payload: raw.clone(),
        })
    }
}

pub struct IgdbGameTransformer;

impl DetailsTransformer for IgdbGameTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        let release_date = match raw.get("first_release_date") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let seconds = value.as_i64().ok_or_else(|| TransformError::InvalidField {
                    field: "first_release_date",
                    reason: format!("expected unix seconds, got {}", value),
                })?;
                DateTime::from_timestamp(seconds, 0)
                    .map(|date| date.format("%Y-%m-%d").to_string())
            }
        };

        Ok(MediaRecord {
            api_id: numeric_id(raw, "id")?,
            name: required_str(raw, "name")?.to_string(),
            release_date,
            synopsis: optional_str(raw, "summary"),
            genres: names(raw, "genres"),
            payload: raw.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tmdb_movie() {
        let raw = json!({
            "id": 550,
            "title": "Fight Club",
            "release_date": "1999-10-15",
            "overview": "An insomniac office worker...",
            "genres": [{ "id": 18, "name": "Drama" }]
        });

        let record = TmdbMovieTransformer.transform(&raw).unwrap();
        assert_eq!(record.api_id, "550");
        assert_eq!(record.name, "Fight Club");
        assert_eq!(record.release_date.as_deref(), Some("1999-10-15"));
        assert_eq!(record.genres, vec!["Drama"]);
        assert_eq!(record.payload, raw);
    }

    #[test]
    fn test_tmdb_tv_empty_date_is_none() {
        let raw = json!({ "id": 1399, "name": "Game of Thrones", "first_air_date": "" });
        let record = TmdbTvTransformer.transform(&raw).unwrap();
        assert_eq!(record.release_date, None);
        assert_eq!(record.synopsis, None);
    }

    #[test]
    fn test_missing_title_is_rejected() {
        let err = TmdbMovieTransformer.transform(&json!({ "id": 1 })).unwrap_err();
        assert!(matches!(err, TransformError::MissingField("title")));
    }

    #[test]
    fn test_google_books_categories() {
        let raw = json!({
            "id": "zyTCAlFPjgYC",
            "volumeInfo": {
                "title": "The Google Story",
                "publishedDate": "2005-11-15",
                "categories": ["Business & Economics / Entrepreneurship", "Business & Economics / General"]
            }
        });

        let record = GoogleBooksTransformer.transform(&raw).unwrap();
        assert_eq!(record.api_id, "zyTCAlFPjgYC");
        assert_eq!(record.genres, vec!["Business & Economics"]);
    }

    #[test]
    fn test_jikan_published_date() {
        let raw = json!({
            "mal_id": 2,
            "title": "Berserk",
            "published": { "from": "1989-08-25T00:00:00+00:00" },
            "genres": [{ "name": "Action" }, { "name": "Drama" }]
        });

        let record = JikanMangaTransformer.transform(&raw).unwrap();
        assert_eq!(record.api_id, "2");
        assert_eq!(record.release_date.as_deref(), Some("1989-08-25"));
        assert_eq!(record.genres, vec!["Action", "Drama"]);
    }

    #[test]
    fn test_igdb_release_date_from_unix_seconds() {
        let raw = json!({ "id": 1942, "name": "The Witcher 3", "first_release_date": 1431993600 });
        let record = IgdbGameTransformer.transform(&raw).unwrap();
        assert_eq!(record.release_date.as_deref(), Some("2015-05-19"));
    }

    #[test]
    fn test_igdb_rejects_non_numeric_date() {
        let raw = json!({ "id": 1, "name": "x", "first_release_date": "soon" });
        assert!(matches!(
            IgdbGameTransformer.transform(&raw),
            Err(TransformError::InvalidField { field: "first_release_date", .. })
        ));
    }
}
