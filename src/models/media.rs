use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of media a record describes. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Anime,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Anime => "anime",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            "anime" => Ok(MediaType::Anime),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// A movie, show or anime together with the aesthetic descriptor that gets embedded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRecord {
    pub id: String,
    pub title: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_summary: Option<String>,
    /// Free-text aesthetic/emotional description; this is what retrieval compares against
    pub vibe_profile: String,
    /// Running total of external quality boosts
    pub quality_score: f64,
    /// Mention-frequency signal
    pub popularity_score: f64,
    /// TMDB/IMDB identifier when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// Creates a record with zeroed quality/popularity signals and an id derived from title and type
    pub fn new(title: String, media_type: MediaType, vibe_profile: String) -> Self {
        let now = Utc::now();
        Self {
            id: media_id(&title, media_type),
            title,
            media_type,
            year: None,
            plot_summary: None,
            vibe_profile,
            quality_score: 0.0,
            popularity_score: 0.0,
            external_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_plot_summary(mut self, plot_summary: Option<String>) -> Self {
        self.plot_summary = plot_summary;
        self
    }

    pub fn with_scores(mut self, quality_score: f64, popularity_score: f64) -> Self {
        self.quality_score = quality_score;
        self.popularity_score = popularity_score;
        self
    }
}

/// Derives the stable media id: `<type>-<title>` with spaces and dashes collapsed to `-`.
///
/// Letters and digits of any script are kept. When other characters have to be dropped,
/// a name-based UUID of the trimmed title is appended so distinct titles keep distinct ids.
pub fn media_id(title: &str, media_type: MediaType) -> String {
    let title = title.trim();
    let mut lossy = false;
    let slug: String = title
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() => Some(c),
            ' ' | '-' => Some('-'),
            _ => {
                lossy = true;
                None
            }
        })
        .collect();

    if lossy || slug.is_empty() {
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, title.as_bytes()).simple().to_string();
        format!("{}-{}-{}", media_type.as_str(), slug, &digest[..8])
    } else {
        format!("{}-{}", media_type.as_str(), slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_is_deterministic() {
        assert_eq!(media_id("Odd Taxi", MediaType::Anime), "anime-Odd-Taxi");
        assert_eq!(
            media_id("Odd Taxi", MediaType::Anime),
            media_id("Odd Taxi", MediaType::Anime)
        );
    }

    #[test]
    fn test_media_id_strips_punctuation() {
        let id = media_id("Id:Invaded", MediaType::Anime);
        assert!(id.starts_with("anime-IdInvaded-"));
        assert_eq!(id, media_id("  Id:Invaded ", MediaType::Anime));
        assert_ne!(id, media_id("IdInvaded", MediaType::Anime));
        assert_eq!(media_id("IdInvaded", MediaType::Anime), "anime-IdInvaded");
    }

    #[test]
    fn test_media_id_keeps_non_ascii_titles_apart() {
        let spirited = media_id("千と千尋の神隠し", MediaType::Anime);
        let your_name = media_id("君の名は。", MediaType::Anime);

        assert_eq!(spirited, "anime-千と千尋の神隠し");
        assert!(your_name.starts_with("anime-君の名は-"));
        assert_ne!(spirited, your_name);
        assert_ne!(media_id("!!!", MediaType::Movie), media_id("???", MediaType::Movie));
        assert_ne!(media_id("!!!", MediaType::Movie), "movie-");
    }

    #[test]
    fn test_media_id_distinguishes_type() {
        assert_ne!(
            media_id("Solaris", MediaType::Movie),
            media_id("Solaris", MediaType::Tv)
        );
    }

    #[test]
    fn test_media_type_parsing() {
        assert_eq!("movie".parse::<MediaType>(), Ok(MediaType::Movie));
        assert_eq!(" TV ".parse::<MediaType>(), Ok(MediaType::Tv));
        assert_eq!("anime".parse::<MediaType>(), Ok(MediaType::Anime));
        assert!("podcast".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_media_type_serialization() {
        assert_eq!(serde_json::to_string(&MediaType::Tv).unwrap(), "\"tv\"");
        let parsed: MediaType = serde_json::from_str("\"anime\"").unwrap();
        assert_eq!(parsed, MediaType::Anime);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = MediaRecord::new(
            "Akira".to_string(),
            MediaType::Anime,
            "Hyperkinetic cyberpunk".to_string(),
        )
        .with_year(Some(1988));

        assert_eq!(record.id, "anime-Akira");
        assert_eq!(record.year, Some(1988));
        assert_eq!(record.quality_score, 0.0);
        assert_eq!(record.popularity_score, 0.0);
        assert_eq!(record.created_at, record.updated_at);
    }
}
