use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::form_urlencoded;

/// Width:height used for media that does not report its dimensions.
pub const DEFAULT_ASPECT_RATIO: f64 = 2.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMethod {
    #[default]
    Curated,
    Hot,
    Top,
    Rising,
    New,
    Controversial,
}

impl SortMethod {
    pub const ALL: [SortMethod; 6] = [
        SortMethod::Curated,
        SortMethod::Hot,
        SortMethod::Top,
        SortMethod::Rising,
        SortMethod::New,
        SortMethod::Controversial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMethod::Curated => "curated",
            SortMethod::Hot => "hot",
            SortMethod::Top => "top",
            SortMethod::Rising => "rising",
            SortMethod::New => "new",
            SortMethod::Controversial => "controversial",
        }
    }

    pub fn has_time_filter(&self) -> bool {
        matches!(self, SortMethod::Top | SortMethod::Controversial)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sort| sort.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    #[default]
    All,
    Year,
    Month,
    Day,
    Hour,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 5] = [
        TimeFilter::All,
        TimeFilter::Year,
        TimeFilter::Month,
        TimeFilter::Day,
        TimeFilter::Hour,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Year => "year",
            TimeFilter::Month => "month",
            TimeFilter::Day => "day",
            TimeFilter::Hour => "hour",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|filter| filter.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocationFeed {
    pub page_path: String,
    pub feed_id: String,
}

/// Per-session details handed to the client by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppDetails {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub reddit_users: Vec<String>,
    #[serde(default)]
    pub feeds: Vec<LocationFeed>,
}

/// Everything that identifies which feed is being viewed. Any difference
/// between two identities means a fresh load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LoadIdentity {
    pub reddit_user: Option<String>,
    pub subreddit: Option<String>,
    pub multi_owner: Option<String>,
    pub multi_name: Option<String>,
    pub feed_id: Option<String>,
    pub sort_method: SortMethod,
    pub time_filter: TimeFilter,
    pub search_query: String,
}

impl LoadIdentity {
    /// Derives an identity from a location path such as `r/pics/top` and its
    /// query string.
    pub fn from_location(details: &AppDetails, full_path: &str, search: &str) -> Self {
        let parts: Vec<&str> = full_path.split('/').filter(|p| !p.is_empty()).collect();
        let (page_path, sort_method) = match parts.last().and_then(|last| SortMethod::from_name(last)) {
            Some(sort) => (parts[..parts.len() - 1].join("/"), sort),
            None => (parts.join("/"), SortMethod::default()),
        };

        let search_query = search.trim_start_matches('?').to_string();
        let params = parse_query(&search_query);
        let lookup = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let time_filter = lookup("t")
            .and_then(TimeFilter::from_name)
            .unwrap_or_default();
        let reddit_user = match lookup("u") {
            Some(user) if details.reddit_users.iter().any(|known| known == user) => {
                Some(user.to_string())
            }
            _ => details.reddit_users.first().cloned(),
        };
        let feed_id = details
            .feeds
            .iter()
            .find(|feed| feed.page_path.trim_matches('/') == page_path)
            .map(|feed| feed.feed_id.clone());

        let mut identity = LoadIdentity {
            reddit_user,
            feed_id,
            sort_method,
            time_filter,
            search_query,
            ..LoadIdentity::default()
        };

        let segments: Vec<&str> = page_path.split('/').collect();
        match segments.as_slice() {
            ["r", name] => identity.subreddit = Some((*name).to_string()),
            ["user" | "u", owner, "m", name] => {
                identity.multi_owner = Some((*owner).to_string());
                identity.multi_name = Some((*name).to_string());
            }
            _ => {}
        }

        identity
    }

    /// Key/value pairs carried in the search component, in order.
    pub fn search_params(&self) -> Vec<(String, String)> {
        parse_query(&self.search_query)
    }

    /// True when the search already names a fixed set of submissions.
    pub fn pins_ids(&self) -> bool {
        self.search_params().iter().any(|(k, _)| k == "reddit_ids")
    }

    /// Stable key for this identity; equal keys mean the same load.
    pub fn load_key(&self) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        [
            field(&self.reddit_user),
            field(&self.subreddit),
            field(&self.multi_owner),
            field(&self.multi_name),
            field(&self.feed_id),
            self.sort_method.as_str().to_string(),
            self.time_filter.as_str().to_string(),
            self.search_query.clone(),
        ]
        .join("|")
    }
}

impl fmt::Display for LoadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.subreddit, &self.multi_owner, &self.multi_name) {
            (Some(sub), _, _) => write!(f, "r/{sub}")?,
            (None, Some(owner), Some(name)) => write!(f, "u/{owner}/m/{name}")?,
            _ => write!(f, "front")?,
        }
        write!(f, " {}", self.sort_method.as_str())?;
        if self.sort_method.has_time_filter() {
            write!(f, "/{}", self.time_filter.as_str())?;
        }
        if !self.search_query.is_empty() {
            write!(f, " ?{}", self.search_query)?;
        }
        Ok(())
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// One page of results as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub embed: Option<Embed>,
}

impl Item {
    /// Aspect ratio for layout, `None` for items without embeddable media.
    pub fn aspect_ratio(&self) -> Option<f64> {
        self.embed.as_ref().map(Embed::aspect_ratio)
    }
}

/// Reads an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VideoStream {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "embed_type", rename_all = "lowercase")]
pub enum Embed {
    Html {
        #[serde(default, deserialize_with = "null_as_default")]
        html: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
    Image {
        #[serde(default, deserialize_with = "null_as_default")]
        url: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        over_18: Option<bool>,
    },
    /// Video with its poster image in `url`.
    Video {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        over_18: Option<bool>,
        #[serde(default)]
        video: Option<VideoStream>,
    },
    Gallery {
        #[serde(default, deserialize_with = "null_as_default")]
        url: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        over_18: Option<bool>,
        #[serde(default, deserialize_with = "null_as_default")]
        gallery: Vec<Embed>,
    },
}

impl Embed {
    pub fn dimensions(&self) -> (Option<u32>, Option<u32>) {
        match self {
            Embed::Html { width, height, .. }
            | Embed::Image { width, height, .. }
            | Embed::Video { width, height, .. }
            | Embed::Gallery { width, height, .. } => (*width, *height),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if let (Some(w), Some(h)) = self.dimensions() {
            if w > 0 && h > 0 {
                return f64::from(w) / f64::from(h);
            }
        }
        match self {
            Embed::Gallery { gallery, .. } => gallery
                .first()
                .map(Embed::aspect_ratio)
                .unwrap_or(DEFAULT_ASPECT_RATIO),
            Embed::Video {
                video: Some(stream),
                ..
            } => match (stream.width, stream.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => f64::from(w) / f64::from(h),
                _ => DEFAULT_ASPECT_RATIO,
            },
            _ => DEFAULT_ASPECT_RATIO,
        }
    }

    pub fn is_nsfw(&self) -> bool {
        match self {
            Embed::Html { .. } => false,
            Embed::Image { over_18, .. } | Embed::Video { over_18, .. } => {
                over_18.unwrap_or(false)
            }
            Embed::Gallery {
                over_18, gallery, ..
            } => over_18.unwrap_or(false) || gallery.iter().any(Embed::is_nsfw),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Embed::Html { .. } => "html",
            Embed::Image { .. } => "image",
            Embed::Video { .. } => "video",
            Embed::Gallery { .. } => "gallery",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> AppDetails {
        AppDetails {
            is_authenticated: true,
            reddit_users: vec!["alice".into(), "bob".into()],
            feeds: vec![LocationFeed {
                page_path: "curated/art".into(),
                feed_id: "7".into(),
            }],
        }
    }

    #[test]
    fn location_with_sort_suffix() {
        let id = LoadIdentity::from_location(&details(), "r/pics/top", "?t=day&u=bob");
        assert_eq!(id.subreddit.as_deref(), Some("pics"));
        assert_eq!(id.sort_method, SortMethod::Top);
        assert_eq!(id.time_filter, TimeFilter::Day);
        assert_eq!(id.reddit_user.as_deref(), Some("bob"));
        assert_eq!(id.search_query, "t=day&u=bob");
    }

    #[test]
    fn location_defaults_to_curated_and_first_user() {
        let id = LoadIdentity::from_location(&details(), "/curated/art/", "?u=mallory");
        assert_eq!(id.sort_method, SortMethod::Curated);
        assert_eq!(id.feed_id.as_deref(), Some("7"));
        assert_eq!(id.reddit_user.as_deref(), Some("alice"));
        assert_eq!(id.time_filter, TimeFilter::All);
        assert!(id.subreddit.is_none());
    }

    #[test]
    fn location_parses_multi() {
        let id = LoadIdentity::from_location(&details(), "user/carol/m/cats/new", "");
        assert_eq!(id.multi_owner.as_deref(), Some("carol"));
        assert_eq!(id.multi_name.as_deref(), Some("cats"));
        assert_eq!(id.sort_method, SortMethod::New);
    }

    #[test]
    fn pins_ids_detects_reddit_ids() {
        let id = LoadIdentity {
            search_query: "?reddit_ids=a,b".into(),
            ..LoadIdentity::default()
        };
        assert!(id.pins_ids());
        assert!(!LoadIdentity::default().pins_ids());
    }

    #[test]
    fn load_key_tracks_every_field() {
        let a = LoadIdentity::from_location(&details(), "r/pics/top", "?t=day");
        let b = LoadIdentity::from_location(&details(), "r/pics/top", "?t=day");
        let c = LoadIdentity::from_location(&details(), "r/pics/top", "?t=week");
        assert_eq!(a.load_key(), b.load_key());
        assert_ne!(a.load_key(), c.load_key());
    }

    #[test]
    fn embed_decodes_tagged_variants() {
        let raw = r#"{
            "embed_type": "gallery",
            "url": "https://i.test/1.jpg",
            "width": 800,
            "height": 400,
            "over_18": null,
            "gallery": [
                {"embed_type": "gallery", "url": "https://i.test/1.jpg", "width": 800, "height": 400},
                {"embed_type": "gallery", "url": "https://i.test/2.jpg", "width": 300, "height": 600, "over_18": true}
            ]
        }"#;
        let embed: Embed = serde_json::from_str(raw).unwrap();
        assert_eq!(embed.kind(), "gallery");
        assert!((embed.aspect_ratio() - 2.0).abs() < f64::EPSILON);
        assert!(embed.is_nsfw());
    }

    #[test]
    fn embed_accepts_null_fields() {
        let raw = r#"{
            "id": "g1",
            "title": "album",
            "posted_at": "2024-01-01T00:00:00Z",
            "embed": {
                "embed_type": "gallery",
                "url": null,
                "html": null,
                "width": null,
                "height": null,
                "video": null,
                "gallery": [
                    {"embed_type": "image", "url": "https://i.test/1.jpg", "html": null, "width": 300, "height": 600, "gallery": null, "video": null},
                    {"embed_type": "image", "url": null, "html": null, "width": null, "height": null, "gallery": null, "video": null}
                ]
            }
        }"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        let Some(Embed::Gallery { url, gallery, .. }) = &item.embed else {
            panic!("expected a gallery, got {:?}", item.embed);
        };
        assert!(url.is_empty());
        assert_eq!(gallery.len(), 2);
        assert!(matches!(&gallery[1], Embed::Image { url, .. } if url.is_empty()));
        assert!((item.aspect_ratio().unwrap() - 0.5).abs() < f64::EPSILON);

        let html: Embed =
            serde_json::from_str(r#"{"embed_type": "html", "html": null, "url": null}"#).unwrap();
        assert_eq!(html.kind(), "html");

        let video: Embed = serde_json::from_str(
            r#"{"embed_type": "video", "url": null, "video": {"embed_type": "video", "url": null, "width": 640, "height": 360, "gallery": null}}"#,
        )
        .unwrap();
        assert!((video.aspect_ratio() - 640.0 / 360.0).abs() < 1e-9);
    }

    #[test]
    fn missing_dimensions_use_default_ratio() {
        let embed = Embed::Html {
            html: "<iframe></iframe>".into(),
            width: None,
            height: None,
        };
        assert!((embed.aspect_ratio() - DEFAULT_ASPECT_RATIO).abs() < f64::EPSILON);
    }

    #[test]
    fn item_without_embed_has_no_ratio() {
        let raw = r#"{"id": "x1", "title": "t", "posted_at": "2024-01-01T00:00:00Z", "score": 3}"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        assert!(item.aspect_ratio().is_none());
        assert_eq!(item.score, 3);
    }
}
