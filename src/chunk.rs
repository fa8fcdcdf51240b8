//! Chunk schema shared by the write and read paths.
//!
//! Upstream chunkers hand over loosely shaped [`IngestRecord`]s; they are
//! validated exactly once into a [`ChunkDraft`] and become an immutable
//! [`Chunk`] when the writer assigns the join key.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::canonical::{canonicalize, Fingerprint};
use crate::error::IngestRecordError;

/// Raw record produced by upstream chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRecord {
    /// Chunk body, possibly still carrying markdown or HTML markup.
    pub text: String,
    /// Provenance attached by the chunker.
    pub metadata: IngestMetadata,
}

/// Provenance block of an [`IngestRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMetadata {
    /// Owning restaurant, when the chunker could attribute one.
    #[serde(default)]
    pub restaurant_name: Option<String>,
    /// Page the chunk was cut from.
    pub url: String,
    /// Fetcher that produced the page (e.g. `crawl4ai`).
    pub source: String,
    /// Fetch time; defaults to ingestion time when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Chunking strategy tag.
    #[serde(default)]
    pub chunk_type: Option<String>,
    /// Dish mentions extracted upstream; replaces text-derived ones when set.
    #[serde(default)]
    pub dishes: Vec<DishMention>,
}

/// Closed set of upstream chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Header-structured menu sections.
    Hierarchical,
    /// Dish-level semantic splits.
    Semantic,
    /// LLM-proposed comparison chunks.
    LlmGuided,
    /// LLM-extracted attributes.
    Attribute,
    /// Text fused with an image caption.
    Multimodal,
    /// Dynamic window sized by text entropy.
    Entropy,
    /// Cross-menu relationship chunks.
    Graph,
}

impl ChunkStrategy {
    /// Stable tag used in stores and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Semantic => "semantic",
            Self::LlmGuided => "llm_guided",
            Self::Attribute => "attribute",
            Self::Multimodal => "multimodal",
            Self::Entropy => "entropy",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = IngestRecordError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hierarchical" => Ok(Self::Hierarchical),
            "semantic" => Ok(Self::Semantic),
            "llm_guided" => Ok(Self::LlmGuided),
            "attribute" => Ok(Self::Attribute),
            "multimodal" => Ok(Self::Multimodal),
            "entropy" => Ok(Self::Entropy),
            "graph" => Ok(Self::Graph),
            _ => Err(IngestRecordError::UnknownStrategy(raw.to_string())),
        }
    }
}

/// A dish named in a chunk, optionally with its price in rupees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishMention {
    /// Display name as written on the menu.
    pub name: String,
    /// Whole-rupee price.
    #[serde(default)]
    pub price: Option<u32>,
}

/// Attributes derived from chunk text at ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedTags {
    /// Price strings as written (`₹350`, `Rs. 120`).
    pub prices: Vec<String>,
    /// Dietary labels found in the text.
    pub dietary: Vec<String>,
    /// Dishes feeding the graph `Dish`/`SERVES` entities.
    pub dishes: Vec<DishMention>,
}

/// Globally unique chunk identifier; the only join key between stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derives the identifier from provenance and content fingerprint.
    pub fn derive(source: &str, url: &str, fingerprint: &Fingerprint) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(fingerprint.as_str().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..32].to_string())
    }

    /// Wraps an identifier read back from a store.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record that passed boundary validation but has no join key yet.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Trimmed original text.
    pub text: String,
    /// Text as hashed for deduplication.
    pub canonical: String,
    /// Owning restaurant.
    pub restaurant_name: Option<String>,
    /// Parsed page URL.
    pub url: Url,
    /// Fetcher tag.
    pub source: String,
    /// Chunking strategy, when declared.
    pub strategy: Option<ChunkStrategy>,
    /// Fetch time.
    pub timestamp: DateTime<Utc>,
    /// Extracted prices, dietary tags, and dishes.
    pub derived_tags: DerivedTags,
}

impl ChunkDraft {
    /// Validates an upstream record.
    pub fn from_record(record: IngestRecord) -> Result<Self, IngestRecordError> {
        let IngestRecord { text, metadata } = record;
        let text = text.trim().to_string();
        let canonical = canonicalize(&text);
        if canonical.is_empty() {
            return Err(IngestRecordError::EmptyText);
        }
        let url = Url::parse(metadata.url.trim()).map_err(|err| IngestRecordError::InvalidUrl {
            url: metadata.url.clone(),
            reason: err.to_string(),
        })?;
        let strategy = metadata
            .chunk_type
            .as_deref()
            .map(ChunkStrategy::from_str)
            .transpose()?;
        let restaurant_name = metadata
            .restaurant_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let derived_tags = derive_tags(&canonical, restaurant_name.as_deref(), metadata.dishes);
        Ok(Self {
            text,
            canonical,
            restaurant_name,
            url,
            source: metadata.source.trim().to_string(),
            strategy,
            timestamp: metadata.timestamp.unwrap_or_else(Utc::now),
            derived_tags,
        })
    }

    /// Assigns the join key, producing the immutable chunk.
    pub fn into_chunk(self, fingerprint: Fingerprint) -> Chunk {
        let chunk_id = ChunkId::derive(&self.source, self.url.as_str(), &fingerprint);
        Chunk {
            chunk_id,
            fingerprint,
            text: self.text,
            restaurant_name: self.restaurant_name,
            url: self.url,
            source: self.source,
            strategy: self.strategy,
            timestamp: self.timestamp,
            derived_tags: self.derived_tags,
        }
    }
}

/// Immutable indexed unit.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Join key shared by both stores.
    pub chunk_id: ChunkId,
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Original (trimmed) text.
    pub text: String,
    /// Owning restaurant.
    pub restaurant_name: Option<String>,
    /// Page URL.
    pub url: Url,
    /// Fetcher tag.
    pub source: String,
    /// Chunking strategy.
    pub strategy: Option<ChunkStrategy>,
    /// Fetch time.
    pub timestamp: DateTime<Utc>,
    /// Derived attributes.
    pub derived_tags: DerivedTags,
}

/// Extracts prices, dietary labels, and dish mentions from canonical text.
///
/// Explicit dishes from upstream win over the text-derived ones. A known
/// restaurant name is never taken as part of a text-derived dish name.
pub fn derive_tags(
    canonical: &str,
    restaurant: Option<&str>,
    explicit_dishes: Vec<DishMention>,
) -> DerivedTags {
    let prices = price_pattern()
        .find_iter(canonical)
        .map(|m| m.as_str().trim().to_string())
        .collect();

    let lower = canonical.to_lowercase();
    let mut dietary = Vec::new();
    for (needle, label) in [
        ("vegetarian", "vegetarian"),
        ("vegan", "vegan"),
        ("gluten-free", "gluten-free"),
        ("gluten free", "gluten-free"),
    ] {
        if lower.contains(needle) && !dietary.iter().any(|tag| tag == label) {
            dietary.push(label.to_string());
        }
    }

    let dishes = if explicit_dishes.is_empty() {
        extract_dishes(canonical, restaurant)
    } else {
        explicit_dishes
            .into_iter()
            .map(|dish| DishMention {
                name: dish.name.trim().to_string(),
                price: dish.price,
            })
            .filter(|dish| !dish.name.is_empty())
            .collect()
    };

    DerivedTags {
        prices,
        dietary,
        dishes,
    }
}

fn extract_dishes(text: &str, restaurant: Option<&str>) -> Vec<DishMention> {
    let mut dishes: Vec<DishMention> = Vec::new();
    for caps in dish_pattern().captures_iter(text) {
        let name = strip_restaurant(caps[1].trim(), restaurant);
        if name.is_empty() {
            continue;
        }
        let name = name.to_string();
        let price = caps[2].parse::<u32>().ok();
        if let Some(existing) = dishes.iter_mut().find(|dish| dish.name == name) {
            existing.price = existing.price.or(price);
        } else {
            dishes.push(DishMention { name, price });
        }
    }
    dishes
}

fn strip_restaurant<'a>(name: &'a str, restaurant: Option<&str>) -> &'a str {
    let Some(restaurant) = restaurant.filter(|r| !r.is_empty()) else {
        return name;
    };
    match name.strip_prefix(restaurant) {
        Some("") => "",
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => name,
    }
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:₹|Rs\.?)\s*\d+(?:\.\d+)?").expect("price regex"))
}

fn dish_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Z][A-Za-z'&]*(?:[ \t]+[A-Z][A-Za-z'&]*)*)[ \t]*[-:]?[ \t]*\(?(?:₹|Rs\.?)[ \t]*(\d+)")
            .expect("dish regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, source: &str) -> IngestRecord {
        IngestRecord {
            text: text.to_string(),
            metadata: IngestMetadata {
                restaurant_name: Some("Bikanervala".into()),
                url: "https://bikanervala.example/menu".into(),
                source: source.into(),
                timestamp: None,
                chunk_type: Some("hierarchical".into()),
                dishes: Vec::new(),
            },
        }
    }

    #[test]
    fn derives_dishes_and_prices_from_text() {
        let tags = derive_tags(
            "Butter Chicken ₹350, Paneer Tikka (₹250) vegetarian",
            Some("Bikanervala"),
            Vec::new(),
        );
        assert_eq!(tags.prices, vec!["₹350", "₹250"]);
        assert_eq!(tags.dietary, vec!["vegetarian"]);
        assert_eq!(
            tags.dishes,
            vec![
                DishMention {
                    name: "Butter Chicken".into(),
                    price: Some(350)
                },
                DishMention {
                    name: "Paneer Tikka".into(),
                    price: Some(250)
                },
            ]
        );
    }

    #[test]
    fn restaurant_name_is_not_part_of_a_dish() {
        let tags = derive_tags(
            "Restaurant: Bikanervala Butter Chicken ₹350, Bikanervalaspecial Thali ₹500",
            Some("Bikanervala"),
            Vec::new(),
        );
        let names: Vec<&str> = tags.dishes.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Butter Chicken", "Bikanervalaspecial Thali"]);

        let bare = derive_tags("Bikanervala ₹0", Some("Bikanervala"), Vec::new());
        assert!(bare.dishes.is_empty());
    }

    #[test]
    fn explicit_dishes_override_text() {
        let tags = derive_tags(
            "Butter Chicken ₹350",
            None,
            vec![DishMention {
                name: " Dal Makhani ".into(),
                price: None,
            }],
        );
        assert_eq!(tags.dishes.len(), 1);
        assert_eq!(tags.dishes[0].name, "Dal Makhani");
    }

    #[test]
    fn rejects_unknown_strategy_and_bad_url() {
        let mut bad_strategy = record("Samosa ₹40", "crawl4ai");
        bad_strategy.metadata.chunk_type = Some("vibes".into());
        assert_eq!(
            ChunkDraft::from_record(bad_strategy).unwrap_err(),
            IngestRecordError::UnknownStrategy("vibes".into())
        );

        let mut bad_url = record("Samosa ₹40", "crawl4ai");
        bad_url.metadata.url = "not a url".into();
        assert!(matches!(
            ChunkDraft::from_record(bad_url),
            Err(IngestRecordError::InvalidUrl { .. })
        ));

        assert_eq!(
            ChunkDraft::from_record(record("  <p> </p> ", "crawl4ai")).unwrap_err(),
            IngestRecordError::EmptyText
        );
    }

    #[test]
    fn chunk_id_depends_on_source_url_and_fingerprint() {
        let fp = Fingerprint::of("Samosa ₹40");
        let a = ChunkId::derive("crawl4ai", "https://a.example/", &fp);
        let b = ChunkId::derive("selenium", "https://a.example/", &fp);
        assert_eq!(a, ChunkId::derive("crawl4ai", "https://a.example/", &fp));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
