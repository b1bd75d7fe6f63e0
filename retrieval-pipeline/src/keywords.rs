//! Static keyword tables used for query analysis and candidate filtering.
//!
//! Tables are ordered lists rather than maps: product-type inference is first-match in
//! declaration order, and keeping the order explicit makes file-based tables behave the same
//! as the built-in defaults. Matching is plain substring containment against a lower-cased
//! haystack, so short keywords can match inside longer words.

use std::sync::Arc;

use common::{error::AppError, utils::config::AppConfig};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One concept (category, attribute or product type) and its trigger keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

impl KeywordEntry {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|kw| (*kw).to_string()).collect(),
        }
    }

    /// `haystack` must already be lower-cased.
    pub fn matches(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|kw| haystack.contains(kw.as_str()))
    }

    /// First keyword, in declaration order, contained in `haystack`.
    pub fn first_hit(&self, haystack: &str) -> Option<&str> {
        self.keywords
            .iter()
            .map(String::as_str)
            .find(|kw| haystack.contains(kw))
    }

    pub fn count_hits(&self, haystack: &str) -> usize {
        self.keywords
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .count()
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.keywords = self
            .keywords
            .iter()
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();
    }
}

/// Ordered collection of keyword entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&KeywordEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Entries with at least one keyword in `haystack`, in declaration order.
    pub fn matching<'a>(&'a self, haystack: &'a str) -> impl Iterator<Item = &'a KeywordEntry> {
        self.entries.iter().filter(move |entry| entry.matches(haystack))
    }

    pub fn first_match(&self, haystack: &str) -> Option<&KeywordEntry> {
        self.entries.iter().find(|entry| entry.matches(haystack))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalize(&mut self) {
        for entry in &mut self.entries {
            entry.normalize();
        }
        self.entries.retain(|entry| !entry.name.is_empty());
    }
}

/// Special-cased category relationships that earn a weight other than the fallback.
///
/// A rule applies when any target category contains one of `target_markers` and the item's
/// own category contains one of `item_markers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAffinity {
    pub target_markers: Vec<String>,
    pub item_markers: Vec<String>,
    pub weight: f32,
}

impl CategoryAffinity {
    fn new(target_markers: &[&str], item_markers: &[&str], weight: f32) -> Self {
        Self {
            target_markers: target_markers.iter().map(|m| (*m).to_string()).collect(),
            item_markers: item_markers.iter().map(|m| (*m).to_string()).collect(),
            weight,
        }
    }

    /// `item_category` and every target must already be lower-cased.
    pub fn applies<S: AsRef<str>>(&self, item_category: &str, targets: &[S]) -> bool {
        let target_hit = targets.iter().any(|target| {
            self.target_markers
                .iter()
                .any(|marker| target.as_ref().contains(marker.as_str()))
        });
        target_hit
            && self
                .item_markers
                .iter()
                .any(|marker| item_category.contains(marker.as_str()))
    }

    fn normalize(&mut self) {
        for marker in self
            .target_markers
            .iter_mut()
            .chain(self.item_markers.iter_mut())
        {
            *marker = marker.trim().to_lowercase();
        }
        self.target_markers.retain(|m| !m.is_empty());
        self.item_markers.retain(|m| !m.is_empty());
    }
}

/// Maps query trigger words to keywords that should boost matching items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostPattern {
    pub triggers: Vec<String>,
    pub boost: Vec<String>,
}

impl BoostPattern {
    fn new(triggers: &[&str], boost: &[&str]) -> Self {
        Self {
            triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
            boost: boost.iter().map(|b| (*b).to_string()).collect(),
        }
    }

    fn normalize(&mut self) {
        self.triggers = self
            .triggers
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.boost.retain(|b| !b.trim().is_empty());
    }
}

/// All read-only tables the ranking engine consults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTables {
    #[serde(default)]
    pub categories: KeywordTable,
    #[serde(default)]
    pub attributes: KeywordTable,
    #[serde(default)]
    pub product_types: KeywordTable,
    #[serde(default)]
    pub category_affinities: Vec<CategoryAffinity>,
    #[serde(default)]
    pub boost_patterns: Vec<BoostPattern>,
}

impl KeywordTables {
    /// Reads tables from any file format the `config` crate understands.
    pub fn from_path(path: &str) -> Result<Self, AppError> {
        let raw = Config::builder()
            .add_source(File::with_name(path).required(true))
            .build()?;
        let tables: Self = raw.try_deserialize()?;
        Ok(tables.normalized())
    }

    /// Loads the configured tables, or the built-in defaults when none are configured.
    pub fn load(config: &AppConfig) -> Result<Arc<Self>, AppError> {
        let tables = match config.keyword_tables_path.as_deref() {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        info!(
            categories = tables.categories.len(),
            attributes = tables.attributes.len(),
            product_types = tables.product_types.len(),
            source = config.keyword_tables_path.as_deref().unwrap_or("built-in"),
            "Keyword tables ready"
        );
        Ok(Arc::new(tables))
    }

    /// Lower-cases keywords and markers and drops empty ones. An empty keyword would match
    /// every haystack.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.categories.normalize();
        self.attributes.normalize();
        self.product_types.normalize();
        for affinity in &mut self.category_affinities {
            affinity.normalize();
        }
        for pattern in &mut self.boost_patterns {
            pattern.normalize();
        }
        self
    }

    fn builtin() -> Self {
        let categories = KeywordTable::new(vec![
            KeywordEntry::new(
                "audio equipment",
                &[
                    "喇叭", "音箱", "音響", "speaker", "耳機", "headphone", "earbud", "麥克風",
                    "mic", "音頻", "audio",
                ],
            ),
            KeywordEntry::new(
                "furniture",
                &["椅子", "椅", "桌子", "桌", "沙發", "床", "家具", "furniture", "chair", "sofa"],
            ),
            KeywordEntry::new(
                "home appliances",
                &[
                    "風扇", "清淨", "機器人", "掃地", "清潔", "消毒", "盒", "purifier", "vacuum",
                ],
            ),
            KeywordEntry::new(
                "computer peripherals",
                &[
                    "鍵盤", "滑鼠", "鼠標", "顯示器", "monitor", "鍵", "keyboard", "mouse", "周邊",
                    "護眼", "螢幕燈", "螢幕掛燈", "護眼燈", "護目",
                ],
            ),
            KeywordEntry::new(
                "wearables",
                &["手錶", "手環", "智能", "穿戴", "wearable", "watch", "band"],
            ),
            KeywordEntry::new(
                "home entertainment",
                &["投影", "投影機", "cinema", "螢幕", "顯示", "娛樂", "projector"],
            ),
            KeywordEntry::new(
                "storage devices",
                &["ssd", "硬碟", "存儲", "儲存", "storage", "硬盤"],
            ),
            KeywordEntry::new(
                "kitchen appliances",
                &["咖啡", "咖啡機", "coffee", "廚房", "kitchen"],
            ),
            KeywordEntry::new(
                "personal care",
                &["牙刷", "吹風機", "護理", "美容", "toothbrush", "hair dryer"],
            ),
            KeywordEntry::new(
                "phone accessories",
                &["電源", "行動", "手機", "充電", "配件", "charger", "power bank"],
            ),
            KeywordEntry::new("networking", &["路由器", "wifi", "網路", "router"]),
            KeywordEntry::new("cameras", &["攝影機", "相機", "camera"]),
            KeywordEntry::new("smart home", &["門鈴", "智能", "智慧", "smart", "home"]),
            KeywordEntry::new("sports", &["瑜珈", "運動", "sport", "yoga"]),
        ]);

        let attributes = KeywordTable::new(vec![
            // "ipx" is left out on purpose: IPX4 earbuds are splash resistant, not waterproof.
            KeywordEntry::new("waterproof", &["防水", "waterproof"]),
            KeywordEntry::new(
                "noise cancelling",
                &["降噪", "noise-canceling", "noise-cancelling", "anc"],
            ),
            KeywordEntry::new("fast charging", &["快充", "快速充電", "quick charge", "fast"]),
            KeywordEntry::new("battery life", &["續航", "battery", "長效", "endurance"]),
            KeywordEntry::new("eye care", &["護眼", "護目", "防藍光", "blue light"]),
            KeywordEntry::new("high definition", &["4k", "8k", "高清", "高精", "ultra"]),
            KeywordEntry::new("lightweight", &["輕", "小", "compact", "portable"]),
            KeywordEntry::new("quiet", &["靜音", "無聲", "quiet", "silent"]),
        ]);

        let product_types = KeywordTable::new(vec![
            KeywordEntry::new("speaker", &["喇叭", "speaker", "音箱"]),
            KeywordEntry::new(
                "earbuds",
                &["耳機", "earbuds", "headphones", "pods", "earbud"],
            ),
            KeywordEntry::new("microphone", &["麥克風", "microphone", "mic"]),
            KeywordEntry::new("chair", &["椅子", "椅", "chair"]),
            KeywordEntry::new("keyboard", &["鍵盤", "keyboard"]),
            KeywordEntry::new("mouse", &["滑鼠", "鼠標", "mouse"]),
            KeywordEntry::new("monitor", &["顯示器", "monitor", "螢幕"]),
            KeywordEntry::new("watch", &["手錶", "watch"]),
            KeywordEntry::new("projector", &["投影", "投影機", "projector"]),
        ]);

        let category_affinities = vec![
            CategoryAffinity::new(&["appliance", "家電"], &["appliance", "家電"], 2.0),
            CategoryAffinity::new(
                &["audio", "speaker", "音頻", "喇叭"],
                &["audio", "speaker", "音頻", "喇叭"],
                2.0,
            ),
            CategoryAffinity::new(
                &["home entertainment", "家庭娛樂"],
                &["projector", "投影"],
                1.5,
            ),
        ];

        let boost_patterns = vec![
            BoostPattern::new(
                &["防水", "防濕", "耐水", "ipx", "waterproof"],
                &["防水", "waterproof"],
            ),
            BoostPattern::new(&["藍牙", "bluetooth", "無線"], &["藍牙", "bluetooth"]),
            BoostPattern::new(&["喇叭", "音箱", "音響", "speaker"], &["喇叭", "speaker"]),
            BoostPattern::new(&["耳機", "headphone", "earbud"], &["耳機", "earbud"]),
            BoostPattern::new(&["便攜", "portable", "輕巧"], &["便攜", "portable"]),
            BoostPattern::new(&["海邊", "outdoor", "戶外", "露營"], &["戶外", "outdoor"]),
        ];

        Self {
            categories,
            attributes,
            product_types,
            category_affinities,
            boost_patterns,
        }
    }
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self::builtin().normalized()
    }
}
