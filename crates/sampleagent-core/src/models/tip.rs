use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum TipCategory {
    Safety,
    Handling,
    Transport,
    Storage,
    Quality,
    Maintenance,
}

impl TipCategory {
    pub const ALL: [TipCategory; 6] = [
        TipCategory::Safety,
        TipCategory::Handling,
        TipCategory::Transport,
        TipCategory::Storage,
        TipCategory::Quality,
        TipCategory::Maintenance,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            TipCategory::Safety => "Safety",
            TipCategory::Handling => "Handling",
            TipCategory::Transport => "Transport",
            TipCategory::Storage => "Storage",
            TipCategory::Quality => "Quality",
            TipCategory::Maintenance => "Maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.title().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum TipPriority {
    #[default]
    Normal,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TipEntry {
    pub id: u32,
    pub title: String,
    #[serde(rename = "content")]
    pub body: String,
    pub category: TipCategory,
    pub icon: String,
    #[serde(default)]
    pub priority: TipPriority,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TipEntry {
    pub fn is_critical(&self) -> bool {
        self.priority == TipPriority::Critical
    }
}

/// Client-side category filter. `None` keeps every tip.
pub fn filter_tips(tips: &[TipEntry], category: Option<TipCategory>) -> Vec<&TipEntry> {
    tips.iter()
        .filter(|t| category.map_or(true, |c| t.category == c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip(id: u32, category: TipCategory) -> TipEntry {
        TipEntry {
            id,
            title: format!("Tip {}", id),
            body: String::new(),
            category,
            icon: "🧼".to_string(),
            priority: TipPriority::Normal,
            tags: vec![],
        }
    }

    #[test]
    fn test_category_parse_case_insensitive() {
        assert_eq!(TipCategory::parse("SAFETY"), Some(TipCategory::Safety));
        assert_eq!(TipCategory::parse(" quality "), Some(TipCategory::Quality));
        assert_eq!(TipCategory::parse("weather"), None);
    }

    #[test]
    fn test_filter_tips() {
        let tips = vec![
            tip(1, TipCategory::Safety),
            tip(2, TipCategory::Handling),
            tip(3, TipCategory::Safety),
        ];
        let safety: Vec<u32> = filter_tips(&tips, Some(TipCategory::Safety))
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(safety, vec![1, 3]);
        assert_eq!(filter_tips(&tips, None).len(), 3);
    }

    #[test]
    fn test_priority_decodes_original_levels() {
        let p: TipPriority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(p, TipPriority::Critical);
        let p: TipPriority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, TipPriority::High);
    }
}
