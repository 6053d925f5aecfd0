//! Player and statistics types shared by the scraper, the review step and page generation

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which statistical table a profile page is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerType {
    Hitter,
    Pitcher,
}

impl PlayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerType::Hitter => "hitter",
            PlayerType::Pitcher => "pitcher",
        }
    }

    /// DOM id of the standard year-by-year table
    pub fn table_id(&self) -> &'static str {
        match self {
            PlayerType::Hitter => "players_standard_batting",
            PlayerType::Pitcher => "players_standard_pitching",
        }
    }

    /// `data-stat` value of the WAR cell in that table
    pub fn war_stat(&self) -> &'static str {
        match self {
            PlayerType::Hitter => "b_war",
            PlayerType::Pitcher => "p_war",
        }
    }
}

/// Career summary values keyed by stat label, in source column order.
///
/// Values keep the site's formatting (".287", not 0.287).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CareerTotals {
    entries: Vec<(String, String)>,
}

impl CareerTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a stat. An overwritten label keeps its first position.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when at least one value is non-blank
    pub fn has_values(&self) -> bool {
        self.entries.iter().any(|(_, v)| !v.trim().is_empty())
    }
}

impl Serialize for CareerTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CareerTotals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TotalsVisitor;

        impl<'de> Visitor<'de> for TotalsVisitor {
            type Value = CareerTotals;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of stat label to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut totals = CareerTotals::new();
                while let Some((label, value)) = access.next_entry::<String, String>()? {
                    totals.insert(label, value);
                }
                Ok(totals)
            }
        }

        deserializer.deserialize_map(TotalsVisitor)
    }
}

/// One season of a player's career
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPerformanceRecord {
    pub year: String,
    /// Every team played for that season, in stint order
    pub teams: Vec<String>,
    /// Team code shown on the season row ("2TM" for split seasons)
    pub display_team: String,
    pub war: f64,
}

/// A successful scrape: both career totals and yearly rows are present
#[derive(Debug, Clone, PartialEq)]
pub struct CareerStats {
    pub career_totals: CareerTotals,
    pub yearly: Vec<YearlyPerformanceRecord>,
}

impl CareerStats {
    /// Returns None unless both halves were recovered.
    pub fn from_parts(
        career_totals: Option<CareerTotals>,
        yearly: Vec<YearlyPerformanceRecord>,
    ) -> Option<Self> {
        let career_totals = career_totals.filter(|t| !t.is_empty())?;
        if yearly.is_empty() {
            return None;
        }
        Some(Self {
            career_totals,
            yearly,
        })
    }
}

/// One entry of a search-results listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultCandidate {
    pub display_text: String,
    pub profile_path: String,
}

/// Absolute URL of exactly one player's profile page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfileReference(String);

impl PlayerProfileReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerProfileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Everything a detail page shows; this is also the JSON the operator edits during review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerPage {
    pub name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qa: Vec<QaPair>,
    #[serde(default)]
    pub career_totals: CareerTotals,
    #[serde(default)]
    pub yearly_war: Vec<YearlyPerformanceRecord>,
}

impl PlayerPage {
    pub fn new(name: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nickname: nickname.into(),
            ..Self::default()
        }
    }

    pub fn with_stats(mut self, stats: CareerStats) -> Self {
        self.career_totals = stats.career_totals;
        self.yearly_war = stats.yearly;
        self
    }

    /// `Name "Nickname"`, or just the name
    pub fn display_name(&self) -> String {
        if self.nickname.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} \"{}\"", self.name, self.nickname)
        }
    }
}
