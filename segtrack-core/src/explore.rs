//! Segment discovery within a bounding box.
//!
//! Used to find the ids worth tracking before adding them to the config.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_NAME_CHARS: usize = 48;

#[derive(Debug, Error, PartialEq)]
pub enum ExploreError {
    #[error("bounds must be 'sw_lat,sw_lng,ne_lat,ne_lng', got '{0}'")]
    BoundsFormat(String),

    #[error("latitude {0} out of range [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} out of range [-180, 180]")]
    Longitude(f64),

    #[error("south-west corner must lie south-west of the north-east corner")]
    InvertedBounds,

    #[error("climb category {0} out of range 0-5")]
    ClimbCategory(u8),

    #[error("unknown activity type '{0}' (expected riding or running)")]
    ActivityType(String),
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub sw_lat: f64,
    pub sw_lng: f64,
    pub ne_lat: f64,
    pub ne_lng: f64,
}

impl Bounds {
    pub fn new(sw_lat: f64, sw_lng: f64, ne_lat: f64, ne_lng: f64) -> Result<Self, ExploreError> {
        for lat in [sw_lat, ne_lat] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ExploreError::Latitude(lat));
            }
        }
        for lng in [sw_lng, ne_lng] {
            if !(-180.0..=180.0).contains(&lng) {
                return Err(ExploreError::Longitude(lng));
            }
        }
        if sw_lat >= ne_lat || sw_lng >= ne_lng {
            return Err(ExploreError::InvertedBounds);
        }
        Ok(Self {
            sw_lat,
            sw_lng,
            ne_lat,
            ne_lng,
        })
    }

    /// `sw_lat,sw_lng,ne_lat,ne_lng` as the explore endpoint expects.
    pub fn to_query(&self) -> String {
        format!("{},{},{},{}", self.sw_lat, self.sw_lng, self.ne_lat, self.ne_lng)
    }
}

impl FromStr for Bounds {
    type Err = ExploreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ExploreError::BoundsFormat(s.to_string()))?;
        match parts.as_slice() {
            [a, b, c, d] => Bounds::new(*a, *b, *c, *d),
            _ => Err(ExploreError::BoundsFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivityType {
    #[default]
    Riding,
    Running,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Riding => "riding",
            ActivityType::Running => "running",
        }
    }
}

impl FromStr for ActivityType {
    type Err = ExploreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "riding" => Ok(ActivityType::Riding),
            "running" => Ok(ActivityType::Running),
            _ => Err(ExploreError::ActivityType(s.to_string())),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strava climb category, 0 (uncategorised) through 5 (HC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClimbCategory(u8);

impl ClimbCategory {
    pub fn new(value: u8) -> Result<Self, ExploreError> {
        if value > 5 {
            return Err(ExploreError::ClimbCategory(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Summary row returned by the explore endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploredSegment {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub climb_category: Option<i32>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub avg_grade: Option<f64>,
}

/// Render explore results as a fixed-width table.
pub fn format_explore_table(segments: &[ExploredSegment]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:<50} {:<10} {:<15} {:<15}\n",
        "ID", "Name", "Climb Cat", "Distance (m)", "Avg Grade (%)"
    ));
    out.push_str(&"-".repeat(110));
    out.push('\n');

    for seg in segments {
        let climb = match seg.climb_category {
            Some(c) if c >= 0 => c.to_string(),
            _ => "N/A".to_string(),
        };
        out.push_str(&format!(
            "{:<12} {:<50} {:<10} {:<15.1} {:<15.1}\n",
            seg.id,
            truncate_name(&seg.name),
            climb,
            seg.distance.unwrap_or(0.0),
            seg.avg_grade.unwrap_or(0.0),
        ));
    }

    out.push_str(&"-".repeat(110));
    out.push('\n');
    out
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_CHARS {
        let head: String = name.chars().take(MAX_NAME_CHARS).collect();
        format!("{head}..")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounds() {
        let b: Bounds = "-41.2449, 174.9212, -41.2389, 174.9375".parse().unwrap();
        assert_eq!(b.sw_lat, -41.2449);
        assert_eq!(b.to_query(), "-41.2449,174.9212,-41.2389,174.9375");
    }

    #[test]
    fn rejects_malformed_bounds() {
        assert!(matches!(
            "1,2,3".parse::<Bounds>(),
            Err(ExploreError::BoundsFormat(_))
        ));
        assert!(matches!(
            "a,b,c,d".parse::<Bounds>(),
            Err(ExploreError::BoundsFormat(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_and_inverted() {
        assert_eq!(Bounds::new(-91.0, 0.0, 0.0, 1.0), Err(ExploreError::Latitude(-91.0)));
        assert_eq!(Bounds::new(0.0, 0.0, 1.0, 181.0), Err(ExploreError::Longitude(181.0)));
        assert_eq!(Bounds::new(1.0, 0.0, 0.0, 1.0), Err(ExploreError::InvertedBounds));
    }

    #[test]
    fn climb_category_range() {
        assert_eq!(ClimbCategory::new(5).unwrap().value(), 5);
        assert_eq!(ClimbCategory::new(6), Err(ExploreError::ClimbCategory(6)));
    }

    #[test]
    fn activity_type_parsing() {
        assert_eq!("Running".parse::<ActivityType>().unwrap(), ActivityType::Running);
        assert_eq!(ActivityType::default().as_str(), "riding");
        assert!("swimming".parse::<ActivityType>().is_err());
    }

    #[test]
    fn table_truncates_long_names_and_marks_missing_category() {
        let segments = vec![ExploredSegment {
            id: 229781,
            name: "A".repeat(60),
            climb_category: Some(-1),
            distance: Some(1234.56),
            avg_grade: Some(4.25),
        }];
        let table = format_explore_table(&segments);
        let row = table.lines().nth(2).unwrap();
        assert!(row.starts_with("229781"));
        assert!(row.contains(&format!("{}..", "A".repeat(48))));
        assert!(!row.contains(&"A".repeat(49)));
        assert!(row.contains("N/A"));
        assert!(row.contains("1234.6"));
    }
}
