use std::{fmt::Display, path::PathBuf, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of activity a card describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Coding,
    Work,
    Learning,
    Meeting,
    Social,
    Entertainment,
    Rest,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Coding,
        Category::Work,
        Category::Learning,
        Category::Meeting,
        Category::Social,
        Category::Entertainment,
        Category::Rest,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "Coding",
            Category::Work => "Work",
            Category::Learning => "Learning",
            Category::Meeting => "Meeting",
            Category::Social => "Social",
            Category::Entertainment => "Entertainment",
            Category::Rest => "Rest",
            Category::Other => "Other",
        }
    }

    /// Color used by the dashboard and the terminal timeline.
    pub fn color(&self) -> &'static str {
        match self {
            Category::Work => "#7c3aed",
            Category::Learning => "#3b82f6",
            Category::Coding => "#10b981",
            Category::Meeting => "#f59e0b",
            Category::Entertainment => "#ef4444",
            Category::Social => "#ec4899",
            Category::Rest => "#6b7280",
            Category::Other => "#8b5cf6",
        }
    }

    /// Models don't always follow the requested labels. English names in any case and the
    /// Chinese labels are accepted, everything else is [Category::Other].
    pub fn parse_lenient(value: &str) -> Category {
        let value = value.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value))
            .unwrap_or(match value {
                "编程" => Category::Coding,
                "工作" => Category::Work,
                "学习" => Category::Learning,
                "会议" => Category::Meeting,
                "社交" => Category::Social,
                "娱乐" => Category::Entertainment,
                "休息" => Category::Rest,
                _ => Category::Other,
            })
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    /// Strict parsing used for values read back from the database.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow!("unknown category '{s}'"))
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Category::parse_lenient(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSite {
    pub name: String,
    #[serde(default)]
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distraction {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub duration_seconds: f64,
}

/// What the model saw during part of a chunk. Timestamps are seconds from the chunk start.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationEntity {
    pub start_ts: f64,
    pub end_ts: f64,
    pub text: String,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
}

/// A classified period of time. This is the unit the timeline, the statistics and the dashboard
/// are built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCardEntity {
    pub id: Option<i64>,
    pub category: Category,
    pub title: String,
    pub summary: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub app_sites: Vec<AppSite>,
    pub distractions: Vec<Distraction>,
    pub productivity_score: f64,
}

impl ActivityCardEntity {
    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time).max(Duration::zero())
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration().num_seconds() as f64 / 60.
    }

    /// Enforces `end >= start` and a score within `[0, 100]`.
    pub fn normalized(mut self) -> Self {
        if self.end_time < self.start_time {
            self.end_time = self.start_time;
        }
        self.productivity_score = if self.productivity_score.is_finite() {
            self.productivity_score.clamp(0., 100.)
        } else {
            0.
        };
        self
    }

    pub fn main_app(&self) -> Option<&str> {
        self.app_sites.first().map(|v| v.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Analyzed,
    Failed,
    Abandoned,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Analyzed => "analyzed",
            ChunkStatus::Failed => "failed",
            ChunkStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for ChunkStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChunkStatus::Pending),
            "analyzed" => Ok(ChunkStatus::Analyzed),
            "failed" => Ok(ChunkStatus::Failed),
            "abandoned" => Ok(ChunkStatus::Abandoned),
            _ => Err(anyhow!("unknown chunk status '{s}'")),
        }
    }
}

/// Bookkeeping row of a recorded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEntity {
    pub id: i64,
    pub name: String,
    pub path: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub frame_count: u32,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}
