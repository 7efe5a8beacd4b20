use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Grouping key for rows that carry no machine identifier.
pub const UNASSIGNED_MACHINE: &str = "unassigned";

/// One lot row as the backend's `getData` action reports it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRow {
    pub lot_no: String,
    #[serde(default)]
    pub part_no: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub machine_no: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub target: u64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub scanned_count: u64,
    #[serde(default, deserialize_with = "nullable_timestamp")]
    pub first_scan: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable_timestamp")]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub pieces_per_box: u64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub production_quantity: u64,
    #[serde(default, rename = "type")]
    pub lot_type: Option<String>,
}

impl ScanRow {
    /// Machine key used for grouping; blank identifiers fall back to the sentinel.
    pub fn machine_key(&self) -> &str {
        match self.machine_no.as_deref().map(str::trim) {
            Some(no) if !no.is_empty() => no,
            _ => UNASSIGNED_MACHINE,
        }
    }

    pub fn full_boxes(&self) -> u64 {
        if self.pieces_per_box == 0 {
            0
        } else {
            self.scanned_count / self.pieces_per_box
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MachineAggregate {
    pub machine_no: String,
    pub lots: Vec<ScanRow>,
    pub total_target: u64,
    pub total_scanned: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

impl MachineAggregate {
    pub fn new(machine_no: impl Into<String>) -> Self {
        Self {
            machine_no: machine_no.into(),
            lots: Vec::new(),
            total_target: 0,
            total_scanned: 0,
            last_scan: None,
        }
    }

    /// Completion in whole percent, clamped to `0..=100`.
    pub fn percent_complete(&self) -> u8 {
        percent(self.total_scanned, self.total_target)
    }

    pub fn first_lot(&self) -> Option<&ScanRow> {
        self.lots.first()
    }
}

pub fn percent(scanned: u64, target: u64) -> u8 {
    if target == 0 {
        return 0;
    }
    let pct = (u128::from(scanned) * 100) / u128::from(target);
    pct.min(100) as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ready,
    Active,
    Done,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::Active => "Active",
            Status::Done => "Done",
        }
    }

    /// Badge colour classes.
    pub fn badge_class(&self) -> &'static str {
        match self {
            Status::Ready => "badge ready",
            Status::Active => "badge active",
            Status::Done => "badge done",
        }
    }

    /// Reads the free-form status strings the backend puts on card summaries.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "running" | "active" => Status::Active,
            "finished" | "done" => Status::Done,
            _ => Status::Ready,
        }
    }
}

/// Per-card payload from the summary URL.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    #[serde(default)]
    pub lot_no: Option<String>,
    #[serde(default)]
    pub part_no: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub target: u64,
    #[serde(default, deserialize_with = "nullable_count")]
    pub produced: u64,
    #[serde(default)]
    pub last_scan_display: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub daily: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub lot_no: Option<String>,
    #[serde(default)]
    pub part_no: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub qty: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanLogToday {
    #[serde(default)]
    pub logs: Vec<ScanLogEntry>,
    #[serde(default, deserialize_with = "nullable_count")]
    pub total: u64,
}

fn nullable_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    // Counts arrive as integers, floats or null depending on the view.
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value
        .and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0))
}

fn nullable_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_timestamp(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {text}"))),
    }
}

/// RFC 3339 with offset, or a naive ISO timestamp taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
