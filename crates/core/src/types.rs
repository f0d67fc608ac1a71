/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Analysis records are keyed by a time-ordered UUID (v7).
pub type AnalysisId = uuid::Uuid;

/// Frame position in milliseconds from the start of the analyzed video.
pub type VideoMillis = f64;
