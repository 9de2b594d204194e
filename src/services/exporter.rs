//! Report rendering seam. The commands layer builds the snapshot; an exporter
//! turns it into a downloadable file.

use crate::functions::commands::ReportSnapshot;
use chrono::{DateTime, Utc};

pub trait ReportExporter: Send + Sync {
    fn file_name(&self, now: DateTime<Utc>) -> String;
    fn render(&self, snapshot: &ReportSnapshot) -> anyhow::Result<Vec<u8>>;
}

/// Pretty-printed JSON, stats first, then the archive.
pub struct JsonExporter;

impl ReportExporter for JsonExporter {
    fn file_name(&self, now: DateTime<Utc>) -> String {
        format!("complaints_{}.json", now.format("%Y%m%d_%H%M%S"))
    }

    fn render(&self, snapshot: &ReportSnapshot) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(snapshot)?)
    }
}
