use crate::services::audit::AuditEvent;
use crate::value_objects::snapshot::SimulationSnapshot;
use std::path::Path;

pub trait ArtifactWriter {
    fn ensure_dir(&self, path: &Path) -> Result<(), String>;
    fn write_json(&self, path: &Path, value: &serde_json::Value) -> Result<(), String>;
    fn write_snapshots_csv(&self, path: &Path, snapshots: &[SimulationSnapshot]) -> Result<(), String>;
    fn write_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String>;
}
