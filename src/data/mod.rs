// ============================================================
// Layer 4 — Data Layer
// ============================================================
// Everything between an external record and a training batch:
//
//   external collaborator / legacy CSV
//       │
//       ▼
//   csv_import        → parses historical rows (bulk load)
//       │
//       ▼
//   SampleStore       → validates, appends, snapshots
//       │
//       ▼
//   splitter          → seeded train/validation split
//       │
//       ▼
//   Trainer (application layer)
//
// Each module is responsible for exactly one step.

/// Append-only, snapshot-able sample log
pub mod sample_store;

/// Legacy `sensor_data.csv` importer
pub mod csv_import;

/// Seeded shuffle and train/validation split
pub mod splitter;

pub use sample_store::{SampleStore, SampleWindow, Snapshot};
