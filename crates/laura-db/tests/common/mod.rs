use std::time::Duration;

use laura_db::{Config, Database};

/// Opens a fresh database in a throwaway directory, maintenance thread
/// disabled so tests control TTL/cursor cleanup explicitly.
pub fn temp_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::new(dir.path());
    config.maintenance_interval = Duration::ZERO;
    let db = Database::open(config).unwrap();
    (db, dir)
}
