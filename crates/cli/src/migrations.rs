//! Migration files from a directory

use anyhow::{Context, Result};
use bookbase_database::{bundled_migrations, MigrationFile};
use std::path::Path;

/// Every `*.sql` file in `dir`, ordered by file name. The migration name is
/// the file stem.
pub fn load_dir(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .with_context(|| format!("Invalid migration file name {}", path.display()))?;
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(MigrationFile::new(name, contents))
        })
        .collect()
}

/// Migrations from `dir` when given, the bundled ones otherwise
pub fn resolve(dir: Option<&Path>) -> Result<Vec<MigrationFile>> {
    match dir {
        Some(dir) => load_dir(dir),
        None => Ok(bundled_migrations()),
    }
}
