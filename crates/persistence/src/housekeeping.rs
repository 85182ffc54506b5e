use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::PersistentIdentity;
use crate::PersistencePaths;

#[derive(Debug, Error)]
pub enum HousekeepingError {
    #[error("failed to list directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete orphaned directory {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedIdentity {
    pub identity: PersistentIdentity,
    pub dir: PathBuf,
}

/// Identity directories no save file mentions. Directories whose name is not
/// an identity are never candidates, and any unreadable save file makes every
/// directory count as referenced.
pub fn find_orphaned_identities(
    paths: &PersistencePaths,
) -> Result<Vec<OrphanedIdentity>, HousekeepingError> {
    let maps_root = paths.maps_root();
    let saves_dir = paths.saves_dir();
    if !maps_root.is_dir() || !saves_dir.is_dir() {
        debug!(maps_root = %maps_root.display(), saves_dir = %saves_dir.display(), "housekeeping_skipped");
        return Ok(Vec::new());
    }

    let mut save_texts = Vec::<String>::new();
    for path in list_dir(&saves_dir)? {
        if !path.is_file() {
            continue;
        }
        match fs::read(&path) {
            Ok(bytes) => save_texts.push(String::from_utf8_lossy(&bytes).into_owned()),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "save_unreadable; keeping all snapshot data");
                return Ok(Vec::new());
            }
        }
    }

    let mut orphans = Vec::new();
    for dir in list_dir(&maps_root)? {
        if !dir.is_dir() {
            continue;
        }
        let Some(identity) = dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(PersistentIdentity::parse)
        else {
            debug!(path = %dir.display(), "non_identity_directory_ignored");
            continue;
        };
        let needle = identity.to_string();
        if !save_texts.iter().any(|text| text.contains(&needle)) {
            orphans.push(OrphanedIdentity { identity, dir });
        }
    }
    orphans.sort_by(|a, b| a.dir.cmp(&b.dir));
    Ok(orphans)
}

/// Deletes every orphaned identity directory and returns what was removed.
pub fn clean_orphaned_identities(
    paths: &PersistencePaths,
) -> Result<Vec<OrphanedIdentity>, HousekeepingError> {
    let orphans = find_orphaned_identities(paths)?;
    for orphan in &orphans {
        fs::remove_dir_all(&orphan.dir).map_err(|source| HousekeepingError::Delete {
            path: orphan.dir.clone(),
            source,
        })?;
        info!(identity = %orphan.identity, path = %orphan.dir.display(), "orphaned_snapshot_data_deleted");
    }
    Ok(orphans)
}

fn list_dir(dir: &std::path::Path) -> Result<Vec<PathBuf>, HousekeepingError> {
    let entries = fs::read_dir(dir).map_err(|source| HousekeepingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| HousekeepingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn layout() -> (TempDir, PersistencePaths) {
        let temp = TempDir::new().expect("temp");
        let paths = PersistencePaths::new(temp.path());
        fs::create_dir_all(paths.saves_dir()).expect("saves dir");
        fs::create_dir_all(paths.maps_root()).expect("maps root");
        (temp, paths)
    }

    fn identity_dir(paths: &PersistencePaths) -> PersistentIdentity {
        let identity = PersistentIdentity::mint();
        let dir = paths.identity_dir(identity);
        fs::create_dir_all(&dir).expect("identity dir");
        fs::write(dir.join("Tile_1.xml"), "<PersistentMap />").expect("tile");
        identity
    }

    #[test]
    fn unreferenced_identity_is_orphaned_and_referenced_is_kept() {
        let (_temp, paths) = layout();
        let kept = identity_dir(&paths);
        let orphan = identity_dir(&paths);
        fs::write(
            paths.saves_dir().join("colony.json"),
            format!("{{\"persistent_identity\":\"{kept}\"}}"),
        )
        .expect("save");

        let found = find_orphaned_identities(&paths).expect("scan");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identity, orphan);

        let removed = clean_orphaned_identities(&paths).expect("clean");
        assert_eq!(removed.len(), 1);
        assert!(!paths.identity_dir(orphan).exists());
        assert!(paths.identity_dir(kept).exists());
    }

    #[test]
    fn foreign_directories_are_never_touched() {
        let (_temp, paths) = layout();
        let foreign = paths.maps_root().join("notes");
        fs::create_dir_all(&foreign).expect("foreign dir");
        assert!(clean_orphaned_identities(&paths).expect("clean").is_empty());
        assert!(foreign.exists());
    }

    #[test]
    fn missing_saves_dir_deletes_nothing() {
        let temp = TempDir::new().expect("temp");
        let paths = PersistencePaths::new(temp.path());
        fs::create_dir_all(paths.maps_root()).expect("maps root");
        let identity = identity_dir(&paths);
        assert!(clean_orphaned_identities(&paths).expect("clean").is_empty());
        assert!(paths.identity_dir(identity).exists());
    }
}
