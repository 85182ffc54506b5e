use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `text` next to `path` and renames it into place, so a reader sees
/// either the previous file or the complete new one.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(error) = fs::write(&tmp_path, text.as_bytes()) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("snapshot.xml");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("Tile_3.xml");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("Tile_1.xml");
        write_text_atomic(&path, "good").expect("write");
        // A directory squatting on the temp name makes the write fail.
        fs::create_dir(temp_path_for(&path)).expect("block temp path");
        assert!(write_text_atomic(&path, "bad").is_err());
        assert_eq!(fs::read_to_string(&path).expect("read"), "good");
    }
}
