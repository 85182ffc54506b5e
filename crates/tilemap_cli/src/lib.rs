use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use persistence::grid::decode_values;
use persistence::snapshot::{parse_snapshot, EntityRecord};
use persistence::{
    clean_orphaned_identities, find_orphaned_identities, resolve_persistence_paths, CellWidth,
    PersistencePaths, RegionId, TileSnapshot,
};

pub enum CommandKind {
    Inspect { path: PathBuf },
    Orphans { root: Option<PathBuf>, delete: bool },
}

pub fn run<W: Write>(kind: CommandKind, stdout: &mut W) -> Result<(), String> {
    match kind {
        CommandKind::Inspect { path } => inspect(&path, stdout),
        CommandKind::Orphans { root, delete } => {
            let paths = match root {
                Some(root) => PersistencePaths::new(root),
                None => resolve_persistence_paths().map_err(|error| error.to_string())?,
            };
            orphans(&paths, delete, stdout)
        }
    }
}

/// Region id from a `Tile_<n>.xml` file name.
pub fn region_from_file_name(path: &Path) -> Option<RegionId> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix("Tile_"))
        .and_then(|id| id.parse::<u32>().ok())
        .map(RegionId)
}

fn inspect<W: Write>(path: &Path, stdout: &mut W) -> Result<(), String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read snapshot '{}': {error}", path.display()))?;
    let region = region_from_file_name(path).unwrap_or(RegionId(0));
    let snapshot = parse_snapshot(&raw, region)
        .map_err(|error| format!("invalid snapshot '{}': {error}", path.display()))?;
    for line in summary_lines(&snapshot) {
        writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))?;
    }
    Ok(())
}

pub fn summary_lines(snapshot: &TileSnapshot) -> Vec<String> {
    let mut lines = vec![
        format!("region: {}", snapshot.region),
        format!("format_version: {}", snapshot.format_version),
        format!("abandoned_at_tick: {}", snapshot.abandoned_at_tick),
        match snapshot.map_size {
            Some(size) => format!("map_size: {size}"),
            None => "map_size: unknown".to_string(),
        },
    ];

    let channels = [
        ("terrain", &snapshot.terrain, CellWidth::Short),
        ("roof", &snapshot.roof, CellWidth::Byte),
        ("snow", &snapshot.snow, CellWidth::Byte),
        ("pollution", &snapshot.pollution, CellWidth::Byte),
    ];
    for (name, bytes, width) in channels {
        let Some(bytes) = bytes else {
            lines.push(format!("{name}: absent"));
            continue;
        };
        let values = snapshot
            .map_size
            .and_then(|size| decode_values(bytes, size, width).ok());
        lines.push(match (name, values) {
            ("terrain", Some(mut kinds)) => {
                kinds.sort_unstable();
                kinds.dedup();
                format!("{name}: {} bytes, {} terrain kinds", bytes.len(), kinds.len())
            }
            (_, Some(values)) => format!(
                "{name}: {} bytes, {} cells set",
                bytes.len(),
                values.iter().filter(|value| **value != 0).count()
            ),
            (_, None) => format!("{name}: {} bytes", bytes.len()),
        });
    }

    lines.push(format!("things: {}", snapshot.records.len()));
    let mut by_def = BTreeMap::<&str, usize>::new();
    let mut with_contents = 0usize;
    for record in &snapshot.records {
        count_record(record, &mut by_def);
        if record.contents.is_some() {
            with_contents += 1;
        }
    }
    for (def_name, count) in by_def {
        lines.push(format!("  {def_name}: {count}"));
    }
    if with_contents > 0 {
        lines.push(format!("containers_with_contents: {with_contents}"));
    }
    lines
}

fn count_record<'a>(record: &'a EntityRecord, by_def: &mut BTreeMap<&'a str, usize>) {
    *by_def.entry(record.def_name.as_str()).or_default() += 1;
    if let Some(contents) = &record.contents {
        count_record(contents, by_def);
    }
}

fn orphans<W: Write>(paths: &PersistencePaths, delete: bool, stdout: &mut W) -> Result<(), String> {
    let found = if delete {
        clean_orphaned_identities(paths)
    } else {
        find_orphaned_identities(paths)
    }
    .map_err(|error| error.to_string())?;

    let verb = if delete { "deleted" } else { "orphan" };
    for orphan in &found {
        writeln!(stdout, "{verb} {} {}", orphan.identity, orphan.dir.display())
            .map_err(|error| format!("failed to write output: {error}"))?;
    }
    writeln!(
        stdout,
        "{} orphaned identities under {}",
        found.len(),
        paths.maps_root().display()
    )
    .map_err(|error| format!("failed to write output: {error}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use persistence::snapshot::render_snapshot;
    use persistence::{encode_grid, MapSize, PersistentIdentity, Position, Rotation};
    use tempfile::TempDir;

    use super::*;

    fn record(def_name: &str, x: i32) -> EntityRecord {
        EntityRecord {
            def_name: def_name.to_string(),
            stuff: None,
            faction: None,
            position: Position::new(x, 0, 0),
            rotation: Rotation::NORTH,
            hit_points: 10,
            rot_progress: None,
            creature: None,
            contents: None,
        }
    }

    #[test]
    fn region_comes_from_tile_file_name() {
        assert_eq!(
            region_from_file_name(Path::new("/x/Tile_42.xml")),
            Some(RegionId(42))
        );
        assert_eq!(region_from_file_name(Path::new("notes.xml")), None);
    }

    #[test]
    fn inspect_summarises_grids_and_things() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("Tile_7.xml");
        let size = MapSize::new(2, 1);
        let mut snapshot = TileSnapshot::new(RegionId(7), 1_234, size);
        snapshot.terrain =
            Some(encode_grid(size, CellWidth::Short, |cell| 300 + cell.x as u16).expect("terrain"));
        snapshot.roof = Some(encode_grid(size, CellWidth::Byte, |cell| cell.x as u16).expect("roof"));
        let mut casket = record("CryptosleepCasket", 1);
        casket.contents = Some(Box::new(record("Steel", 1)));
        snapshot.records = vec![record("Wall", 0), casket];
        fs::write(&path, render_snapshot(&snapshot)).expect("write");

        let mut out = Vec::new();
        run(CommandKind::Inspect { path }, &mut out).expect("inspect");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("region: 7\n"));
        assert!(text.contains("abandoned_at_tick: 1234\n"));
        assert!(text.contains("map_size: 2x1\n"));
        assert!(text.contains("terrain: 4 bytes, 2 terrain kinds\n"));
        assert!(text.contains("roof: 2 bytes, 1 cells set\n"));
        assert!(text.contains("snow: absent\n"));
        assert!(text.contains("things: 2\n"));
        assert!(text.contains("  Steel: 1\n"));
        assert!(text.contains("containers_with_contents: 1\n"));
    }

    #[test]
    fn inspect_rejects_a_truncated_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("Tile_1.xml");
        fs::write(&path, "<PersistentMap formatVersion=\"2\"><MapData></MapData></PersistentMap>")
            .expect("write");
        let err = run(CommandKind::Inspect { path }, &mut Vec::new()).expect_err("truncated");
        assert!(err.starts_with("invalid snapshot"));
    }

    #[test]
    fn orphans_lists_then_deletes() {
        let temp = TempDir::new().expect("temp");
        let paths = PersistencePaths::new(temp.path());
        let kept = PersistentIdentity::mint();
        let stray = PersistentIdentity::mint();
        fs::create_dir_all(paths.identity_dir(kept)).expect("kept dir");
        fs::create_dir_all(paths.identity_dir(stray)).expect("stray dir");
        fs::create_dir_all(paths.saves_dir()).expect("saves");
        fs::write(paths.saves_dir().join("a.json"), format!("{{\"id\":\"{kept}\"}}")).expect("save");

        let mut out = Vec::new();
        let root = Some(temp.path().to_path_buf());
        run(
            CommandKind::Orphans {
                root: root.clone(),
                delete: false,
            },
            &mut out,
        )
        .expect("list");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains(&format!("orphan {stray}")));
        assert!(text.contains("1 orphaned identities"));
        assert!(paths.identity_dir(stray).exists());

        run(CommandKind::Orphans { root, delete: true }, &mut Vec::new()).expect("delete");
        assert!(!paths.identity_dir(stray).exists());
        assert!(paths.identity_dir(kept).exists());
    }
}
