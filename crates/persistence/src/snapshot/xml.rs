use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use roxmltree::{Document, Node};
use sha2::{Digest, Sha256};

use super::{EntityRecord, SnapshotFormatError, TileSnapshot, FORMAT_VERSION};
use crate::model::{CreatureProfile, MapSize, Position, RegionId, Rotation};

const LEGACY_VERSION: u32 = 1;

/// Renders the complete file. Everything but `abandonedAtTick` is covered by
/// the trailing `contentDigest`.
pub fn render_snapshot(snapshot: &TileSnapshot) -> String {
    let body = render_body(snapshot);
    let mut out = String::with_capacity(body.len() + 256);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = writeln!(out, "<PersistentMap formatVersion=\"{FORMAT_VERSION}\">");
    out.push_str("  <MapData>\n");
    let _ = writeln!(
        out,
        "    <abandonedAtTick>{}</abandonedAtTick>",
        snapshot.abandoned_at_tick
    );
    out.push_str(&body);
    let _ = writeln!(
        out,
        "    <contentDigest>{}</contentDigest>",
        content_digest(&body)
    );
    out.push_str("  </MapData>\n");
    out.push_str("</PersistentMap>\n");
    out
}

fn render_body(snapshot: &TileSnapshot) -> String {
    let mut out = String::new();
    if let Some(size) = snapshot.map_size {
        let _ = writeln!(out, "    <mapSize>{},{}</mapSize>", size.width, size.height);
    }
    let channels = [
        ("terrainData", &snapshot.terrain),
        ("roofData", &snapshot.roof),
        ("snowData", &snapshot.snow),
        ("pollutionData", &snapshot.pollution),
    ];
    for (name, channel) in channels {
        if let Some(bytes) = channel {
            let _ = writeln!(out, "    <{name}>{}</{name}>", BASE64_STANDARD.encode(bytes));
        }
    }
    out.push_str("    <savedThings>\n");
    for record in &snapshot.records {
        out.push_str("      <li>\n");
        render_record_fields(&mut out, record, 8);
        out.push_str("      </li>\n");
    }
    out.push_str("    </savedThings>\n");
    out
}

fn render_record_fields(out: &mut String, record: &EntityRecord, indent: usize) {
    let pad = " ".repeat(indent);
    let _ = writeln!(out, "{pad}<defName>{}</defName>", escape(&record.def_name));
    if let Some(stuff) = &record.stuff {
        let _ = writeln!(out, "{pad}<stuffDefName>{}</stuffDefName>", escape(stuff));
    }
    if let Some(faction) = &record.faction {
        let _ = writeln!(out, "{pad}<factionDefName>{}</factionDefName>", escape(faction));
    }
    let _ = writeln!(out, "{pad}<position>{}</position>", record.position);
    let _ = writeln!(out, "{pad}<rotation>{}</rotation>", record.rotation.as_int());
    let _ = writeln!(out, "{pad}<hitPoints>{}</hitPoints>", record.hit_points);
    if let Some(rot) = record.rot_progress {
        let _ = writeln!(out, "{pad}<rotProgress>{rot}</rotProgress>");
    }
    if let Some(profile) = record.creature {
        let _ = writeln!(
            out,
            "{pad}<creature playerOwned=\"{}\" humanlike=\"{}\" visitor=\"{}\" crossReferenceFree=\"{}\" />",
            profile.player_owned, profile.humanlike, profile.visitor, profile.cross_reference_free
        );
    }
    if let Some(contents) = &record.contents {
        let _ = writeln!(out, "{pad}<contents>");
        render_record_fields(out, contents, indent + 2);
        let _ = writeln!(out, "{pad}</contents>");
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn content_digest(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Parses a snapshot file. Version-2 files must carry a digest matching their
/// content; version-1 files are accepted without one.
pub fn parse_snapshot(raw: &str, region: RegionId) -> Result<TileSnapshot, SnapshotFormatError> {
    let doc = Document::parse(raw)?;
    let root = doc.root_element();
    if root.tag_name().name() != "PersistentMap" {
        return Err(SnapshotFormatError::InvalidRoot(
            root.tag_name().name().to_string(),
        ));
    }
    let format_version = match root.attribute("formatVersion") {
        None => LEGACY_VERSION,
        Some(value) if value.trim() == FORMAT_VERSION.to_string() => FORMAT_VERSION,
        Some(value) => return Err(SnapshotFormatError::UnsupportedVersion(value.to_string())),
    };
    let map_data = element_children(root)
        .find(|node| node.tag_name().name() == "MapData")
        .ok_or(SnapshotFormatError::MissingElement("MapData"))?;

    let reader = Reader { doc: &doc };
    let mut snapshot = TileSnapshot {
        region,
        format_version,
        abandoned_at_tick: 0,
        map_size: None,
        terrain: None,
        roof: None,
        snow: None,
        pollution: None,
        records: Vec::new(),
    };
    let mut saw_tick = false;
    let mut digest: Option<String> = None;

    for field in element_children(map_data) {
        if is_null(field) {
            continue;
        }
        match field.tag_name().name() {
            "abandonedAtTick" => {
                snapshot.abandoned_at_tick = reader.parse_text(field)?;
                saw_tick = true;
            }
            "mapSize" => snapshot.map_size = Some(reader.parse_map_size(field)?),
            "terrainData" => snapshot.terrain = Some(decode_channel(field, "terrainData")?),
            "roofData" => snapshot.roof = Some(decode_channel(field, "roofData")?),
            "snowData" => snapshot.snow = Some(decode_channel(field, "snowData")?),
            "pollutionData" => snapshot.pollution = Some(decode_channel(field, "pollutionData")?),
            "savedThings" | "buildings" => {
                for item in element_children(field).filter(|n| n.tag_name().name() == "li") {
                    snapshot.records.push(reader.parse_record(item)?);
                }
            }
            "contentDigest" => digest = Some(text_of(field).to_string()),
            _ => {}
        }
    }

    if format_version == LEGACY_VERSION {
        return Ok(snapshot);
    }
    if !saw_tick {
        return Err(SnapshotFormatError::MissingElement("abandonedAtTick"));
    }
    if snapshot.map_size.is_none() {
        return Err(SnapshotFormatError::MissingElement("mapSize"));
    }
    let recorded = digest.ok_or(SnapshotFormatError::MissingDigest)?;
    let computed = content_digest(&render_body(&snapshot));
    if recorded != computed {
        return Err(SnapshotFormatError::DigestMismatch { recorded, computed });
    }
    Ok(snapshot)
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

fn text_of<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().map(str::trim).unwrap_or_default()
}

/// Older writers mark absent values with `IsNull="True"`.
fn is_null(node: Node<'_, '_>) -> bool {
    node.attribute("IsNull")
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

fn decode_channel(node: Node<'_, '_>, field: &'static str) -> Result<Vec<u8>, SnapshotFormatError> {
    BASE64_STANDARD
        .decode(text_of(node))
        .map_err(|source| SnapshotFormatError::Base64 { field, source })
}

struct Reader<'a, 'input> {
    doc: &'a Document<'input>,
}

impl Reader<'_, '_> {
    fn invalid(&self, node: Node<'_, '_>, value: &str) -> SnapshotFormatError {
        SnapshotFormatError::InvalidValue {
            field: node.tag_name().name().to_string(),
            value: value.to_string(),
            line: self.doc.text_pos_at(node.range().start).row,
        }
    }

    fn parse_text<T: std::str::FromStr>(&self, node: Node<'_, '_>) -> Result<T, SnapshotFormatError> {
        let raw = text_of(node);
        raw.parse::<T>().map_err(|_| self.invalid(node, raw))
    }

    fn parse_map_size(&self, node: Node<'_, '_>) -> Result<MapSize, SnapshotFormatError> {
        let raw = text_of(node);
        let (width, height) = raw.split_once(',').ok_or_else(|| self.invalid(node, raw))?;
        let width = width.trim().parse::<u32>().map_err(|_| self.invalid(node, raw))?;
        let height = height.trim().parse::<u32>().map_err(|_| self.invalid(node, raw))?;
        Ok(MapSize::new(width, height))
    }

    fn parse_position(&self, node: Node<'_, '_>) -> Result<Position, SnapshotFormatError> {
        let raw = text_of(node);
        let inner = raw
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| self.invalid(node, raw))?;
        let mut parts = inner.split(',').map(|part| part.trim().parse::<i32>());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) => Ok(Position::new(x, y, z)),
            _ => Err(self.invalid(node, raw)),
        }
    }

    fn parse_flag(&self, node: Node<'_, '_>, attribute: &str) -> Result<bool, SnapshotFormatError> {
        match node.attribute(attribute) {
            None => Ok(false),
            Some(raw) => raw.parse::<bool>().map_err(|_| self.invalid(node, raw)),
        }
    }

    fn parse_record(&self, node: Node<'_, '_>) -> Result<EntityRecord, SnapshotFormatError> {
        let mut def_name: Option<String> = None;
        let mut record = EntityRecord {
            def_name: String::new(),
            stuff: None,
            faction: None,
            position: Position::default(),
            rotation: Rotation::NORTH,
            hit_points: 0,
            rot_progress: None,
            creature: None,
            contents: None,
        };
        let mut saw_position = false;

        for field in element_children(node) {
            if is_null(field) {
                continue;
            }
            match field.tag_name().name() {
                "defName" => def_name = Some(text_of(field).to_string()),
                "stuffDefName" => record.stuff = Some(text_of(field).to_string()),
                "factionDefName" => record.faction = Some(text_of(field).to_string()),
                "position" => {
                    record.position = self.parse_position(field)?;
                    saw_position = true;
                }
                "rotation" => record.rotation = Rotation::from_int(self.parse_text(field)?),
                "hitPoints" => record.hit_points = self.parse_text(field)?,
                "rotProgress" => {
                    let rot: f32 = self.parse_text(field)?;
                    if !rot.is_finite() {
                        return Err(self.invalid(field, text_of(field)));
                    }
                    record.rot_progress = Some(rot);
                }
                "creature" => {
                    record.creature = Some(CreatureProfile {
                        player_owned: self.parse_flag(field, "playerOwned")?,
                        humanlike: self.parse_flag(field, "humanlike")?,
                        visitor: self.parse_flag(field, "visitor")?,
                        cross_reference_free: self.parse_flag(field, "crossReferenceFree")?,
                    });
                }
                "contents" => record.contents = Some(Box::new(self.parse_record(field)?)),
                _ => {}
            }
        }

        record.def_name = def_name
            .filter(|name| !name.is_empty())
            .ok_or(SnapshotFormatError::MissingElement("defName"))?;
        if !saw_position {
            return Err(SnapshotFormatError::MissingElement("position"));
        }
        Ok(record)
    }
}
