use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use super::database::{DefDatabase, FactionDef, TerrainDef, ThingCategory, ThingDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct DefCompileError {
    pub code: DefErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for DefCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for DefCompileError {}

pub fn load_def_database(path: &Path) -> Result<DefDatabase, DefCompileError> {
    let raw = fs::read_to_string(path).map_err(|source| DefCompileError {
        code: DefErrorCode::ReadFile,
        message: format!("failed to read defs file: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    })?;
    compile_defs(path, &raw)
}

pub fn compile_defs(file_path: &Path, raw: &str) -> Result<DefDatabase, DefCompileError> {
    let doc = Document::parse(raw).map_err(|error| DefCompileError {
        code: DefErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = DocContext {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            DefErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut thing_defs = Vec::<ThingDef>::new();
    let mut terrain_defs = Vec::<TerrainDef>::new();
    let mut faction_defs = Vec::<FactionDef>::new();
    let mut seen_names = HashSet::<(String, String)>::new();
    let mut seen_hashes = HashSet::<u16>::new();

    for child in root.children().filter(|node| node.is_element()) {
        let def_type = child.tag_name().name();
        let def_name = match def_type {
            "ThingDef" => {
                let def = parse_thing_def(&ctx, child)?;
                let name = def.def_name.clone();
                thing_defs.push(def);
                name
            }
            "TerrainDef" => {
                let def = parse_terrain_def(&ctx, child)?;
                if !seen_hashes.insert(def.short_hash) {
                    return Err(ctx.error_at(
                        DefErrorCode::DuplicateDef,
                        format!(
                            "terrain shortHash {} is already used by another <TerrainDef>",
                            def.short_hash
                        ),
                        child,
                    ));
                }
                let name = def.def_name.clone();
                terrain_defs.push(def);
                name
            }
            "FactionDef" => {
                let def = parse_faction_def(&ctx, child)?;
                let name = def.def_name.clone();
                faction_defs.push(def);
                name
            }
            other => {
                return Err(ctx.error_at(
                    DefErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected <ThingDef>, <TerrainDef> or <FactionDef>"
                    ),
                    child,
                ))
            }
        };
        if !seen_names.insert((def_type.to_string(), def_name.clone())) {
            return Err(ctx.error_at(
                DefErrorCode::DuplicateDef,
                format!("duplicate <{def_type}> '{def_name}'; each defName may appear once"),
                child,
            ));
        }
    }

    Ok(DefDatabase::from_defs(thing_defs, terrain_defs, faction_defs))
}

struct DocContext<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl DocContext<'_, '_> {
    fn error_at(&self, code: DefErrorCode, message: String, node: Node<'_, '_>) -> DefCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        DefCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn required_text(&self, node: Node<'_, '_>) -> Result<String, DefCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                DefErrorCode::MissingField,
                format!("field <{}> must not be empty", node.tag_name().name()),
                node,
            ));
        }
        Ok(value)
    }

    fn invalid_value(&self, node: Node<'_, '_>, message: String) -> DefCompileError {
        self.error_at(DefErrorCode::InvalidValue, message, node)
    }

    /// Visits each field element once, rejecting repeats.
    fn for_each_field<'n, 'i>(
        &self,
        def_node: Node<'n, 'i>,
        mut visit: impl FnMut(&str, Node<'n, 'i>) -> Result<(), DefCompileError>,
    ) -> Result<(), DefCompileError> {
        let mut seen_fields = HashSet::<String>::new();
        for field in def_node.children().filter(|child| child.is_element()) {
            let field_name = field.tag_name().name();
            if !seen_fields.insert(field_name.to_string()) {
                return Err(self.error_at(
                    DefErrorCode::DuplicateField,
                    format!(
                        "duplicate field <{}> in <{}>",
                        field_name,
                        def_node.tag_name().name()
                    ),
                    field,
                ));
            }
            visit(field_name, field)?;
        }
        Ok(())
    }

    fn unknown_field(&self, def_node: Node<'_, '_>, field: Node<'_, '_>) -> DefCompileError {
        self.error_at(
            DefErrorCode::UnknownField,
            format!(
                "unknown field <{}> in <{}>",
                field.tag_name().name(),
                def_node.tag_name().name()
            ),
            field,
        )
    }

    fn missing_field(&self, def_node: Node<'_, '_>, field_name: &str) -> DefCompileError {
        self.error_at(
            DefErrorCode::MissingField,
            format!(
                "missing required field <{}> in <{}>",
                field_name,
                def_node.tag_name().name()
            ),
            def_node,
        )
    }
}

fn parse_thing_def(ctx: &DocContext<'_, '_>, node: Node<'_, '_>) -> Result<ThingDef, DefCompileError> {
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut category: Option<ThingCategory> = None;
    let mut max_hit_points: Option<i32> = None;
    let mut destroyable = true;
    let mut ticks_to_rot_start: Option<f32> = None;

    ctx.for_each_field(node, |field_name, field| {
        match field_name {
            "defName" => def_name = Some(ctx.required_text(field)?),
            "label" => label = Some(ctx.required_text(field)?),
            "category" => {
                let value = ctx.required_text(field)?;
                category = Some(ThingCategory::parse(&value).ok_or_else(|| {
                    ctx.invalid_value(
                        field,
                        format!(
                            "invalid category '{value}'; allowed values: {}",
                            ThingCategory::ALLOWED_VALUES
                        ),
                    )
                })?);
            }
            "maxHitPoints" => {
                let value = ctx.required_text(field)?;
                let parsed = value.parse::<i32>().map_err(|_| {
                    ctx.invalid_value(field, format!("maxHitPoints '{value}' is not an integer"))
                })?;
                if parsed < 1 {
                    return Err(ctx.invalid_value(field, "maxHitPoints must be >= 1".to_string()));
                }
                max_hit_points = Some(parsed);
            }
            "destroyable" => {
                let value = ctx.required_text(field)?;
                destroyable = value.parse::<bool>().map_err(|_| {
                    ctx.invalid_value(field, format!("destroyable '{value}' must be true or false"))
                })?;
            }
            "ticksToRotStart" => {
                let value = ctx.required_text(field)?;
                let parsed = value.parse::<f32>().map_err(|_| {
                    ctx.invalid_value(field, format!("ticksToRotStart '{value}' is not a number"))
                })?;
                if !parsed.is_finite() || parsed <= 0.0 {
                    return Err(
                        ctx.invalid_value(field, "ticksToRotStart must be finite and > 0".to_string())
                    );
                }
                ticks_to_rot_start = Some(parsed);
            }
            _ => return Err(ctx.unknown_field(node, field)),
        }
        Ok(())
    })?;

    let def_name = def_name.ok_or_else(|| ctx.missing_field(node, "defName"))?;
    let category = category.ok_or_else(|| ctx.missing_field(node, "category"))?;
    let max_hit_points = max_hit_points.ok_or_else(|| ctx.missing_field(node, "maxHitPoints"))?;

    Ok(ThingDef {
        label: label.unwrap_or_else(|| def_name.clone()),
        def_name,
        category,
        max_hit_points,
        destroyable,
        ticks_to_rot_start,
    })
}

fn parse_terrain_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<TerrainDef, DefCompileError> {
    let mut def_name: Option<String> = None;
    let mut short_hash: Option<u16> = None;

    ctx.for_each_field(node, |field_name, field| {
        match field_name {
            "defName" => def_name = Some(ctx.required_text(field)?),
            "shortHash" => {
                let value = ctx.required_text(field)?;
                short_hash = Some(value.parse::<u16>().map_err(|_| {
                    ctx.invalid_value(field, format!("shortHash '{value}' must fit in u16"))
                })?);
            }
            _ => return Err(ctx.unknown_field(node, field)),
        }
        Ok(())
    })?;

    Ok(TerrainDef {
        def_name: def_name.ok_or_else(|| ctx.missing_field(node, "defName"))?,
        short_hash: short_hash.ok_or_else(|| ctx.missing_field(node, "shortHash"))?,
    })
}

fn parse_faction_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<FactionDef, DefCompileError> {
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;

    ctx.for_each_field(node, |field_name, field| {
        match field_name {
            "defName" => def_name = Some(ctx.required_text(field)?),
            "label" => label = Some(ctx.required_text(field)?),
            _ => return Err(ctx.unknown_field(node, field)),
        }
        Ok(())
    })?;

    let def_name = def_name.ok_or_else(|| ctx.missing_field(node, "defName"))?;
    Ok(FactionDef {
        label: label.unwrap_or_else(|| def_name.clone()),
        def_name,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn compile(raw: &str) -> Result<DefDatabase, DefCompileError> {
        compile_defs(Path::new("defs.xml"), raw)
    }

    #[test]
    fn valid_document_compiles_all_def_types() {
        let db = compile(
            r#"<Defs>
                <ThingDef><defName>Wall</defName><category>Structure</category><maxHitPoints>300</maxHitPoints></ThingDef>
                <ThingDef><defName>Meal</defName><label>simple meal</label><category>Item</category><maxHitPoints>50</maxHitPoints><ticksToRotStart>240000</ticksToRotStart></ThingDef>
                <ThingDef><defName>Geyser</defName><category>Structure</category><maxHitPoints>1</maxHitPoints><destroyable>false</destroyable></ThingDef>
                <TerrainDef><defName>Soil</defName><shortHash>812</shortHash></TerrainDef>
                <FactionDef><defName>PlayerColony</defName></FactionDef>
            </Defs>"#,
        )
        .expect("compile");
        let wall = db.thing_def("Wall").expect("wall");
        assert_eq!(wall.label, "Wall");
        assert!(wall.destroyable);
        assert_eq!(db.thing_def("Meal").and_then(|d| d.ticks_to_rot_start), Some(240_000.0));
        assert!(!db.thing_def("Geyser").expect("geyser").destroyable);
        assert_eq!(db.terrain_by_hash(812).map(|d| d.def_name.as_str()), Some("Soil"));
        assert_eq!(db.faction_def("PlayerColony").map(|d| d.label.as_str()), Some("PlayerColony"));
    }

    #[test]
    fn missing_category_reports_location() {
        let err = compile(
            r#"<Defs><ThingDef><defName>Wall</defName><maxHitPoints>10</maxHitPoints></ThingDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, DefErrorCode::MissingField);
        assert!(err.message.contains("category"));
        assert!(err.location.is_some());
    }

    #[test]
    fn unknown_field_errors() {
        let err = compile(
            r#"<Defs><FactionDef><defName>A</defName><mood>Happy</mood></FactionDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, DefErrorCode::UnknownField);
    }

    #[test]
    fn invalid_category_errors() {
        let err = compile(
            r#"<Defs><ThingDef><defName>A</defName><category>Vehicle</category><maxHitPoints>1</maxHitPoints></ThingDef></Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, DefErrorCode::InvalidValue);
    }

    #[test]
    fn duplicate_terrain_hash_errors() {
        let err = compile(
            r#"<Defs>
                <TerrainDef><defName>Soil</defName><shortHash>4</shortHash></TerrainDef>
                <TerrainDef><defName>Sand</defName><shortHash>4</shortHash></TerrainDef>
            </Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, DefErrorCode::DuplicateDef);
    }

    #[test]
    fn duplicate_def_name_errors_within_type_only() {
        let err = compile(
            r#"<Defs>
                <FactionDef><defName>Pirates</defName></FactionDef>
                <FactionDef><defName>Pirates</defName></FactionDef>
            </Defs>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, DefErrorCode::DuplicateDef);

        let db = compile(
            r#"<Defs>
                <FactionDef><defName>Stone</defName></FactionDef>
                <TerrainDef><defName>Stone</defName><shortHash>1</shortHash></TerrainDef>
            </Defs>"#,
        )
        .expect("different def types may share a name");
        assert!(db.faction_def("Stone").is_some());
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = compile(r#"<Defs><ThingDef><defName>a</defName></Defs>"#).expect_err("err");
        assert_eq!(err.code, DefErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn missing_file_is_read_error() {
        let temp = TempDir::new().expect("temp");
        let err = load_def_database(&temp.path().join("absent.xml")).expect_err("err");
        assert_eq!(err.code, DefErrorCode::ReadFile);
    }
}
