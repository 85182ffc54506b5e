mod compiler;
mod database;

pub use compiler::{
    compile_defs, load_def_database, DefCompileError, DefErrorCode, SourceLocation,
};
pub use database::{DefDatabase, FactionDef, TerrainDef, ThingCategory, ThingDef};
