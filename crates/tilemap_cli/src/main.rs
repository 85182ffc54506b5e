use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use tilemap_cli::{run, CommandKind};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let command_args = &args[1..];
    let kind = match args[0].as_str() {
        "inspect" => {
            let [path] = command_args else {
                return Err("inspect requires exactly one snapshot path".to_string());
            };
            CommandKind::Inspect {
                path: PathBuf::from(path),
            }
        }
        "orphans" => {
            let mut root = None;
            let mut delete = false;
            let mut index = 0usize;
            while index < command_args.len() {
                match command_args[index].as_str() {
                    "--delete" => {
                        delete = true;
                        index += 1;
                    }
                    "--root" => {
                        let value = command_args
                            .get(index + 1)
                            .ok_or_else(|| "missing value for --root".to_string())?;
                        root = Some(PathBuf::from(value));
                        index += 2;
                    }
                    other => {
                        return Err(format!(
                            "unknown orphans argument '{other}' (expected --delete or --root <dir>)"
                        ))
                    }
                }
            }
            CommandKind::Orphans { root, delete }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "tilemap_cli - inspect and tidy persistent region snapshots",
        "",
        "Usage:",
        "  tilemap_cli inspect <Tile_N.xml>",
        "  tilemap_cli orphans [--root <save-data-dir>] [--delete]",
        "",
        "Defaults:",
        "  --root $PERSISTENT_MAPS_SAVE_ROOT, else ./save_data",
    ]
    .join("\n")
}
