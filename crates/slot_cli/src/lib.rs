use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use vtt_engine::assets::AssetLibraries;
use vtt_engine::persist::{
    decode_scene, encode_scene, inspect, write_save_atomic, SaveFormat, SaveSummary,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Inspect { path: PathBuf, json: bool },
    Upgrade { input: PathBuf, output: PathBuf },
}

/// `Ok(None)` means help was requested.
pub fn parse_args(args: &[String]) -> Result<Option<CommandKind>, String> {
    let Some(command) = args.first() else {
        return Err(usage_text());
    };
    let command_args = &args[1..];

    let kind = match command.as_str() {
        "-h" | "--help" => return Ok(None),
        "inspect" => {
            let mut path = None;
            let mut json = false;
            for arg in command_args {
                match arg.as_str() {
                    "--json" => json = true,
                    flag if flag.starts_with("--") => {
                        return Err(format!("unknown inspect argument '{flag}' (expected --json)"))
                    }
                    value if path.is_none() => path = Some(PathBuf::from(value)),
                    extra => return Err(format!("unexpected inspect argument '{extra}'")),
                }
            }
            let path = path.ok_or_else(|| "inspect requires a save file path".to_string())?;
            CommandKind::Inspect { path, json }
        }
        "upgrade" => match command_args {
            [input, output] => CommandKind::Upgrade {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
            },
            _ => return Err("upgrade requires <in> <out>".to_string()),
        },
        other => return Err(format!("unknown subcommand '{other}'")),
    };
    Ok(Some(kind))
}

pub fn run<W: Write>(kind: CommandKind, stdout: &mut W) -> Result<(), String> {
    match kind {
        CommandKind::Inspect { path, json } => {
            let summary = inspect(&read_save(&path)?)
                .map_err(|error| format!("inspect '{}': {error}", path.display()))?;
            let text = if json {
                serde_json::to_string_pretty(&summary)
                    .map_err(|error| format!("encode summary json: {error}"))?
            } else {
                render_summary(&summary)
            };
            writeln!(stdout, "{text}").map_err(|error| format!("write stdout: {error}"))
        }
        CommandKind::Upgrade { input, output } => {
            let bytes = read_save(&input)?;
            let mut assets = AssetLibraries::default();
            let decoded = decode_scene(&bytes, &mut assets, None)
                .map_err(|error| format!("decode '{}': {error}", input.display()))?;
            for warning in &decoded.warnings {
                writeln!(stdout, "warning: {warning}")
                    .map_err(|error| format!("write stdout: {error}"))?;
            }

            let upgraded = encode_scene(&decoded.state, &assets, SaveFormat::Embedded);
            write_save_atomic(&output, &upgraded)
                .map_err(|error| format!("write '{}': {error}", output.display()))?;
            writeln!(
                stdout,
                "upgraded {} ({}) -> {} (embedded, {} bytes)",
                input.display(),
                decoded.format,
                output.display(),
                upgraded.len()
            )
            .map_err(|error| format!("write stdout: {error}"))
        }
    }
}

fn read_save(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|error| format!("read '{}': {error}", path.display()))
}

pub fn render_summary(summary: &SaveSummary) -> String {
    let format = match summary.legacy_version {
        Some(version) => format!("{} v{version}", summary.format),
        None => summary.format.to_string(),
    };
    let grid = &summary.grid;
    let mut lines = vec![
        format!("format:   {format}"),
        format!("bytes:    {}", summary.file_len),
        format!(
            "grid:     {}x{} cells, cell {} px, offset ({}, {})",
            grid.cols, grid.rows, grid.cell_size, grid.offset_x, grid.offset_y
        ),
        format!(
            "camera:   ({:.1}, {:.1}) zoom {:.2}",
            summary.camera.x, summary.camera.y, summary.camera.zoom
        ),
        format!("map:      {}", summary.map.as_deref().unwrap_or("-")),
        format!("tokens:   {}", summary.token_count),
        format!("drawings: {}", summary.drawing_count),
        format!("fogged:   {} cells", summary.hidden_fog_cells),
    ];
    lines.extend(
        summary
            .warnings
            .iter()
            .map(|warning| format!("warning:  {warning}")),
    );
    lines.join("\n")
}

pub fn usage_text() -> String {
    [
        "vtt_slot_cli - save slot inspection",
        "",
        "Usage:",
        "  vtt_slot_cli inspect <file> [--json]",
        "  vtt_slot_cli upgrade <in> <out>",
    ]
    .join("\n")
}
