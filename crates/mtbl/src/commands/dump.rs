use clap::{Args, ValueEnum};
use miette::{miette, IntoDiagnostic, Result};
use mtbl_table::MessageTable;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use super::load_table;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct DumpArgs {
    /// An input resource, or a directory searched for `.bin` resources
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Output format. A directory is printed as one JSON object keyed by path.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

fn render_text(out: &mut String, table: &MessageTable) {
    for entry in table {
        let _ = writeln!(
            out,
            "{:#010x} {:<6} {}",
            entry.id(),
            entry.encoding(),
            entry.to_string_lossy().escape_debug()
        );
    }
}

impl DumpArgs {
    /// Render decoded tables. A single table without a path is printed bare.
    fn render(&self, tables: &[(String, MessageTable)]) -> Result<String> {
        let mut out = String::new();

        match (self.format, tables) {
            (Format::Text, [(_, table)]) if !self.file.is_dir() => render_text(&mut out, table),
            (Format::Text, _) => {
                for (path, table) in tables {
                    let _ = writeln!(out, "# {path}");
                    render_text(&mut out, table);
                }
            }
            (Format::Json, [(_, table)]) if !self.file.is_dir() => {
                out = serde_json::to_string_pretty(table).into_diagnostic()?;
                out.push('\n');
            }
            (Format::Json, _) => {
                let by_path = tables
                    .iter()
                    .map(|(path, table)| (path, table))
                    .collect::<BTreeMap<_, _>>();
                out = serde_json::to_string_pretty(&by_path).into_diagnostic()?;
                out.push('\n');
            }
        }

        Ok(out)
    }

    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        if !self.file.is_dir() {
            return Ok(vec![self.file.clone()]);
        }

        let files = WalkDir::new(&self.file)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
            })
            .map(|e| e.into_path())
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(miette!("no .bin resources in {}", self.file.display()));
        }

        Ok(files)
    }

    fn load(path: &Path) -> Result<(String, MessageTable)> {
        let table = load_table(path)?;
        info!("{} entries in {}", table.len(), path.display());

        Ok((path.display().to_string(), table))
    }

    pub fn handle(&self) -> Result<()> {
        let tables = self
            .collect_files()?
            .iter()
            .map(|path| Self::load(path))
            .collect::<Result<Vec<_>>>()?;

        print!("{}", self.render(&tables)?);

        Ok(())
    }
}
