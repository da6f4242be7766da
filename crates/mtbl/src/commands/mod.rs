use std::fs::File;
use std::path::Path;

use miette::{Context, IntoDiagnostic, Result};
use mtbl_table::MessageTable;

pub mod build;
pub mod diff;
pub mod dump;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Compare two message table resources
    Diff(diff::DiffArgs),
    /// Print the entries of a message table resource
    Dump(dump::DumpArgs),
    /// Build a message table resource from a JSON map
    Build(build::BuildArgs),
}

impl Commands {
    pub fn handle(&self) -> Result<()> {
        match self {
            Commands::Diff(diff) => diff.handle(),
            Commands::Dump(dump) => dump.handle(),
            Commands::Build(build) => build.handle(),
        }
    }
}

/// Read and decode the resource at `path`.
pub(crate) fn load_table(path: &Path) -> Result<MessageTable> {
    let data = std::fs::read(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;

    MessageTable::from_resource(&data).context(format!("decoding {}", path.display()))
}

/// Create `path`, refusing to replace an existing file unless `overwrite` is set.
pub(crate) fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    if !overwrite {
        File::create_new(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    } else {
        File::create(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    }
}
