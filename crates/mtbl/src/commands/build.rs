use clap::{Args, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use mtbl_table::write::EncodingPolicy;
use mtbl_table::{MessageTable, MessageTableWriter, WriterOptions};
use std::{fs::File, io::BufReader, path::PathBuf};
use tracing::info;

use super::create_output;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TextEncoding {
    #[default]
    Keep,
    Wide,
    Narrow,
}

impl From<TextEncoding> for EncodingPolicy {
    fn from(value: TextEncoding) -> Self {
        match value {
            TextEncoding::Keep => EncodingPolicy::Keep,
            TextEncoding::Wide => EncodingPolicy::Wide,
            TextEncoding::Narrow => EncodingPolicy::Narrow,
        }
    }
}

#[derive(Args)]
pub struct BuildArgs {
    /// A JSON object mapping message identifiers to text
    #[arg(short, long, value_name = "JSON")]
    input: PathBuf,

    /// A target resource file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Encoding of the written records
    #[arg(short, long, value_enum, default_value_t = TextEncoding::Keep)]
    encoding: TextEncoding,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl BuildArgs {
    pub fn handle(&self) -> Result<()> {
        let input = File::open(&self.input)
            .into_diagnostic()
            .context(format!("path: {}", &self.input.display()))?;

        let table: MessageTable = serde_json::from_reader(BufReader::new(input))
            .into_diagnostic()
            .context(format!("parsing {}", &self.input.display()))?;

        info!("creating {} with {} entries", &self.file.display(), table.len());

        let out = create_output(&self.file, self.overwrite)?;
        MessageTableWriter::new(
            out,
            WriterOptions::builder()
                .encoding(self.encoding.into())
                .build(),
        )
        .finish(&table)
        .context("writing message table")?;

        Ok(())
    }
}
