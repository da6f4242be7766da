use clap::{Args, ValueEnum};
use itertools::{EitherOrBoth, Itertools};
use miette::Result;
use mtbl_table::{Entry, MessageTable};
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::{fmt::Display, path::PathBuf};

use super::load_table;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    #[default]
    Semantic,
    Full,
}

/// One difference, either for a whole entry or for one property of an entry
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    Added(String),
    Removed(String),
    Modified(String, Vec<Change>),
    Comparison(&'static str, String, String),
    Context(Vec<String>),
}

impl Change {
    /// Heading the change is listed under in a table diff
    fn section(&self) -> &'static str {
        match self {
            Change::Added(_) => "added",
            Change::Removed(_) => "removed",
            _ => "modified",
        }
    }
}

fn indent(text: &str, by: usize) -> String {
    text.lines().map(|l| format!("{:by$}{l}", "")).join("\n")
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Added(v) => write!(f, "✅ {}", v.green()),
            Change::Removed(v) => write!(f, "❌ {}", v.red()),
            Change::Comparison(key, old, new) => {
                write!(f, "* {}: {} vs {}", key, old.red(), new.green())
            }
            Change::Context(lines) => write!(f, "{}", indent(&lines.join("\n"), 1)),
            Change::Modified(id, related) => {
                write!(f, "🔃 {}", id.blue())?;
                for change in related {
                    write!(f, "\n{}", indent(&change.to_string(), 2))?;
                }
                Ok(())
            }
        }
    }
}

/// Everything that differs between two tables
#[derive(Debug)]
struct TableDiff {
    name: String,
    summary: Vec<Change>,
    entries: Vec<Change>,
}

impl Display for TableDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "🔃 {}", self.name.blue())?;
        for change in &self.summary {
            writeln!(f, "{}", indent(&change.to_string(), 2))?;
        }

        let sections = self.entries.iter().chunk_by(|c| c.section());
        for (section, changes) in &sections {
            writeln!(f, "  * entries {section}:")?;
            for change in changes {
                writeln!(f, "{}", indent(&change.to_string(), 4))?;
            }
        }

        Ok(())
    }
}

fn describe(entry: &Entry) -> String {
    format!("{:#010x} {}", entry.id(), entry.to_string_lossy().escape_debug())
}

#[derive(Args)]
pub struct DiffArgs {
    /// An input resource file
    #[arg(short, long, value_name = "FILE")]
    left: PathBuf,

    /// An input resource file
    #[arg(short, long, value_name = "FILE")]
    right: PathBuf,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t = Mode::Semantic)]
    mode: Mode,
}

impl DiffArgs {
    fn inline_diff(&self, old: &str, new: &str) -> Vec<String> {
        let diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();

        for op in diff.ops().iter() {
            for change in diff.iter_inline_changes(op) {
                let mut line = String::new();
                for (emphasized, value) in change.iter_strings_lossy() {
                    let value = value.escape_debug().to_string();
                    if !emphasized {
                        line.push_str(&format!("{}", value.dimmed()));
                    } else if change.tag() == ChangeTag::Insert {
                        line.push_str(&format!("{}", value.green().underline()));
                    } else {
                        line.push_str(&format!("{}", value.red().underline()));
                    }
                }
                lines.push(line);
            }
        }

        lines
    }

    fn handle_entry(&self, left: &Entry, right: &Entry) -> Option<Change> {
        let mut related = Vec::new();

        if left.encoding() != right.encoding() {
            related.push(Change::Comparison(
                "encoding",
                left.encoding().to_string(),
                right.encoding().to_string(),
            ));
        }

        let old = left.to_string_lossy();
        let new = right.to_string_lossy();
        if old != new {
            match self.mode {
                Mode::Semantic => related.push(Change::Comparison(
                    "text",
                    old.escape_debug().to_string(),
                    new.escape_debug().to_string(),
                )),
                Mode::Full => related.push(Change::Context(self.inline_diff(&old, &new))),
            }
        }

        if related.is_empty() {
            None
        } else {
            Some(Change::Modified(format!("{:#010x}", left.id()), related))
        }
    }

    fn handle_table(
        &self,
        name: &str,
        left: &MessageTable,
        right: &MessageTable,
    ) -> Option<TableDiff> {
        let mut summary = Vec::new();
        if left.len() != right.len() {
            summary.push(Change::Comparison(
                "entries",
                left.len().to_string(),
                right.len().to_string(),
            ));
        }

        // both sides iterate in ascending identifier order
        let mut entries = left
            .iter()
            .merge_join_by(right.iter(), |l, r| l.id().cmp(&r.id()))
            .filter_map(|pair| match pair {
                EitherOrBoth::Left(entry) => Some(Change::Removed(describe(entry))),
                EitherOrBoth::Right(entry) => Some(Change::Added(describe(entry))),
                EitherOrBoth::Both(l, r) => self.handle_entry(l, r),
            })
            .collect::<Vec<_>>();
        entries.sort();

        if summary.is_empty() && entries.is_empty() {
            None
        } else {
            Some(TableDiff {
                name: name.into(),
                summary,
                entries,
            })
        }
    }

    pub fn handle(&self) -> Result<()> {
        let left = load_table(&self.left)?;
        let right = load_table(&self.right)?;

        if let Some(d) = self.handle_table(&self.left.to_string_lossy(), &left, &right) {
            print!("{}", d);
        }

        Ok(())
    }
}
