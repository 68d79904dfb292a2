use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::tables::StatementKind;
use crate::core::types::{RawRow, ReconstructedTable};
use crate::utils::dirs::reset_dir;

/// A statement table read back from its three staged files.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    pub index: usize,
    pub statement: StatementKind,
    pub table: ReconstructedTable,
    pub rows: Vec<RawRow>,
}

/// Per-document directory holding, for every statement table, its markup (`.html`),
/// its reconstructed grid (`.csv`) and its raw row dump (`.txt`, one JSON array per line).
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Opens `<work_dir>/<document stem>`, discarding whatever an earlier run left there.
    pub fn create(work_dir: &Path, doc_name: &str) -> Result<Self> {
        let stem = Path::new(doc_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Cannot derive a directory name from '{}'", doc_name))?;
        let dir = work_dir.join(stem);
        reset_dir(&dir).with_context(|| format!("Failed to prepare {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn base_name(index: usize, statement: StatementKind) -> String {
        format!("{:03}-{}", index, statement.slug())
    }

    fn parse_base_name(stem: &str) -> Option<(usize, StatementKind)> {
        let (index, slug) = stem.split_once('-')?;
        Some((index.parse().ok()?, StatementKind::from_slug(slug)?))
    }

    pub fn stage(
        &self,
        index: usize,
        statement: StatementKind,
        table_html: &str,
        table: &ReconstructedTable,
        rows: &[RawRow],
    ) -> Result<PathBuf> {
        let base = self.dir.join(Self::base_name(index, statement));

        fs::write(base.with_extension("html"), table_html)?;

        let csv_file = File::create(base.with_extension("csv"))?;
        if !table.is_empty() {
            let mut writer = WriterBuilder::new().has_headers(true).from_writer(csv_file);
            writer.write_record(&table.header)?;
            for row in &table.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        let mut txt = BufWriter::new(File::create(base.with_extension("txt"))?);
        for row in rows {
            writeln!(txt, "{}", serde_json::to_string(row)?)?;
        }
        txt.flush()?;

        debug!("Staged {} ({} rows)", base.display(), table.rows.len());
        Ok(base)
    }

    /// Every complete artifact triple, in staging order. Incomplete triples are skipped.
    pub fn collect(&self) -> Result<Vec<StagedTable>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::parse_base_name(stem) {
                Some((index, statement)) => found.push((index, statement, path.with_extension(""))),
                None => warn!("Ignoring unexpected artifact {}", path.display()),
            }
        }
        found.sort_by_key(|(index, _, _)| *index);

        let mut staged = Vec::new();
        for (index, statement, base) in found {
            let csv_path = base.with_extension("csv");
            let txt_path = base.with_extension("txt");
            if !is_non_empty(&csv_path) || !is_non_empty(&txt_path) {
                warn!("Skipping incomplete artifacts for {}", base.display());
                continue;
            }
            let table = read_table(&csv_path)?;
            let rows = read_rows(&txt_path)?;
            staged.push(StagedTable {
                index,
                statement,
                table,
                rows,
            });
        }

        info!("Collected {} staged tables from {}", staged.len(), self.dir.display());
        Ok(staged)
    }
}

fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn read_table(path: &Path) -> Result<ReconstructedTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let width = header.len();

    let mut rows = Vec::new();
    for record in reader.records() {
        let mut row: Vec<String> = record?.iter().map(String::from).collect();
        row.resize(width, String::new());
        rows.push(row);
    }
    Ok(ReconstructedTable { header, rows })
}

fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRow>(&line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("{}:{}: unreadable row ({})", path.display(), number + 1, e),
        }
    }
    Ok(rows)
}
