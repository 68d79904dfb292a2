use anyhow::{anyhow, Result};
use log::{error, info, warn};
use scraper::Html;
use std::collections::HashSet;

use crate::core::config::AutotagConfig;
use crate::core::types::{ContextualCell, RunSummary, SectionSummary, TagAssignment, TextFragment};
use crate::filing::artifacts::ArtifactStore;
use crate::filing::context::{align, table_assignments};
use crate::filing::inject::{IdSource, TagInjector};
use crate::filing::pages::{cover_page, locate_markers, page_intervals, split_raw, PageBoundaryMarker};
use crate::filing::tables::{extract_raw_rows, find_statement_tables, reconstruct};
use crate::filing::text::{cover_containers, harvest, harvest_notes};
use crate::tagging::bio::{cover_assignments, notes_assignments};
use crate::tagging::{Tagger, TokenTask};

/// The annotated document and what happened along the way.
#[derive(Debug, Clone)]
pub struct AnnotatedFiling {
    pub html: String,
    pub summary: RunSummary,
}

struct TableSection {
    detected: usize,
    cells: Vec<ContextualCell>,
}

/// Everything the taggers need, extracted while the parsed document is alive.
struct Prepared {
    cover: Option<Vec<TextFragment>>,
    tables: Result<TableSection>,
    notes: Vec<TextFragment>,
}

/// Runs the cover, table and notes sections over one filing and merges the results.
pub struct Annotator<'a> {
    config: &'a AutotagConfig,
    tagger: &'a dyn Tagger,
}

impl<'a> Annotator<'a> {
    pub fn new(config: &'a AutotagConfig, tagger: &'a dyn Tagger) -> Self {
        Self { config, tagger }
    }

    /// Annotates `raw`. A section that fails is recorded in the summary and contributes
    /// no tags; the others still run.
    pub async fn annotate(&self, raw: &str, doc_name: &str, ids: &mut dyn IdSource) -> Result<AnnotatedFiling> {
        if raw.trim().is_empty() {
            return Err(anyhow!("Document {} is empty", doc_name));
        }

        let prepared = prepare(raw, doc_name, self.config);
        let mut summary = RunSummary {
            unsegmentable: prepared.cover.is_none(),
            ..Default::default()
        };

        info!("[1/4] Cover page");
        let cover = match &prepared.cover {
            Some(units) => self.cover_section(units).await,
            None => {
                warn!("No page marker found, skipping the cover page");
                Ok(Vec::new())
            }
        };
        let cover = record(&mut summary.cover, "cover", cover);

        info!("[2/4] Statement tables");
        let tables = match prepared.tables {
            Ok(section) => {
                summary.tables_detected = section.detected;
                self.table_section(&section.cells).await
            }
            Err(e) => Err(e),
        };
        let tables = record(&mut summary.tables, "tables", tables);

        info!("[3/4] Notes ({} units)", prepared.notes.len());
        let notes = self.notes_section(&prepared.notes).await;
        let notes = record(&mut summary.notes, "notes", notes);

        let table_texts: HashSet<&str> = tables.iter().map(|a| a.matched_text.as_str()).collect();
        let notes: Vec<TagAssignment> = notes
            .into_iter()
            .filter(|a| !table_texts.contains(a.matched_text.as_str()))
            .collect();
        summary.notes.predicted = notes.len();

        info!("[4/4] Injecting tags");
        let split = split_raw(raw);
        let mut injector = TagInjector::new(ids);
        let cover_out = injector.inject(split.cover, &cover, &self.config.cover_namespace);
        let tables_out = injector.inject(split.remainder, &tables, &self.config.table_namespace);
        let notes_out = injector.inject(&tables_out.html, &notes, &self.config.notes_namespace);

        summary.cover.applied = cover_out.applied;
        summary.tables.applied = tables_out.applied;
        summary.notes.applied = notes_out.applied;
        info!("{}", summary);

        Ok(AnnotatedFiling {
            html: format!("{}{}{}", cover_out.html, split.marker, notes_out.html),
            summary,
        })
    }

    async fn cover_section(&self, units: &[TextFragment]) -> Result<Vec<TagAssignment>> {
        if units.is_empty() {
            warn!("Cover page has no text to tag");
            return Ok(Vec::new());
        }
        let tokens: Vec<Vec<String>> = units.iter().map(|u| u.cleaned_tokens.clone()).collect();
        let predictions = self.tagger.tag_tokens(TokenTask::Cover, &tokens).await?;
        Ok(cover_assignments(units, &predictions))
    }

    async fn table_section(&self, cells: &[ContextualCell]) -> Result<Vec<TagAssignment>> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let composites: Vec<String> = cells.iter().map(|c| c.composite_key.clone()).collect();
        let labels = self.tagger.tag_cells(&composites).await?;
        if labels.len() != cells.len() {
            return Err(anyhow!("Got {} labels for {} table cells", labels.len(), cells.len()));
        }
        Ok(table_assignments(cells, &labels, &self.config.placeholder_label))
    }

    async fn notes_section(&self, units: &[TextFragment]) -> Result<Vec<TagAssignment>> {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let tokens: Vec<Vec<String>> = units.iter().map(|u| u.cleaned_tokens.clone()).collect();
        let predictions = self.tagger.tag_tokens(TokenTask::Notes, &tokens).await?;
        Ok(notes_assignments(&predictions))
    }
}

fn record(section: &mut SectionSummary, name: &str, result: Result<Vec<TagAssignment>>) -> Vec<TagAssignment> {
    match result {
        Ok(assignments) => {
            section.predicted = assignments.len();
            assignments
        }
        Err(e) => {
            error!("{} section failed: {:#}", name, e);
            section.error = Some(format!("{:#}", e));
            Vec::new()
        }
    }
}

fn prepare(raw: &str, doc_name: &str, config: &AutotagConfig) -> Prepared {
    let doc = Html::parse_document(raw);
    let markers = locate_markers(&doc);

    let cover = cover_page(&markers).map(|page| {
        let fragment = Html::parse_fragment(&page.html);
        harvest(&cover_containers(fragment.root_element()))
    });

    let tables = stage_tables(&doc, &markers, doc_name, config);

    let remainder = Html::parse_document(split_raw(raw).remainder);
    let notes = harvest_notes(remainder.root_element());

    Prepared { cover, tables, notes }
}

/// Stages every statement table of the scanned pages, then aligns what was staged.
fn stage_tables(
    doc: &Html,
    markers: &[PageBoundaryMarker<'_>],
    doc_name: &str,
    config: &AutotagConfig,
) -> Result<TableSection> {
    let store = ArtifactStore::create(&config.work_dir, doc_name)?;

    let mut detected = 0;
    for page in page_intervals(doc, markers, config.scan_limit) {
        let fragment = Html::parse_fragment(&page.html);
        for (statement, table) in find_statement_tables(&fragment, config) {
            let reconstructed = reconstruct(table);
            let rows = extract_raw_rows(table, &config.placeholder_label);
            store.stage(detected, statement, &table.html(), &reconstructed, &rows)?;
            detected += 1;
        }
    }

    let mut cells = Vec::new();
    for staged in store.collect()? {
        cells.extend(align(&staged.rows, &staged.table, staged.statement, &config.placeholder_label));
    }
    info!("{} statement tables, {} data cells", detected, cells.len());
    Ok(TableSection { detected, cells })
}
