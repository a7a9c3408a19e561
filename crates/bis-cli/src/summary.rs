use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use bis_document::{Document, SubModel};
use bis_model::{BuildModAttribute, Ledger, Severity, SubModelSource, UnofficialType};

use crate::types::{LoadedDocument, ResaveResult};

/// One row of the step listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRow {
    pub index: usize,
    pub model: String,
    /// 1-based line of the step's first content line.
    pub line: usize,
    pub key: String,
    /// `KEY ACTION` for every build modification toggled at this step.
    pub build_mods: Vec<String>,
}

pub fn print_inspect(loaded: &LoadedDocument, show_build_mods: bool) {
    let summary = &loaded.summary;
    println!("Document: {}", summary.path.display());
    println!(
        "{} submodels, {} steps, {} build modifications, {} missing parts",
        summary.submodels, summary.steps, summary.build_mods, summary.missing
    );
    println!("{}", submodel_table(&loaded.document));
    if show_build_mods && !loaded.document.build_mods().is_empty() {
        println!();
        println!("Build modifications:");
        println!("{}", build_mod_table(&loaded.document));
    }
    print_ledger(loaded.document.ledger());
}

pub fn print_steps(loaded: &LoadedDocument, model: Option<&str>) {
    let rows = step_rows(&loaded.document, model);
    if rows.is_empty() {
        println!("No steps.");
        return;
    }
    println!("{}", step_table(&rows));
}

pub fn print_resave(result: &ResaveResult) {
    println!("Saved: {}", result.output.display());
    print_ledger(result.loaded.document.ledger());
}

fn print_ledger(ledger: &Ledger) {
    if ledger.is_empty() {
        return;
    }
    println!();
    println!("Load status:");
    println!("{}", ledger_table(ledger));
}

pub fn submodel_table(document: &Document) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Submodel"),
        header_cell("Kind"),
        header_cell("Source"),
        header_cell("Lines"),
        header_cell("Steps"),
        header_cell("Instances"),
        header_cell("Mirrored"),
        header_cell("Build mods"),
    ]);
    apply_summary_table_style(&mut table);
    for column in [0, 4, 5, 6, 7, 8] {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for (index, model) in document.registry().iter().enumerate() {
        table.add_row(vec![
            dim_cell(index),
            name_cell(model),
            Cell::new(kind_label(model)),
            Cell::new(source_label(&model.source)),
            Cell::new(model.line_count()),
            count_cell(model.num_steps),
            count_cell(model.instances),
            count_cell(model.mirror_instances),
            count_cell(model.build_mod_count),
        ]);
    }
    table
}

pub fn build_mod_table(document: &Document) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Key"),
        header_cell("Submodel"),
        header_cell("Begin"),
        header_cell("End"),
        header_cell("Step"),
        header_cell("Actions"),
    ]);
    apply_table_style(&mut table);
    for column in [2, 3, 4] {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for build_mod in document.build_mods().iter() {
        let attributes = build_mod.attributes;
        let model = build_mod
            .model_index()
            .and_then(|index| document.registry().by_index(index))
            .map_or_else(|| "-".to_string(), |model| model.name.clone());
        let actions: Vec<String> = build_mod
            .actions
            .iter()
            .map(|(step, action)| format!("{step}:{action}"))
            .collect();
        table.add_row(vec![
            Cell::new(&build_mod.key).add_attribute(Attribute::Bold),
            Cell::new(model),
            line_cell(attributes.get(BuildModAttribute::BeginLine)),
            line_cell(attributes.get(BuildModAttribute::EndLine)),
            optional_cell(attributes.get(BuildModAttribute::ModelStep)),
            Cell::new(actions.join(" ")),
        ]);
    }
    table
}

pub fn ledger_table(ledger: &Ledger) -> Table {
    let mut entries: Vec<_> = ledger.iter().collect();
    entries.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Category"),
        header_cell("Submodel"),
        header_cell("Line"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    for entry in entries {
        table.add_row(vec![
            severity_cell(entry.severity),
            Cell::new(entry.category.label()),
            entry.model.as_deref().map_or_else(|| dim_cell("-"), Cell::new),
            line_cell(entry.line),
            Cell::new(&entry.message),
        ]);
    }
    table
}

/// Steps in build order, optionally only those of `model`.
pub fn step_rows(document: &Document, model: Option<&str>) -> Vec<StepRow> {
    let only = model.and_then(|name| document.registry().index_of(name));
    document
        .steps()
        .iter()
        .enumerate()
        .filter(|(_, pos)| only.is_none_or(|index| pos.model_index == index))
        .map(|(index, pos)| StepRow {
            index,
            model: document
                .registry()
                .by_index(pos.model_index)
                .map(|model| model.name.clone())
                .unwrap_or_default(),
            line: pos.line_number + 1,
            key: document
                .viewer_step_key(index)
                .map(|key| key.to_string())
                .unwrap_or_default(),
            build_mods: document
                .build_mods()
                .build_mod_steps(index)
                .iter()
                .map(|row| format!("{} {}", row.key, row.action))
                .collect(),
        })
        .collect()
}

pub fn step_table(rows: &[StepRow]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Step"),
        header_cell("Submodel"),
        header_cell("Line"),
        header_cell("Viewer key"),
        header_cell("Build mods"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for row in rows {
        let build_mods = if row.build_mods.is_empty() {
            dim_cell("-")
        } else {
            Cell::new(row.build_mods.join(", "))
        };
        table.add_row(vec![
            Cell::new(row.index),
            Cell::new(&row.model).fg(Color::Blue),
            Cell::new(row.line),
            dim_cell(&row.key),
            build_mods,
        ]);
    }
    table
}

pub fn kind_label(model: &SubModel) -> &'static str {
    if model.flags.data_file {
        return "data";
    }
    match model.unofficial {
        UnofficialType::None | UnofficialType::Model => "model",
        UnofficialType::Part => "part",
        UnofficialType::Subpart => "subpart",
        UnofficialType::Primitive => "primitive",
        UnofficialType::Shortcut => "shortcut",
    }
}

pub fn source_label(source: &SubModelSource) -> &'static str {
    match source {
        SubModelSource::Main => "document",
        SubModelSource::External(_) => "external",
        SubModelSource::Include(_) => "include",
        SubModelSource::Generated => "generated",
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn name_cell(model: &SubModel) -> Cell {
    if model.instances == 0 && !model.flags.data_file {
        // Never placed from the top model.
        Cell::new(&model.name).fg(Color::DarkGrey)
    } else {
        Cell::new(&model.name)
            .fg(Color::Blue)
            .add_attribute(Attribute::Bold)
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
        Severity::Info => dim_cell("INFO"),
    }
}

fn count_cell(count: usize) -> Cell {
    if count > 0 {
        Cell::new(count)
    } else {
        dim_cell(count)
    }
}

/// Ledger and attribute lines are 0-based content indexes.
fn line_cell(line: Option<usize>) -> Cell {
    optional_cell(line.map(|line| line + 1))
}

fn optional_cell(value: Option<usize>) -> Cell {
    value.map_or_else(|| dim_cell("-"), Cell::new)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
