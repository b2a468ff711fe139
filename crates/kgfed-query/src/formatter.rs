//! Result formatting: JSON, Table, and Markdown output.
//!
//! Table and Markdown render one row per answer and one column per concept
//! of the question graph.

use kgfed_core::{Curies, MergedResult};
use serde::{Deserialize, Serialize};

/// Output format for merged results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
    Markdown,
}

/// Format a merged result in the specified output format.
#[must_use]
pub fn format_result(result: &MergedResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(result),
        OutputFormat::Table => format_table(result),
        OutputFormat::Markdown => format_markdown(result),
    }
}

fn format_json(result: &MergedResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
}

/// Concept columns in path order; falls back to the sorted binding names
/// when the question graph is empty.
fn columns(result: &MergedResult) -> Vec<String> {
    let order = result.question_graph.order();
    if !order.is_empty() {
        return order;
    }
    let mut names: Vec<String> = result
        .knowledge_map
        .iter()
        .flat_map(|answer| answer.node_bindings.keys().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn rows(result: &MergedResult, columns: &[String]) -> Vec<Vec<String>> {
    result
        .knowledge_map
        .iter()
        .map(|answer| {
            columns
                .iter()
                .map(|col| {
                    answer
                        .node_bindings
                        .get(col)
                        .map(curies_to_display)
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

fn format_table(result: &MergedResult) -> String {
    if result.knowledge_map.is_empty() {
        return "(no results)".to_string();
    }

    let columns = columns(result);
    let rows = rows(result, &columns);

    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut output = String::new();

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&sep.join("-+-"));
    output.push('\n');

    for row in &rows {
        let vals: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect();
        output.push_str(vals.join(" | ").trim_end());
        output.push('\n');
    }

    output
}

fn format_markdown(result: &MergedResult) -> String {
    if result.knowledge_map.is_empty() {
        return "*No results*\n".to_string();
    }

    let columns = columns(result);
    let mut output = String::new();

    output.push_str("| ");
    output.push_str(&columns.join(" | "));
    output.push_str(" |\n");

    output.push_str("| ");
    let seps: Vec<&str> = columns.iter().map(|_| "---").collect();
    output.push_str(&seps.join(" | "));
    output.push_str(" |\n");

    for row in rows(result, &columns) {
        output.push_str("| ");
        output.push_str(&row.join(" | "));
        output.push_str(" |\n");
    }

    output
}

fn curies_to_display(curies: &Curies) -> String {
    curies.ids().join(", ")
}
