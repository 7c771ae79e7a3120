//! Plain-text rendering of a session view.

use std::fmt::Write as _;

use common::ScreenerResult;

use crate::session::SessionView;

const COLUMNS: [&str; 8] = [
    "Symbol",
    "Company",
    "Last price",
    "Volume",
    "Trade value",
    "Change",
    "Last updated",
    "Reason",
];

/// Header line above the results table.
pub fn summary_line(view: &SessionView) -> String {
    if view.loading {
        "Running...".to_string()
    } else if view.results.is_empty() {
        "No screen has been run yet".to_string()
    } else {
        format!("{} matching symbols", view.results.len())
    }
}

/// Group the integer part with commas, keeping up to two decimals.
pub fn group_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = (value * 100.0).round() / 100.0;
    let negative = rounded < 0.0;
    let abs = rounded.abs();
    let cents = ((abs - abs.trunc()) * 100.0).round() as u64;

    // `{:.0}` prints every integer digit, without saturating or exponents.
    let digits = format!("{:.0}", abs.trunc());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if cents > 0 {
        let frac = format!("{cents:02}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}

/// Table cells for one result row, in `COLUMNS` order.
pub fn result_cells(row: &ScreenerResult) -> [String; 8] {
    [
        row.symbol.clone(),
        row.company_name.clone(),
        group_thousands(row.last_price),
        group_thousands(row.volume),
        group_thousands(row.trade_value),
        format!("{}%", row.percent_change),
        row.last_updated.format("%Y-%m-%d %H:%M").to_string(),
        row.reason.clone(),
    ]
}

/// Results as an aligned text table, with an empty-state row.
pub fn render_results(view: &SessionView) -> String {
    let rows: Vec<[String; 8]> = view.results.iter().map(result_cells).collect();

    let mut widths = COLUMNS.map(|c| c.chars().count());
    for cells in &rows {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", summary_line(view));
    push_row(&mut out, &COLUMNS.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));

    if rows.is_empty() {
        let _ = writeln!(out, "No results to show.");
    }
    for cells in &rows {
        push_row(&mut out, cells, &widths);
    }

    if let Some(msg) = view.error {
        let _ = writeln!(out, "error: {msg}");
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| {
            let pad = w.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
}

/// One block per catalog filter: enabled marker, name, and when enabled the
/// current parameter values.
pub fn render_filters(view: &SessionView) -> String {
    let mut out = String::new();
    for def in &view.catalog {
        let marker = if view.is_enabled(&def.id) { "[x]" } else { "[ ]" };
        let _ = writeln!(out, "{marker} {} ({})", def.name, def.id);
        if !def.description.is_empty() {
            let _ = writeln!(out, "      {}", def.description);
        }

        let Some(selected) = view.selection.get(&def.id) else {
            continue;
        };
        for param in &def.parameters {
            let value = selected
                .params
                .get(&param.name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "      {} = {}  # {}", param.name, value, param.description);
        }
    }
    if view.catalog.is_empty() {
        let _ = writeln!(out, "No filters available.");
    }
    out
}
