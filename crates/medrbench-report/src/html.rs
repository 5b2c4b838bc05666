//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use medrbench_core::report::EvalReport;
use medrbench_core::statistics::Accuracy;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn accuracy_cell(acc: &Accuracy) -> String {
    format!(
        "<td>{:.1}%</td><td>{}/{}</td>",
        acc.rate() * 100.0,
        acc.correct,
        acc.scored
    )
}

/// Generate an HTML report from an eval report.
pub fn generate_html(report: &EvalReport) -> String {
    let summary = &report.summary;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>medrbench report: {}</title>\n",
        html_escape(&report.model)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>medrbench report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Model: <strong>{}</strong> ({}) | Judge: <strong>{}</strong> | split {} / {} partition{} | {} cases | {}</p>\n",
        html_escape(&report.model),
        html_escape(&report.provider),
        html_escape(&report.judge_model),
        report.dataset.split,
        report.partition,
        if report.dataset.rare_disease_only { ", rare diseases only" } else { "" },
        summary.total_cases(),
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Summary dashboard
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str(&format!(
        "<p class=\"headline\">Accuracy <strong>{:.1}%</strong> ({} of {} judged cases)</p>\n",
        summary.overall.rate() * 100.0,
        summary.overall.correct,
        summary.overall.scored
    ));

    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Slice</th><th>Accuracy</th><th>Correct</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for (category, acc) in &summary.per_category {
        html.push_str(&format!("<tr><td>{category}</td>{}</tr>\n", accuracy_cell(acc)));
    }
    html.push_str(&format!(
        "<tr><td>rare disease</td>{}</tr>\n",
        accuracy_cell(&summary.rare_disease)
    ));
    html.push_str(&format!(
        "<tr><td>common disease</td>{}</tr>\n",
        accuracy_cell(&summary.common_disease)
    ));
    html.push_str("</tbody></table>\n");

    html.push_str(&format!(
        "<p class=\"meta\">No answer marker: {} | Unjudged: {} | Generation failed: {} | Tokens: {} | Est. cost: ${:.4}</p>\n",
        summary.no_answer,
        summary.unjudged,
        summary.failed,
        report.token_usage.total_tokens,
        report.token_usage.estimated_cost_usd,
    ));

    // SVG bar chart per body system
    if !summary.per_body_category.is_empty() {
        html.push_str("<h3>By body system</h3>\n");
        let bars: Vec<(&str, f64)> = summary
            .per_body_category
            .iter()
            .map(|(body, acc)| (body.as_str(), acc.rate()))
            .collect();
        html.push_str(&generate_bar_chart(&bars));
    }

    html.push_str("</section>\n");

    // Per-case results
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Results</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Case</th><th onclick=\"sortTable(1)\">Category</th><th onclick=\"sortTable(2)\">Rare</th><th onclick=\"sortTable(3)\">Answer</th><th onclick=\"sortTable(4)\">Judge</th><th onclick=\"sortTable(5)\">Reward</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for case in &report.results {
        let r = &case.result;
        let row_class = if r.is_correct() { "pass" } else { "fail" };
        let answer = if r.parsed_answer.extraction_succeeded {
            html_escape(&r.parsed_answer.extracted_text)
        } else {
            "<em>no answer marker</em>".to_string()
        };
        let judge = r
            .judge_verdict
            .as_ref()
            .map(|v| html_escape(v.raw_judge_text.trim()))
            .unwrap_or_else(|| "-".to_string());

        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.0}</td></tr>\n",
            row_class,
            html_escape(&r.case_id),
            r.metadata.category,
            if r.metadata.is_rare_disease { "yes" } else { "no" },
            answer,
            judge,
            r.reward
        ));
    }
    for case in &report.unjudged {
        html.push_str(&format!(
            "<tr class=\"skip\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>unjudged: {}</td><td>-</td></tr>\n",
            html_escape(&case.case_id),
            case.metadata.category,
            if case.metadata.is_rare_disease { "yes" } else { "no" },
            html_escape(&case.parsed_answer.extracted_text),
            html_escape(&case.reason)
        ));
    }
    for case in &report.failed {
        html.push_str(&format!(
            "<tr class=\"skip\"><td>{}</td><td>{}</td><td>{}</td><td>-</td><td>failed: {}</td><td>-</td></tr>\n",
            html_escape(&case.case_id),
            case.metadata.category,
            if case.metadata.is_rare_disease { "yes" } else { "no" },
            html_escape(&case.error)
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(
        &serde_json::to_string_pretty(report)
            .unwrap_or_default()
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    // JavaScript for sorting
    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &EvalReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn generate_bar_chart(bars: &[(&str, f64)]) -> String {
    let bar_height = 24;
    let max_width = 400;
    let padding = 8;
    let label_width = 240;

    let total_height = bars.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (label, score)) in bars.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (*score * max_width as f64) as usize;

        let color = if *score >= 0.8 {
            "#22c55e"
        } else if *score >= 0.5 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"13\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(label)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.1}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            score * 100.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --skip: #fef9c3; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --skip: #713f12; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
.headline { font-size: 1.25rem; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; vertical-align: top; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
.skip { background: var(--skip); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    return asc ? va.localeCompare(vb) : vb.localeCompare(va);
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
