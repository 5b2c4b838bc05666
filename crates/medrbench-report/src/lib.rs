//! medrbench-report: Human-readable renderings of eval reports.

pub mod html;

pub use html::{generate_html, write_html_report};
