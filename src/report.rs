//! Streaming HTML summary report
//!
//! Rows are written as soon as they are known, so a run that aborts part way
//! still leaves a readable (if truncated) report behind. The writer keeps no
//! row history.

use crate::charset::CharsetWriter;
use crate::counts::Counts;
use crate::error::Result;
use crate::outcome::{FileTestResult, RunSummary};
use chrono::{DateTime, Local};
use html_escape::{encode_single_quoted_attribute, encode_text};
use std::io::Write;
use std::path::{Component, Path};
use std::time::Duration;

/// Stylesheet linked from every report, copied from the source root if present
pub const STYLESHEET: &str = "fixture.css";

/// Name of the summary report in the output root
pub const SUMMARY_FILE: &str = "summary.html";

/// Attributes for a count cell that is fine
const GOOD_CELL: &str = "bgcolor='#cfffcf' class='number'";
/// Attributes for a count cell that signals a problem
const BAD_CELL: &str = "bgcolor='#ffcfcf' class='number'";

/// Cell style for a wrong/exceptions count
pub fn cell_style(count: u64) -> &'static str {
    if count == 0 { GOOD_CELL } else { BAD_CELL }
}

/// Format an integer with `,` thousands separators
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format an elapsed time the way the fixture framework prints run times:
/// `m:ss.hh` up to and including ten minutes, `h:mm:ss` above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut millis = elapsed.as_millis();
    let mut take = |scale: u128| {
        let part = millis / scale;
        millis -= part * scale;
        part
    };

    if elapsed.as_millis() > 600_000 {
        let hours = take(3_600_000);
        let ten_minutes = take(600_000);
        let minutes = take(60_000);
        let ten_seconds = take(10_000);
        let seconds = take(1_000);
        format!("{hours}:{ten_minutes}{minutes}:{ten_seconds}{seconds}")
    } else {
        let minutes = take(60_000);
        let ten_seconds = take(10_000);
        let seconds = take(1_000);
        let tenths = take(100);
        let hundredths = take(10);
        format!("{minutes}:{ten_seconds}{seconds}.{tenths}{hundredths}")
    }
}

/// Run date in `Date.toString` order. The zone is a numeric offset since
/// local time carries no zone abbreviation.
pub fn format_run_date(date: &DateTime<Local>) -> String {
    date.format("%a %b %d %H:%M:%S %z %Y").to_string()
}

/// Render a relative path with `/` separators, for links and labels
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Writes `summary.html` incrementally.
///
/// Paths and titles the output charset cannot represent are written as
/// character references, so a report row never fails on encoding.
pub struct ReportWriter<W: Write> {
    out: CharsetWriter<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: CharsetWriter<W>) -> Self {
        Self {
            out: out.with_character_references(),
        }
    }

    /// Document preamble and the head of the results table
    pub fn begin(&mut self) -> Result<()> {
        let charset = self.out.charset().name();
        writeln!(self.out, "<?xml version='1.0' encoding='{}'?>", charset)?;
        writeln!(
            self.out,
            "<!DOCTYPE html PUBLIC '-//W3C//DTD XHTML 1.0 Transitional//EN' \
             'http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd'>"
        )?;
        writeln!(self.out, "<html xmlns='http://www.w3.org/1999/xhtml'>")?;
        writeln!(self.out, "<head>")?;
        writeln!(
            self.out,
            "<meta http-equiv='Content-Type' content='text/html; charset={}' />",
            charset
        )?;
        writeln!(self.out, "<title>Summary</title>")?;
        writeln!(self.out, "<link rel='stylesheet' href='{}'/>", STYLESHEET)?;
        writeln!(self.out, "</head>")?;
        writeln!(self.out, "<body>")?;
        writeln!(self.out, "<table>")?;
        writeln!(self.out, "<caption>Summary</caption>")?;
        writeln!(
            self.out,
            "<tr class='head'><td>path</td><td>right</td><td>wrong</td>\
             <td>exceptions</td><td>run elapsed time</td><td>description</td></tr>"
        )
    }

    /// Highlighted row opening a directory
    pub fn directory_header(&mut self, directory: &Path) -> Result<()> {
        let label = directory.display().to_string();
        writeln!(
            self.out,
            "<tr class='highlight'><td colspan='6'>{}</td></tr>",
            encode_text(&label)
        )
    }

    /// One row per executed document
    pub fn file_row(&mut self, result: &FileTestResult) -> Result<()> {
        let label = slash_path(&result.relative_path);
        let name = match &result.output_relative_path {
            Some(output) => format!(
                "<a href='{}'>{}</a>",
                encode_single_quoted_attribute(&slash_path(output)),
                encode_text(&label)
            ),
            None => encode_text(&label).into_owned(),
        };
        // Titles are already markup, so they go in verbatim
        self.row(&name, &result.title, result.counts, result.elapsed)
    }

    /// Subtotal of the documents directly inside a directory
    pub fn directory_summary(&mut self, counts: Counts, elapsed: Duration) -> Result<()> {
        self.row("<strong>Summary</strong>", "", counts, elapsed)
    }

    /// Close the results table, append the run summary table and flush
    pub fn finish(mut self, summary: &RunSummary) -> Result<W> {
        writeln!(self.out, "</table>")?;
        self.summary_table(summary)?;
        writeln!(self.out, "</body>")?;
        writeln!(self.out, "</html>")?;
        self.out.finish()
    }

    fn row(
        &mut self,
        name: &str,
        description: &str,
        counts: Counts,
        elapsed: Duration,
    ) -> Result<()> {
        writeln!(
            self.out,
            "<tr><td>{}</td><td {}>{}</td><td {}>{}</td><td {}>{}</td>\
             <td>{}</td><td>{}</td></tr>",
            name,
            GOOD_CELL,
            group_thousands(counts.right),
            cell_style(counts.wrong),
            group_thousands(counts.wrong),
            cell_style(counts.exceptions),
            group_thousands(counts.exceptions),
            format_elapsed(elapsed),
            description
        )
    }

    /// Key/value table in the layout the fixture framework uses for its
    /// summary fixture: entries sorted by key, the counts cell marked
    /// pass or fail.
    fn summary_table(&mut self, summary: &RunSummary) -> Result<()> {
        let counts = summary.grand_total;
        let entries = [
            ("counts", counts.to_string()),
            (
                "directories processed",
                summary.directories_processed.to_string(),
            ),
            ("files processed", summary.files_processed.to_string()),
            ("run date", format_run_date(&summary.start_time)),
            ("run elapsed time", format_elapsed(summary.elapsed)),
        ];

        write!(
            self.out,
            "<table><caption>Summary</caption>\
             <tr class='head'><td colspan='2'>fit.Summary</td></tr>"
        )?;
        for (key, value) in &entries {
            let mark = match *key {
                "counts" if counts.has_failures() => " class=\"fail\"",
                "counts" => " class=\"pass\"",
                _ => "",
            };
            write!(
                self.out,
                "\n<tr>\n<td>{}</td>\n<td{}>{}</td></tr>",
                key,
                mark,
                encode_text(value)
            )?;
        }
        writeln!(self.out, "</table>")
    }
}
