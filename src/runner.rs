//! Test runner: walks the source tree, executes documents and drives the report
//!
//! Traversal is depth-first. For each directory the header row is written
//! straight away, then the matching documents (in name order), then the
//! directory's Summary row, and only then its subdirectories. Totals travel
//! upward as return values.

use crate::charset::{self, Charset};
use crate::config::Config;
use crate::counts::Counts;
use crate::error::{Error, Result};
use crate::filter::IncludeFilter;
use crate::fixture::{Execution, FixtureExecutor};
use crate::outcome::{DirectoryReport, FileTestResult, RunOutcome, RunSummary};
use crate::report::{ReportWriter, STYLESHEET, SUMMARY_FILE};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, debug, error, info, span, warn};
use walkdir::WalkDir;

/// Contents of the first `<title>…</title>` span anywhere in the raw text,
/// or `""` if there is no complete one.
pub fn extract_title(document: &str) -> &str {
    const OPEN: &str = "<title>";
    const CLOSE: &str = "</title>";

    document
        .find(OPEN)
        .and_then(|start| {
            let rest = &document[start + OPEN.len()..];
            rest.find(CLOSE).map(|end| &rest[..end])
        })
        .unwrap_or("")
}

/// Matching documents and subdirectories of one directory, both sorted by name
#[derive(Debug, Default)]
struct Listing {
    files: Vec<PathBuf>,
    directories: Vec<PathBuf>,
}

/// Runs every matching document below a source directory
pub struct TestRunner<E: FixtureExecutor> {
    source_dir: PathBuf,
    output_dir: PathBuf,
    filter: IncludeFilter,
    input_charset: Charset,
    output_charset: Charset,
    pool: Option<rayon::ThreadPool>,
    executor: E,
}

impl<E: FixtureExecutor> TestRunner<E> {
    /// Create a runner for the given configuration
    pub fn new(config: &Config, executor: E) -> Result<Self> {
        let pool = if config.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()
                .map_err(|e| Error::Config(format!("cannot start worker threads: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            source_dir: config.source_dir.clone(),
            output_dir: config.output_dir.clone(),
            filter: IncludeFilter::new(&config.include, config.case_sensitive)?,
            input_charset: Charset::for_label(&config.source_encoding)?,
            output_charset: Charset::for_output_label(&config.output_encoding)?,
            pool,
            executor,
        })
    }

    /// Run the whole tree and write `summary.html`
    pub fn run(&self) -> Result<RunOutcome> {
        let _span = span!(Level::INFO, "fit_run", source = %self.source_dir.display()).entered();

        if !self.source_dir.is_dir() {
            return Err(Error::Config(format!(
                "source directory {} does not exist!",
                self.source_dir.display()
            )));
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            Error::Config(format!(
                "cannot create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        info!(
            source = %self.source_dir.display(),
            output = %self.output_dir.display(),
            input_charset = %self.input_charset,
            output_charset = %self.output_charset,
            "Executing fit tests"
        );

        let started = Instant::now();
        let mut summary = RunSummary::begin();

        self.copy_stylesheet();

        let summary_path = self.output_dir.join(SUMMARY_FILE);
        let stream = charset::open_writer(&summary_path, self.output_charset)?;
        let mut report = ReportWriter::new(stream);
        report.begin()?;

        let mut directories = Vec::new();
        let grand_total = self.process_directory(&self.source_dir, &mut report, &mut directories)?;

        summary.finalize(&directories, grand_total, started.elapsed());
        report.finish(&summary)?;

        info!(
            files = summary.files_processed,
            directories = summary.directories_processed,
            result = %grand_total,
            "Fit tests finished"
        );

        Ok(RunOutcome {
            summary,
            directories,
            summary_path,
        })
    }

    /// Process one directory and everything below it, returning its aggregate
    fn process_directory<W: Write>(
        &self,
        directory: &Path,
        report: &mut ReportWriter<W>,
        directories: &mut Vec<DirectoryReport>,
    ) -> Result<Counts> {
        let _span = span!(Level::DEBUG, "directory", path = %directory.display()).entered();

        let mirrored = self.mirrored_path(directory);
        if let Err(e) = fs::create_dir_all(&mirrored) {
            warn!(path = %mirrored.display(), error = %e, "Failed to create output directory");
        }
        report.directory_header(directory)?;

        let listing = self.list(directory);
        debug!(
            files = listing.files.len(),
            subdirectories = listing.directories.len(),
            "Listed directory"
        );

        let started = Instant::now();
        let file_results = self.execute_all(&listing.files);

        let mut file_total = Counts::ZERO;
        for result in &file_results {
            report.file_row(result)?;
            file_total.tally(result.counts);
        }
        report.directory_summary(file_total, started.elapsed())?;

        // Reserve this directory's slot so reports come out in pre-order
        let slot = directories.len();

        let mut aggregate = file_total;
        let mut subdirectory_totals = Vec::with_capacity(listing.directories.len());
        for subdirectory in &listing.directories {
            let total = self.process_directory(subdirectory, report, directories)?;
            aggregate.tally(total);
            let name = subdirectory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            subdirectory_totals.push((name, total));
        }

        directories.insert(
            slot,
            DirectoryReport {
                path: directory.to_path_buf(),
                file_results,
                subdirectory_totals,
                aggregate,
            },
        );

        Ok(aggregate)
    }

    /// Execute documents, possibly in parallel; results keep the input order
    fn execute_all(&self, files: &[PathBuf]) -> Vec<FileTestResult> {
        let execute = || -> Vec<FileTestResult> {
            files.par_iter().map(|f| self.process_file(f)).collect()
        };
        match &self.pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }

    /// Run one document. Failures stay local to the document.
    fn process_file(&self, path: &Path) -> FileTestResult {
        let _span = span!(Level::DEBUG, "process_file", ?path).entered();
        let started = Instant::now();

        let relative_path = path
            .strip_prefix(&self.source_dir)
            .unwrap_or(path)
            .to_path_buf();
        let output = self.mirrored_path(path);

        let mut title = String::new();
        match self.run_document(path, &output, &mut title) {
            Ok(execution) => {
                info!(
                    path = %relative_path.display(),
                    counts = %execution.counts,
                    "Processed document"
                );
                FileTestResult {
                    output_relative_path: Some(
                        output
                            .strip_prefix(&self.output_dir)
                            .unwrap_or(&output)
                            .to_path_buf(),
                    ),
                    relative_path,
                    title,
                    counts: execution.counts,
                    elapsed: execution.elapsed,
                    error: None,
                }
            }
            Err(e) => {
                error!(path = %relative_path.display(), error = %e, "Failed to process document");
                FileTestResult {
                    relative_path,
                    title,
                    counts: Counts::exception(),
                    elapsed: started.elapsed(),
                    output_relative_path: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn run_document(&self, path: &Path, output: &Path, title: &mut String) -> Result<Execution> {
        let input = charset::read_all(path, self.input_charset)?;
        title.push_str(extract_title(&input));

        let execution = self
            .executor
            .execute(&input)
            .map_err(|source| Error::Execution {
                path: path.to_path_buf(),
                source,
            })?;

        let mut writer = charset::open_writer(output, self.output_charset)?;
        writer.write_str(&execution.rendered)?;
        writer.finish()?;

        Ok(execution)
    }

    /// Matching files and all subdirectories directly below `directory`
    fn list(&self, directory: &Path) -> Listing {
        let mut listing = Listing::default();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        directory = %directory.display(),
                        error = %e,
                        "Skipping unreadable entry"
                    );
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                listing.directories.push(entry.into_path());
            } else if file_type.is_file()
                && let Some(name) = entry.file_name().to_str()
                && self.filter.matches(name)
            {
                listing.files.push(entry.into_path());
            }
        }

        listing
    }

    /// Copy the stylesheet from the source root to the output root, if present
    fn copy_stylesheet(&self) {
        let stylesheet = self.source_dir.join(STYLESHEET);
        if !stylesheet.is_file() {
            return;
        }
        match fs::copy(&stylesheet, self.output_dir.join(STYLESHEET)) {
            Ok(_) => debug!(path = %stylesheet.display(), "Copied stylesheet"),
            Err(e) => warn!(path = %stylesheet.display(), error = %e, "Failed to copy stylesheet"),
        }
    }

    /// Output path mirroring a path inside the source tree
    fn mirrored_path(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.source_dir).unwrap_or(path);
        self.output_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::ExecutionError;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    /// Counts each `pass` and `fail` marker in the document; `boom` cannot be parsed
    fn marker_executor(doc: &str) -> std::result::Result<Execution, ExecutionError> {
        if doc.contains("boom") {
            return Err(ExecutionError::Malformed("unparseable table".into()));
        }
        let right = doc.matches("pass").count() as u64;
        let wrong = doc.matches("fail").count() as u64;
        Ok(Execution {
            rendered: doc.replace("pass", "PASS").replace("fail", "FAIL"),
            counts: Counts::new(right, wrong, 0, 0),
            elapsed: Duration::from_millis(1),
        })
    }

    struct Workspace {
        _root: TempDir,
        source: PathBuf,
        output: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let root = tempdir().unwrap();
            let source = root.path().join("fit");
            let output = root.path().join("target").join("fit");
            fs::create_dir_all(&source).unwrap();
            Self {
                _root: root,
                source,
                output,
            }
        }

        fn write(&self, relative: &str, contents: &str) {
            let path = self.source.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn config(&self) -> Config {
            Config {
                source_dir: self.source.clone(),
                output_dir: self.output.clone(),
                ..Config::default()
            }
        }

        fn run(&self) -> RunOutcome {
            self.run_with(self.config())
        }

        fn run_with(&self, config: Config) -> RunOutcome {
            TestRunner::new(&config, marker_executor)
                .unwrap()
                .run()
                .unwrap()
        }

        fn summary_html(&self) -> String {
            fs::read_to_string(self.output.join(SUMMARY_FILE)).unwrap()
        }
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><title>Math Tests</title></head></html>"),
            "Math Tests"
        );
        assert_eq!(extract_title("<title>At Start</title>"), "At Start");
        assert_eq!(extract_title("<html><body>no title</body></html>"), "");
        assert_eq!(extract_title("<title>never closed"), "");
        // First occurrence wins, even inside a comment
        assert_eq!(
            extract_title("<!-- <title>Old</title> --><title>New</title>"),
            "Old"
        );
    }

    #[test]
    fn test_empty_source_directory() {
        let ws = Workspace::new();
        let outcome = ws.run();

        assert_eq!(outcome.summary.files_processed, 0);
        assert_eq!(outcome.summary.directories_processed, 1);
        assert_eq!(outcome.counts(), Counts::ZERO);
        assert!(outcome.failure_message(false).is_none());

        let html = ws.summary_html();
        assert!(html.contains("<td>files processed</td>\n<td>0</td>"));
        assert!(html.contains("<td>directories processed</td>\n<td>1</td>"));
        assert!(html.contains("0 right, 0 wrong, 0 ignored, 0 exceptions"));
    }

    #[test]
    fn test_single_passing_document() {
        let ws = Workspace::new();
        ws.write("Calc.html", "<table><tr><td>pass</td><td>pass</td></tr></table>");
        let outcome = ws.run();

        assert_eq!(outcome.counts(), Counts::new(2, 0, 0, 0));
        assert!(outcome.failure_message(false).is_none());

        let html = ws.summary_html();
        assert!(html.contains(
            "<tr><td><a href='Calc.html'>Calc.html</a></td>\
             <td bgcolor='#cfffcf' class='number'>2</td>\
             <td bgcolor='#cfffcf' class='number'>0</td>"
        ));

        let rendered = fs::read_to_string(ws.output.join("Calc.html")).unwrap();
        assert_eq!(rendered, "<table><tr><td>PASS</td><td>PASS</td></tr></table>");
    }

    #[test]
    fn test_wrong_result_and_execution_error() {
        let ws = Workspace::new();
        ws.write("a.html", "<td>pass</td><td>fail</td>");
        ws.write("sub/broken.html", "<td>boom</td>");
        ws.write("sub/z.html", "<td>pass</td>");
        let outcome = ws.run();

        assert_eq!(outcome.counts(), Counts::new(2, 1, 1, 0));
        let message = outcome.failure_message(false).unwrap();
        assert!(message.contains("1 wrong"));
        assert!(message.contains("1 exceptions"));
        assert!(outcome.failure_message(true).is_none());

        let sub = &outcome.directories[1];
        assert_eq!(sub.path, ws.source.join("sub"));
        assert_eq!(sub.file_results[0].counts, Counts::exception());
        assert!(sub.file_results[0].is_failed());
        // The sibling after the broken document still ran
        assert_eq!(sub.file_results[1].counts, Counts::new(1, 0, 0, 0));
        assert_eq!(outcome.failed_files().count(), 1);

        assert!(!ws.output.join("sub").join("broken.html").exists());
        assert!(ws.output.join("sub").join("z.html").exists());
    }

    #[test]
    fn test_titles_become_descriptions() {
        let ws = Workspace::new();
        ws.write("a.html", "<html><head><title>Math Tests</title></head><td>pass</td></html>");
        ws.write("b.html", "<html><td>pass</td></html>");
        let outcome = ws.run();

        let root = &outcome.directories[0];
        assert_eq!(root.file_results[0].title, "Math Tests");
        assert_eq!(root.file_results[1].title, "");

        let html = ws.summary_html();
        assert!(html.contains("<td>Math Tests</td></tr>"));
        assert!(html.contains("b.html</a></td>"));
    }

    #[test]
    fn test_nested_directories_aggregate() {
        let ws = Workspace::new();
        ws.write("one.html", "pass");
        ws.write("l1/two.html", "pass pass");
        ws.write("l1/l2/three.html", "pass pass pass");
        let outcome = ws.run();

        assert_eq!(outcome.summary.directories_processed, 3);
        assert_eq!(outcome.summary.files_processed, 3);
        assert_eq!(outcome.counts(), Counts::new(6, 0, 0, 0));
        assert!(outcome.directories.iter().all(|d| d.is_consistent()));

        let paths: Vec<_> = outcome.directories.iter().map(|d| d.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                ws.source.clone(),
                ws.source.join("l1"),
                ws.source.join("l1").join("l2"),
            ]
        );
        assert_eq!(outcome.directories[1].aggregate, Counts::new(5, 0, 0, 0));
        assert_eq!(
            outcome.directories[0].subdirectory_totals,
            vec![("l1".to_string(), Counts::new(5, 0, 0, 0))]
        );
    }

    #[test]
    fn test_directory_rows_are_streamed_in_order() {
        let ws = Workspace::new();
        ws.write("b.html", "pass");
        ws.write("a.html", "pass");
        ws.write("sub/c.html", "fail");
        ws.run();

        let html = ws.summary_html();
        let root_header = html.find("<tr class='highlight'>").unwrap();
        let a = html.find(">a.html</a>").unwrap();
        let b = html.find(">b.html</a>").unwrap();
        let root_summary = html.find("<strong>Summary</strong>").unwrap();
        let sub_header = html.rfind("<tr class='highlight'>").unwrap();
        let c = html.find(">sub/c.html</a>").unwrap();

        assert!(root_header < a && a < b && b < root_summary);
        assert!(root_summary < sub_header && sub_header < c);
    }

    #[test]
    fn test_reruns_are_deterministic() {
        let ws = Workspace::new();
        for name in ["m.html", "c.html", "x.html", "a/b.html", "a/a.html", "b/z.html"] {
            ws.write(name, "pass");
        }

        let strip_timings = |html: String| -> Vec<String> {
            html.lines()
                .filter(|l| l.starts_with("<tr><td>") || l.starts_with("<tr class="))
                .map(|l| l.split("<td>0:").next().unwrap_or(l).to_string())
                .collect()
        };

        let mut config = ws.config();
        config.threads = 4;
        ws.run_with(config.clone());
        let first = strip_timings(ws.summary_html());
        ws.run_with(config);
        let second = strip_timings(ws.summary_html());

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_include_pattern_and_case_sensitivity() {
        let ws = Workspace::new();
        ws.write("a.html", "pass");
        ws.write("B.HTML", "pass");
        ws.write("notes.txt", "pass");

        let outcome = ws.run();
        assert_eq!(outcome.summary.files_processed, 1);

        let mut config = ws.config();
        config.case_sensitive = false;
        let outcome = ws.run_with(config);
        assert_eq!(outcome.summary.files_processed, 2);
    }

    #[test]
    fn test_charsets_on_both_sides() {
        let ws = Workspace::new();
        fs::write(
            ws.source.join("latin.html"),
            b"<title>Caf\xe9</title><td>pass</td>",
        )
        .unwrap();

        let mut config = ws.config();
        config.source_encoding = "ISO-8859-1".into();
        config.output_encoding = "UTF-8".into();
        let outcome = ws.run_with(config);
        assert_eq!(outcome.counts(), Counts::new(1, 0, 0, 0));

        let rendered = fs::read(ws.output.join("latin.html")).unwrap();
        assert_eq!(String::from_utf8(rendered).unwrap(), "<title>Café</title><td>PASS</td>");
        assert!(ws.summary_html().contains("<td>Café</td></tr>"));
    }

    #[test]
    fn test_undecodable_document_is_one_exception() {
        let ws = Workspace::new();
        fs::write(ws.source.join("bad.html"), b"pass \xff\xfe").unwrap();
        ws.write("good.html", "pass");

        let outcome = ws.run();
        assert_eq!(outcome.counts(), Counts::new(1, 0, 1, 0));
    }

    #[test]
    fn test_unencodable_output_is_one_exception() {
        let ws = Workspace::new();
        ws.write("snow.html", "pass \u{2603}");
        ws.write("plain.html", "pass");

        let mut config = ws.config();
        config.output_encoding = "ISO-8859-1".into();
        let outcome = ws.run_with(config);

        assert_eq!(outcome.counts(), Counts::new(1, 0, 1, 0));
        let html = fs::read(ws.output.join(SUMMARY_FILE)).unwrap();
        assert!(
            encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(&html)
                .is_some()
        );
    }

    #[test]
    fn test_unencodable_title_and_name_keep_the_run_going() {
        let ws = Workspace::new();
        ws.write("a.html", "<title>snow \u{2603}</title>pass");
        ws.write("\u{65e5}\u{672c}.html", "pass");
        ws.write("b.html", "pass");
        ws.write("z/c.html", "pass");

        let mut config = ws.config();
        config.output_encoding = "ISO-8859-1".into();
        let outcome = TestRunner::new(&config, marker_executor)
            .unwrap()
            .run()
            .unwrap();

        // a.html itself cannot be rendered under Latin-1; everything else can
        assert_eq!(outcome.counts(), Counts::new(3, 0, 1, 0));
        assert_eq!(outcome.summary.files_processed, 4);

        let bytes = fs::read(ws.output.join(SUMMARY_FILE)).unwrap();
        let (html, _, malformed) = encoding_rs::WINDOWS_1252.decode(&bytes);
        assert!(!malformed);
        assert!(html.contains("<td>snow &#9731;</td></tr>"));
        assert!(html.contains(">&#26085;&#26412;.html</a>"));
        assert!(html.contains(">b.html</a>"));
        assert!(html.contains(">z/c.html</a>"));
        assert!(html.contains("<td colspan='2'>fit.Summary</td>"));
    }

    #[test]
    fn test_failure_in_one_directory_does_not_stop_the_next() {
        let ws = Workspace::new();
        ws.write("a/broken.html", "boom");
        ws.write("b/good.html", "pass");

        let outcome = ws.run();
        assert_eq!(outcome.counts(), Counts::new(1, 0, 1, 0));
        assert_eq!(outcome.summary.directories_processed, 3);

        let b = &outcome.directories[2];
        assert_eq!(b.path, ws.source.join("b"));
        assert_eq!(b.aggregate, Counts::new(1, 0, 0, 0));
        assert!(ws.output.join("b").join("good.html").exists());
        assert!(ws.summary_html().contains(">b/good.html</a>"));
    }

    /// Rejects every write
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_report_stream_failure_is_fatal() {
        let ws = Workspace::new();
        ws.write("a.html", "pass");
        let runner = TestRunner::new(&ws.config(), marker_executor).unwrap();

        let mut report = ReportWriter::new(charset::CharsetWriter::new(
            BrokenSink,
            Charset::UTF_8,
            SUMMARY_FILE,
        ));
        let mut directories = Vec::new();
        let err = runner
            .process_directory(&ws.source, &mut report, &mut directories)
            .unwrap_err();

        assert!(matches!(err, Error::FileIo { .. }));
        assert!(directories.is_empty());
    }

    #[test]
    fn test_stylesheet_is_copied() {
        let ws = Workspace::new();
        ws.write(STYLESHEET, ".pass { color: green }");
        let outcome = ws.run();

        assert_eq!(outcome.summary.files_processed, 0);
        assert_eq!(
            fs::read_to_string(ws.output.join(STYLESHEET)).unwrap(),
            ".pass { color: green }"
        );
    }

    #[test]
    fn test_missing_source_directory() {
        let ws = Workspace::new();
        let mut config = ws.config();
        config.source_dir = ws.source.join("missing");

        let err = TestRunner::new(&config, marker_executor)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!ws.output.join(SUMMARY_FILE).exists());
    }
}
