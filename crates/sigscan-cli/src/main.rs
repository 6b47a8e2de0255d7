//! sigscan - Scan a directory tree for files carrying known byte signatures
//!
//! Every regular file below the root is streamed through the signature
//! matcher. Matches are printed to stdout, per-entry failures to stderr.
//!
//! Exit codes: `0` when the scan completes, `1` on a fatal error (unreadable
//! root, bad signature definitions), `2` when `--fail-on-match` is given and
//! something matched.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use sigscan_core::{
    MatchResult, Reporter, ScanSummary, ScanTarget, Scanner, ScannerConfig, SignatureSet,
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PATH_LEN,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Exit code for a completed scan that matched with `--fail-on-match`
const EXIT_MATCHED: u8 = 2;

/// Scan a directory tree for files carrying known byte signatures
#[derive(Parser, Debug)]
#[command(name = "sigscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory (or single file) to scan
    #[arg(default_value = ".")]
    root: PathBuf,

    /// TOML signature definitions; the built-in MZ/ELF/ZIP set is used if omitted
    #[arg(short, long, env = "SIGSCAN_SIGNATURES")]
    signatures: Option<PathBuf>,

    /// Bytes read per chunk (must be at least the longest signature)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Longest path, in bytes, that is opened or descended into
    #[arg(long, default_value_t = DEFAULT_MAX_PATH_LEN)]
    max_path_len: usize,

    /// Number of scanning threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Visit directory entries in file name order
    #[arg(long)]
    sorted: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Exit with status 2 if any file matched
    #[arg(long)]
    fail_on_match: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Output format for scan events
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human readable lines with start and completion banners
    Text,
    /// One JSON object per event, then a summary object
    Json,
}

/// Renders events as plain text
struct TextReporter<O: Write, E: Write> {
    out: O,
    err: E,
    failure: Option<io::Error>,
}

impl<O: Write, E: Write> TextReporter<O, E> {
    fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            failure: None,
        }
    }

    fn finish(mut self) -> io::Result<()> {
        match self.failure.take() {
            Some(e) => Err(e),
            None => self.out.flush(),
        }
    }
}

impl<O: Write, E: Write> Reporter for TextReporter<O, E> {
    fn on_result(&mut self, path: &Path, result: &MatchResult) {
        let written = match result {
            MatchResult::Matched(_) => writeln!(self.out, "Malware found: {}", path.display()),
            MatchResult::Error(e) => writeln!(self.err, "Error: {}: {}", path.display(), e),
            MatchResult::Clean => Ok(()),
        };
        if let Err(e) = written {
            self.failure.get_or_insert(e);
        }
    }

    fn on_skipped(&mut self, target: &ScanTarget) {
        debug!("Skipped non-regular entry: {}", target.path.display());
    }
}

/// A single JSON Lines record
#[derive(Serialize)]
struct Record<'a> {
    path: String,
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Record<'a> {
    fn new(path: &Path, result: &'static str) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            result,
            signature: None,
            offset: None,
            error_kind: None,
            error: None,
        }
    }
}

/// Renders events as JSON Lines
struct JsonReporter<O: Write> {
    out: O,
    failure: Option<io::Error>,
}

impl<O: Write> JsonReporter<O> {
    fn new(out: O) -> Self {
        Self { out, failure: None }
    }

    fn emit<T: Serialize>(&mut self, value: &T) {
        let written = serde_json::to_writer(&mut self.out, value)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(e) = written {
            self.failure.get_or_insert(e);
        }
    }

    fn finish(mut self, summary: &ScanSummary) -> io::Result<()> {
        self.emit(&serde_json::json!({ "summary": summary }));
        match self.failure.take() {
            Some(e) => Err(e),
            None => self.out.flush(),
        }
    }
}

impl<O: Write> Reporter for JsonReporter<O> {
    fn on_result(&mut self, path: &Path, result: &MatchResult) {
        let mut record = Record::new(path, result.label());
        match result {
            MatchResult::Matched(m) => {
                record.signature = Some(m.name.as_str());
                record.offset = Some(m.offset);
            }
            MatchResult::Error(e) => {
                record.error_kind = Some(e.kind().as_str());
                record.error = Some(e.to_string());
            }
            MatchResult::Clean => {}
        }
        self.emit(&record);
    }

    fn on_skipped(&mut self, target: &ScanTarget) {
        self.emit(&Record::new(&target.path, "skipped"));
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let code = run(&cli, io::stdout().lock(), io::stderr())?;
    Ok(ExitCode::from(code))
}

/// Loads signatures, scans, renders; returns the process exit code
fn run(cli: &Cli, out: impl Write, err: impl Write) -> Result<u8> {
    let signatures = match &cli.signatures {
        Some(path) => SignatureSet::load(path)
            .with_context(|| format!("Failed to load signatures: {}", path.display()))?,
        None => SignatureSet::builtin(),
    };
    info!("Loaded {} signature(s)", signatures.len());

    let jobs = if cli.jobs == 0 { num_cpus::get() } else { cli.jobs };
    let config = ScannerConfig::new()
        .chunk_size(cli.chunk_size)
        .max_path_len(cli.max_path_len)
        .sorted(cli.sorted)
        .jobs(jobs);
    let scanner = Scanner::with_config(signatures, config)
        .context("Invalid scanner configuration")?;

    let summary = match cli.format {
        OutputFormat::Text => {
            let mut reporter = TextReporter::new(out, err);
            writeln!(reporter.out, "Starting antivirus scan...")?;
            let summary = scan(&scanner, &cli.root, &mut reporter)?;
            writeln!(reporter.out, "Scan completed.")?;
            reporter.finish().context("Failed to write scan output")?;
            summary
        }
        OutputFormat::Json => {
            let mut reporter = JsonReporter::new(out);
            let summary = scan(&scanner, &cli.root, &mut reporter)?;
            reporter
                .finish(&summary)
                .context("Failed to write scan output")?;
            summary
        }
    };

    info!(
        "Summary: {} scanned, {} matched, {} clean, {} errors, {} skipped",
        summary.files_scanned, summary.matched, summary.clean, summary.errors, summary.skipped
    );

    if cli.fail_on_match && summary.has_matches() {
        Ok(EXIT_MATCHED)
    } else {
        Ok(0)
    }
}

fn scan(scanner: &Scanner, root: &Path, reporter: &mut dyn Reporter) -> Result<ScanSummary> {
    info!("Scanning {}", root.display());
    scanner
        .scan_tree(root, reporter)
        .with_context(|| format!("Failed to scan {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigscan_core::{ScanError, SignatureMatch};
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sigscan").chain(args.iter().copied())).unwrap()
    }

    fn infected_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("clean.txt"), b"hello").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/payload"), b"\x00\x00MZ\x90\x00\xFF").unwrap();
        temp
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cli.max_path_len, DEFAULT_MAX_PATH_LEN);
        assert_eq!(cli.jobs, 1);
        assert!(!cli.fail_on_match);
    }

    #[test]
    fn test_text_reporter() {
        let mut reporter = TextReporter::new(Vec::new(), Vec::new());
        reporter.on_result(
            Path::new("/tmp/evil.exe"),
            &MatchResult::Matched(SignatureMatch {
                index: 0,
                name: "pe-mz".into(),
                offset: 0,
            }),
        );
        reporter.on_result(Path::new("/tmp/fine.txt"), &MatchResult::Clean);
        reporter.on_result(
            Path::new("/tmp/deep"),
            &MatchResult::Error(ScanError::PathTooLong { len: 5000, max: 4096 }),
        );

        let out = String::from_utf8(reporter.out.clone()).unwrap();
        let err = String::from_utf8(reporter.err.clone()).unwrap();
        assert_eq!(out, "Malware found: /tmp/evil.exe\n");
        assert!(err.starts_with("Error: /tmp/deep: path is 5000 bytes long"));
        assert!(reporter.finish().is_ok());
    }

    #[test]
    fn test_json_reporter() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_result(
            Path::new("a.zip"),
            &MatchResult::Matched(SignatureMatch {
                index: 2,
                name: "zip".into(),
                offset: 7,
            }),
        );
        reporter.on_result(Path::new("b.txt"), &MatchResult::Clean);

        let lines: Vec<serde_json::Value> = String::from_utf8(reporter.out.clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            lines[0],
            serde_json::json!({"path": "a.zip", "result": "matched", "signature": "zip", "offset": 7})
        );
        assert_eq!(lines[1], serde_json::json!({"path": "b.txt", "result": "clean"}));
    }

    #[test]
    fn test_run_text() {
        let tree = infected_tree();
        let root = tree.path().to_str().unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let code = run(&cli(&[root]), &mut out, &mut err).unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(code, 0);
        assert_eq!(lines.first(), Some(&"Starting antivirus scan..."));
        assert_eq!(lines.last(), Some(&"Scan completed."));
        assert_eq!(
            lines[1],
            format!("Malware found: {}", tree.path().join("sub/payload").display())
        );
        assert_eq!(lines.len(), 3);
        assert!(err.is_empty());
    }

    #[test]
    fn test_run_fail_on_match() {
        let tree = infected_tree();
        let root = tree.path().to_str().unwrap();
        let code = run(
            &cli(&[root, "--fail-on-match", "--jobs", "2", "--format", "json"]),
            io::sink(),
            io::sink(),
        )
        .unwrap();
        assert_eq!(code, EXIT_MATCHED);
    }

    #[test]
    fn test_run_json_summary() {
        let tree = infected_tree();
        let root = tree.path().to_str().unwrap();
        let mut out = Vec::new();

        run(&cli(&[root, "--format", "json", "--sorted"]), &mut out, io::sink()).unwrap();

        let last: serde_json::Value = String::from_utf8(out)
            .unwrap()
            .lines()
            .last()
            .map(|l| serde_json::from_str(l).unwrap())
            .unwrap();
        assert_eq!(last["summary"]["files_scanned"], 2);
        assert_eq!(last["summary"]["matched"], 1);
    }

    #[test]
    fn test_run_custom_signatures() {
        let tree = infected_tree();
        let defs = tree.path().join("sigs.toml");
        fs::write(&defs, "[[signature]]\nname = \"greeting\"\nhex = \"68656C6C6F\"\n").unwrap();

        let mut out = Vec::new();
        let code = run(
            &cli(&[
                tree.path().to_str().unwrap(),
                "--signatures",
                defs.to_str().unwrap(),
                "--fail-on-match",
            ]),
            &mut out,
            io::sink(),
        )
        .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(code, EXIT_MATCHED);
        assert!(out.contains("clean.txt"));
        assert!(!out.contains("payload"));
    }

    #[test]
    fn test_run_missing_root_is_fatal() {
        let tree = TempDir::new().unwrap();
        let missing = tree.path().join("gone");
        let result = run(&cli(&[missing.to_str().unwrap()]), io::sink(), io::sink());
        assert!(result.is_err());
    }

    #[test]
    fn test_run_rejects_tiny_chunk() {
        let tree = infected_tree();
        let result = run(
            &cli(&[tree.path().to_str().unwrap(), "--chunk-size", "2"]),
            io::sink(),
            io::sink(),
        );
        assert!(result.is_err());
    }
}
