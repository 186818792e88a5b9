use clap::{ArgAction, Args, Parser, Subcommand};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use arcwalk::config::{IteratorOptions, ReaderOptions};
use arcwalk::filter::parse_status_range;
use arcwalk::iterator::{ErrorGuard, ErrorPolicy, RecordEnvelope, RecordIterator};
use arcwalk::timestamp::to_date14;
use arcwalk::{ArcFileReader, NedlibReader, RecordFilter, RecordSource, RecordType};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "arcwalk", version, about = "Inspect ARC web archive files")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records, one line each
    Ls {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        select: Selection,
    },
    /// Print the header block and/or payload of records
    Cat {
        file: PathBuf,
        /// Print the record header block
        #[arg(short = 'w', long)]
        header: bool,
        /// Print the record payload
        #[arg(short = 'P', long)]
        payload: bool,
        #[command(flatten)]
        select: Selection,
    },
}

#[derive(Args, Default)]
struct Selection {
    /// Only the nth record (1-based); overrides --limit
    #[arg(short, long, default_value = "0")]
    nth: usize,
    /// At most this many records
    #[arg(short, long, default_value = "0")]
    limit: usize,
    /// Byte offset to start reading at
    #[arg(short, long, default_value = "0")]
    offset: u64,
    /// Record types to keep: warcinfo, response, resource, ...
    #[arg(short = 't', long = "record-type")]
    record_types: Vec<String>,
    /// Record ids to keep
    #[arg(long = "id")]
    ids: Vec<String>,
    /// Content-type substrings to keep
    #[arg(long)]
    mime: Vec<String>,
    /// HTTP status codes to keep: 200, 200-300 (end exclusive), 500-, -400
    #[arg(short = 'S', long = "response-code")]
    response_code: Option<String>,
    /// Keep going after errors while they move forward through the file
    #[arg(long)]
    force: bool,
    /// Report a cut-off last record as an error
    #[arg(long)]
    strict_truncation: bool,
}

impl Selection {
    fn filter(&self) -> CliResult<RecordFilter> {
        let types = self
            .record_types
            .iter()
            .map(|t| RecordType::try_from(t.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut filter = RecordFilter::new()
            .with_ids(&self.ids)
            .with_record_types(&types)
            .with_content_types(&self.mime);
        if let Some(codes) = &self.response_code {
            filter = filter.with_status_range(parse_status_range(codes)?);
        }
        Ok(filter)
    }

    fn iterator_options(&self) -> IteratorOptions {
        IteratorOptions::new(self.nth, self.limit)
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            start_offset:      self.offset,
            report_truncation: self.strict_truncation,
            ..ReaderOptions::default()
        }
    }

    fn error_policy(&self) -> ErrorPolicy {
        if self.force { ErrorPolicy::Force } else { ErrorPolicy::Abort }
    }
}

#[derive(Serialize)]
struct LsLine<'a> {
    file:         &'a str,
    offset:       i64,
    size:         i64,
    record_type:  &'static str,
    record_id:    Option<&'a str>,
    date:         Option<String>,
    content_type: Option<&'a str>,
    target_uri:   Option<&'a str>,
    validation:   Vec<&'a str>,
}

fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut out = io::BufWriter::new(io::stdout().lock());
    let mut failed = false;
    match cli.command {

        // ── Ls ───────────────────────────────────────────────────────────────
        Commands::Ls { files, json, select } => {
            for path in &files {
                let name = path.display().to_string();
                failed |= walk(path, &select, |env| {
                    if json {
                        let line = LsLine {
                            file:         &name,
                            offset:       env.offset,
                            size:         env.size,
                            record_type:  env.record.record_type().as_str(),
                            record_id:    env.record.record_id(),
                            date:         env.record.date().map(|d| d.to_rfc3339()),
                            content_type: env.record.content_type(),
                            target_uri:   env.record.target_uri(),
                            validation:   env.validation.iter().collect(),
                        };
                        serde_json::to_writer(&mut out, &line)?;
                        writeln!(out)?;
                    } else {
                        let date = env.record.date().map(|d| to_date14(&d)).unwrap_or_else(|| "-".into());
                        writeln!(
                            out,
                            "{:>12} {:>9}  {:<9} {} {:<34} {}",
                            env.offset,
                            env.size,
                            env.record.record_type().as_str(),
                            date,
                            env.record.content_type().unwrap_or("-"),
                            env.record.target_uri().unwrap_or("-"),
                        )?;
                    }
                    Ok(())
                })?;
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { file, header, payload, select } => {
            let (header, payload) = if header || payload { (header, payload) } else { (true, true) };
            failed = walk(&file, &select, |env| {
                if header {
                    env.record.headers().write(&mut out)?;
                    out.write_all(b"\r\n")?;
                }
                if payload {
                    out.write_all(env.record.content())?;
                    out.write_all(b"\r\n\r\n")?;
                }
                Ok(())
            })?;
        }
    }
    out.flush()?;

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Iterate the selected records of `path`; returns whether any error was
/// reported.  A file that cannot be opened is reported, not returned.
fn walk<F>(path: &Path, select: &Selection, mut visit: F) -> CliResult<bool>
where
    F: FnMut(&RecordEnvelope) -> CliResult<()>,
{
    let filter = select.filter()?;
    let source = match open_source(path, select) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return Ok(true);
        }
    };
    let mut guard = ErrorGuard::new(select.error_policy());
    let mut failed = false;

    let records = RecordIterator::with_filter(source, filter.predicate(), select.iterator_options());
    for item in records {
        match item {
            Ok(env) => visit(&env)?,
            Err(err) => {
                failed = true;
                eprintln!("{}: {err}", path.display());
                if !guard.proceed(&err) {
                    break;
                }
            }
        }
    }
    Ok(failed)
}

fn open_source(path: &Path, select: &Selection) -> CliResult<Box<dyn RecordSource>> {
    if NedlibReader::is_snapshot_meta(path) {
        let modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();
        return Ok(Box::new(NedlibReader::new(path, modified)));
    }
    Ok(Box::new(ArcFileReader::open(path, select.reader_options())?))
}
