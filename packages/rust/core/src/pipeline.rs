//! End-to-end runs: search results → (paced details) → framed output.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, instrument};

use zivi_records::{
    DetailRecord, PUBLISHED_HEADER, SearchHit, cells_for, to_row, union_columns,
    write_record_cards,
};
use zivi_shared::{OutputFormat, PacingConfig, Result, RowConfig, ZiviError};

use crate::assembler::{
    DETAILS_CHANNEL, Frame, Layout, Position, SEARCH_CHANNEL, Unit, document_close,
    document_member, document_open,
};
use crate::sequencer::{DetailSource, PacedFetcher};
use crate::sink::Sink;

/// Settings of one run, merged from config and CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Output encoding.
    pub format: OutputFormat,
    /// Row transform settings (language, country fallback).
    pub row: RowConfig,
    /// Pacing of detail fetches.
    pub pacing: PacingConfig,
    /// Fetch the detail record of every search hit.
    pub scrape: bool,
    /// Directory for contact and organisation cards.
    pub card_dir: Option<PathBuf>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Search hits written.
    pub hits: usize,
    /// Detail records written.
    pub details: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each detail record has been written.
    fn detail_written(&self, title: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn detail_written(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Write `hits` and, when scraping, the detail record of each hit.
///
/// Output shape by encoding and sink:
/// - JSON stream: the hit array, or `{"results": [...], "details": [...]}`
///   when scraping
/// - JSON directory: `search.json` plus one `<id>.json` per detail
/// - CSV stream: the flattened hit table, or only the details table when
///   scraping
/// - CSV directory: `search.csv` and `details.csv`
///
/// A failed fetch aborts the run. Output written so far stays as is, so an
/// aborted JSON stream lacks its closing brackets.
#[instrument(skip_all, fields(hits = hits.len(), format = %options.format, scrape = options.scrape))]
pub async fn run_search<S: DetailSource>(
    hits: &[SearchHit],
    source: &S,
    options: &RunOptions,
    sink: &mut Sink,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();
    let layout = sink.layout();
    let in_document =
        options.scrape && options.format == OutputFormat::Json && layout == Layout::Stream;

    // Resolve every id before the first byte goes out.
    let ids = if options.scrape {
        hits.iter().map(SearchHit::id).collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    info!(hits = hits.len(), ?layout, "writing search results");
    progress.phase("Writing search results");

    if in_document {
        sink.write(&document_open("results"))?;
    }
    write_search_channel(hits, options, layout, in_document, sink)?;

    let mut details = 0;
    if options.scrape {
        if in_document {
            sink.write(&document_member("details"))?;
        }
        progress.phase("Fetching details");
        let frame = details_frame(options.format, layout).nested(usize::from(in_document));
        let mut fetcher = PacedFetcher::new(source, ids, options.pacing);
        let mut writer = DetailsWriter::open(frame, fetcher.remaining(), sink)?;
        while let Some(item) = fetcher.next().await {
            let (id, record) = item?;
            let unit = detail_unit(id.to_string(), record, options)?;
            writer.write(&unit, sink, progress)?;
        }
        details = writer.finish(sink)?;
        if in_document {
            sink.write(&document_close())?;
        }
    }

    let summary = RunSummary {
        hits: hits.len(),
        details,
        elapsed: start.elapsed(),
    };
    progress.done(&summary);

    info!(
        hits = summary.hits,
        details = summary.details,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "search run complete"
    );

    Ok(summary)
}

/// Look up one record and write it as a self-contained document.
#[instrument(skip_all, fields(id = id, format = %options.format))]
pub async fn run_details<S: DetailSource>(
    id: u64,
    source: &S,
    options: &RunOptions,
    sink: &mut Sink,
) -> Result<RunSummary> {
    let start = Instant::now();
    let record = source.fetch_detail(id).await?;

    let unit = detail_unit(id.to_string(), record, options)?;
    let mut frame = details_frame(options.format, sink.layout());
    sink.write(&frame.emit(&unit, Position::Standalone)?)?;

    info!(id, "detail written");
    Ok(RunSummary {
        hits: 0,
        details: 1,
        elapsed: start.elapsed(),
    })
}

/// Write previously saved detail records (JSON files) as the details channel.
///
/// Each file is read when its turn comes, so output starts before the last
/// file is loaded.
#[instrument(skip_all, fields(files = paths.len(), format = %options.format))]
pub fn run_convert(
    paths: &[PathBuf],
    options: &RunOptions,
    sink: &mut Sink,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();
    progress.phase("Converting records");

    let frame = details_frame(options.format, sink.layout());
    let mut writer = DetailsWriter::open(frame, paths.len(), sink)?;
    for path in paths {
        let record = read_record(path)?;
        let title = record
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| file_title(path));
        let unit = detail_unit(title, record, options)?;
        writer.write(&unit, sink, progress)?;
    }
    let details = writer.finish(sink)?;

    let summary = RunSummary {
        hits: 0,
        details,
        elapsed: start.elapsed(),
    };
    progress.done(&summary);
    info!(details, "conversion complete");
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

fn write_search_channel(
    hits: &[SearchHit],
    options: &RunOptions,
    layout: Layout,
    nested: bool,
    sink: &mut Sink,
) -> Result<()> {
    let titles = hits.iter().enumerate().map(|(i, hit)| hit_title(hit, i));

    match (options.format, layout) {
        (OutputFormat::Json, Layout::Directory) => {
            let all = hits.iter().map(|hit| Value::Object(hit.as_map().clone())).collect();
            let mut frame = Frame::new(SEARCH_CHANNEL, OutputFormat::Json, layout);
            let unit = Unit::document(SEARCH_CHANNEL, Value::Array(all));
            sink.write(&frame.emit(&unit, Position::Standalone)?)
        }
        (OutputFormat::Json, Layout::Stream) => {
            let frame =
                Frame::new(SEARCH_CHANNEL, OutputFormat::Json, layout).nested(usize::from(nested));
            let units = hits
                .iter()
                .zip(titles)
                .map(|(hit, title)| Unit::document(title, Value::Object(hit.as_map().clone())));
            emit_sequence(frame, units, hits.len(), sink)
        }
        (OutputFormat::Csv, Layout::Stream) if options.scrape => {
            debug!("search table left out; the stream carries the details table");
            Ok(())
        }
        (OutputFormat::Csv, _) => {
            let columns = union_columns(hits.iter().map(SearchHit::as_map));
            let frame =
                Frame::new(SEARCH_CHANNEL, OutputFormat::Csv, layout).with_header(columns.clone());
            let units = hits
                .iter()
                .zip(titles)
                .map(|(hit, title)| Unit::row(title, cells_for(&columns, hit.as_map())));
            emit_sequence(frame, units, hits.len(), sink)
        }
    }
}

fn emit_sequence(
    mut frame: Frame,
    units: impl Iterator<Item = Unit>,
    len: usize,
    sink: &mut Sink,
) -> Result<()> {
    sink.write_all(frame.open()?)?;
    for (i, unit) in units.enumerate() {
        sink.write(&frame.emit(&unit, Position::of(i, len))?)?;
    }
    sink.write_all(frame.close()?)
}

/// The details channel, fed one unit at a time as records arrive.
struct DetailsWriter {
    frame: Frame,
    total: usize,
}

impl DetailsWriter {
    fn open(mut frame: Frame, total: usize, sink: &mut Sink) -> Result<Self> {
        sink.write_all(frame.open()?)?;
        Ok(Self { frame, total })
    }

    fn write(
        &mut self,
        unit: &Unit,
        sink: &mut Sink,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let index = self.frame.items();
        sink.write(&self.frame.emit(unit, Position::of(index, self.total))?)?;
        progress.detail_written(&unit.title, index + 1, self.total);
        Ok(())
    }

    /// Close the channel and return the number of units written.
    fn finish(mut self, sink: &mut Sink) -> Result<usize> {
        sink.write_all(self.frame.close()?)?;
        Ok(self.frame.items())
    }
}

fn details_frame(format: OutputFormat, layout: Layout) -> Frame {
    let frame = Frame::new(DETAILS_CHANNEL, format, layout);
    match format {
        OutputFormat::Csv => frame.with_header(PUBLISHED_HEADER),
        OutputFormat::Json => frame,
    }
}

/// Turn a record into its unit: the table row for CSV, the raw record for JSON.
///
/// Cards are written either way when a card directory is set.
fn detail_unit(title: String, record: DetailRecord, options: &RunOptions) -> Result<Unit> {
    let card_dir = options.card_dir.as_deref();
    match options.format {
        OutputFormat::Csv => {
            let row = to_row(&record, &options.row, card_dir)?;
            Ok(Unit::row(title, row.into_cells()))
        }
        OutputFormat::Json => {
            if let Some(dir) = card_dir {
                write_record_cards(&record, &options.row, dir)?;
            }
            Ok(Unit::document(title, record.into_value()))
        }
    }
}

fn hit_title(hit: &SearchHit, index: usize) -> String {
    hit.id()
        .map(|id| id.to_string())
        .unwrap_or_else(|_| index.to_string())
}

fn read_record(path: &Path) -> Result<DetailRecord> {
    let content = std::fs::read_to_string(path).map_err(|e| ZiviError::io(path, e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| ZiviError::format(format!("{}: invalid JSON: {e}", path.display())))?;
    DetailRecord::from_value(value)
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::testing::MemorySource;
    use crate::sink::SinkMode;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;
    use zivi_shared::{AppConfig, Locale};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("zivi-pipeline-test-{}", Uuid::now_v7()))
    }

    fn options(format: OutputFormat, scrape: bool) -> RunOptions {
        RunOptions {
            format,
            row: RowConfig::new(&AppConfig::default(), Locale::DeCh),
            pacing: PacingConfig {
                min_interval: Duration::ZERO,
                fluctuation: Duration::ZERO,
            },
            scrape,
            card_dir: None,
        }
    }

    fn hits(ids: &[u64]) -> Vec<SearchHit> {
        ids.iter()
            .map(|&id| {
                SearchHit::from_value(json!({
                    "id": id,
                    "eibName": format!("Betrieb {id}"),
                    "ort": { "plz": format!("{id}000") }
                }))
                .unwrap()
            })
            .collect()
    }

    fn source(ids: &[u64]) -> MemorySource {
        MemorySource::new(ids.iter().map(|&id| {
            (
                id,
                json!({
                    "id": id,
                    "eibNummer": format!("E-{id}"),
                    "eibName": format!("Betrieb {id}"),
                    "eibAdresse": { "plz": format!("{id}000") },
                    "kontaktPersonVorname": "Anna",
                    "kontaktPersonName": format!("Muster{id}")
                }),
            )
        }))
    }

    fn stdout_sink() -> (Sink, SharedBuf) {
        let buf = SharedBuf::default();
        (Sink::with_stdout(SinkMode::Stdout, Box::new(buf.clone())), buf)
    }

    #[tokio::test]
    async fn json_stream_is_valid_for_0_1_n_hits() {
        for ids in [&[][..], &[1][..], &[1, 2, 3][..]] {
            let (mut sink, buf) = stdout_sink();
            let src = source(ids);
            let summary = run_search(
                &hits(ids),
                &src,
                &options(OutputFormat::Json, false),
                &mut sink,
                &SilentProgress,
            )
            .await
            .unwrap();

            let parsed: Value = serde_json::from_str(&buf.text()).unwrap();
            assert_eq!(parsed.as_array().unwrap().len(), ids.len());
            assert_eq!(summary.hits, ids.len());
            assert_eq!(summary.details, 0);
            assert!(src.fetched_ids().is_empty());
        }
    }

    #[tokio::test]
    async fn json_stream_scrape_is_one_document() {
        for ids in [&[][..], &[7][..], &[3, 1, 2][..]] {
            let (mut sink, buf) = stdout_sink();
            let src = source(ids);
            run_search(
                &hits(ids),
                &src,
                &options(OutputFormat::Json, true),
                &mut sink,
                &SilentProgress,
            )
            .await
            .unwrap();

            let parsed: Value = serde_json::from_str(&buf.text()).unwrap();
            assert_eq!(parsed["results"].as_array().unwrap().len(), ids.len());
            let detail_ids: Vec<u64> = parsed["details"]
                .as_array()
                .unwrap()
                .iter()
                .map(|d| d["id"].as_u64().unwrap())
                .collect();
            assert_eq!(detail_ids, ids);
        }
    }

    #[tokio::test]
    async fn directory_csv_scrape_writes_one_details_table() {
        let dir = temp_dir();
        let ids = [5, 3, 8];
        let mut sink = Sink::new(SinkMode::Directory(dir.clone()));
        let summary = run_search(
            &hits(&ids),
            &source(&ids),
            &options(OutputFormat::Csv, true),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(summary.details, 3);

        let details = std::fs::read_to_string(dir.join("details.csv")).unwrap();
        let lines: Vec<&str> = details.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], PUBLISHED_HEADER.join(","));
        assert!(lines[1].starts_with("\"5000\",\"Schweiz\",\"Betrieb 5\""));
        assert!(lines[2].starts_with("\"3000\","));
        assert!(lines[3].starts_with("\"8000\","));

        let search = std::fs::read_to_string(dir.join("search.csv")).unwrap();
        let lines: Vec<&str> = search.lines().collect();
        assert_eq!(lines[0], "id,eibName,ort.plz");
        assert_eq!(lines[1], "\"5\",\"Betrieb 5\",\"5000\"");
        assert_eq!(lines.len(), 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn directory_json_scrape_writes_file_per_detail() {
        let dir = temp_dir();
        let ids = [4, 2];
        let mut sink = Sink::new(SinkMode::Directory(dir.clone()));
        run_search(
            &hits(&ids),
            &source(&ids),
            &options(OutputFormat::Json, true),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap();

        let search: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("search.json")).unwrap())
                .unwrap();
        assert_eq!(search.as_array().unwrap().len(), 2);

        for id in ids {
            let detail: Value = serde_json::from_str(
                &std::fs::read_to_string(dir.join(format!("{id}.json"))).unwrap(),
            )
            .unwrap();
            assert_eq!(detail["id"], id);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn csv_stream_scrape_carries_only_details() {
        let (mut sink, buf) = stdout_sink();
        let ids = [1, 2];
        run_search(
            &hits(&ids),
            &source(&ids),
            &options(OutputFormat::Csv, true),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap();

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], PUBLISHED_HEADER.join(","));
    }

    #[tokio::test]
    async fn csv_stream_without_scrape_flattens_hits() {
        let (mut sink, buf) = stdout_sink();
        run_search(
            &hits(&[9]),
            &source(&[]),
            &options(OutputFormat::Csv, false),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(buf.text(), "id,eibName,ort.plz\n\"9\",\"Betrieb 9\",\"9000\"\n");
    }

    #[tokio::test]
    async fn failed_fetch_aborts_without_closing() {
        let (mut sink, buf) = stdout_sink();
        let src = source(&[1]);
        let err = run_search(
            &hits(&[1, 2, 3]),
            &src,
            &options(OutputFormat::Json, true),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ZiviError::Api { status: Some(404), .. }));
        assert_eq!(src.fetched_ids(), vec![1, 2]);
        let text = buf.text();
        assert!(!text.ends_with("\n}\n"));
        assert!(serde_json::from_str::<Value>(&text).is_err());
    }

    #[tokio::test]
    async fn hit_without_id_fails_before_output() {
        let (mut sink, buf) = stdout_sink();
        let bad = vec![SearchHit::from_value(json!({ "eibName": "x" })).unwrap()];
        let err = run_search(
            &bad,
            &source(&[]),
            &options(OutputFormat::Json, true),
            &mut sink,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ZiviError::Format { .. }));
        assert!(buf.text().is_empty());
    }

    #[tokio::test]
    async fn scrape_writes_cards_for_json_output() {
        let cards = temp_dir();
        let (mut sink, _buf) = stdout_sink();
        let mut opts = options(OutputFormat::Json, true);
        opts.card_dir = Some(cards.clone());

        run_search(&hits(&[6]), &source(&[6]), &opts, &mut sink, &SilentProgress)
            .await
            .unwrap();

        assert!(cards.join("E-6.vcf").exists());
        assert!(cards.join("E-6").join("Anna Muster6.vcf").exists());

        let _ = std::fs::remove_dir_all(&cards);
    }

    #[tokio::test]
    async fn details_is_a_standalone_unit() {
        let (mut sink, buf) = stdout_sink();
        run_details(12, &source(&[12]), &options(OutputFormat::Json, false), &mut sink)
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&buf.text()).unwrap();
        assert_eq!(parsed["id"], 12);

        let (mut sink, buf) = stdout_sink();
        run_details(12, &source(&[12]), &options(OutputFormat::Csv, false), &mut sink)
            .await
            .unwrap();
        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("\"12000\""));
    }

    #[test]
    fn convert_reads_saved_records_in_order() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("b.json");
        let second = dir.join("a.json");
        std::fs::write(&first, r#"{"eibName": "Erster", "eibAdresse": {"plz": "1000"}}"#).unwrap();
        std::fs::write(&second, r#"{"eibName": "Zweiter"}"#).unwrap();

        let (mut sink, buf) = stdout_sink();
        let summary = run_convert(
            &[first, second],
            &options(OutputFormat::Csv, false),
            &mut sink,
            &SilentProgress,
        )
        .unwrap();
        assert_eq!(summary.details, 2);

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("\"1000\",\"Schweiz\",\"Erster\""));
        assert!(lines[2].starts_with("\"\",\"Schweiz\",\"Zweiter\""));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn convert_rejects_non_object_records() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("list.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let (mut sink, _buf) = stdout_sink();
        let err = run_convert(
            &[path],
            &options(OutputFormat::Json, false),
            &mut sink,
            &SilentProgress,
        )
        .unwrap_err();
        assert!(matches!(err, ZiviError::Format { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
