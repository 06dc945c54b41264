//! Streaming output assembler.
//!
//! A [`Frame`] is the framing state of one output channel (the search
//! collection, or the stream of detail records). Its transitions
//! [`Frame::open`], [`Frame::emit`] and [`Frame::close`] return the bytes to
//! write and never touch I/O themselves, so the sequence
//!
//! ```text
//! NotStarted ──open──▶ Open ──emit*──▶ Open ──close / last emit──▶ Closed
//! ```
//!
//! can be driven and checked in isolation. The [`crate::sink`] module decides
//! where each [`Emission`] ends up.
//!
//! Framing per (encoding, layout):
//!
//! | | stream | directory |
//! |---|---|---|
//! | JSON | `[` item `,` item … `]` | one file per unit, no wrapper |
//! | CSV | header line once, one row per unit | same, appended to `{channel}.csv` |

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use zivi_shared::{OutputFormat, Result, ZiviError};

/// Channel name of the search-result collection.
pub const SEARCH_CHANNEL: &str = "search";

/// Channel name of the detail-record stream.
pub const DETAILS_CHANNEL: &str = "details";

/// Indentation unit for JSON output.
const INDENT: &str = "\t";

/// Where the channel's units end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// All units share a single stream (stdout or one file).
    Stream,
    /// Units are spread over files in a directory.
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    NotStarted,
    Open,
    Closed,
}

/// Position of a unit within its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Middle,
    Last,
    /// First and last item of a one-element sequence.
    Only,
    /// Not part of any sequence; rendered as a complete document.
    Standalone,
}

impl Position {
    /// Position of item `index` in a sequence of `len` items.
    pub fn of(index: usize, len: usize) -> Self {
        match (index == 0, index + 1 >= len) {
            (true, true) => Self::Only,
            (true, false) => Self::First,
            (false, true) => Self::Last,
            (false, false) => Self::Middle,
        }
    }

    pub fn is_first(&self) -> bool {
        matches!(self, Self::First | Self::Only)
    }

    pub fn is_last(&self) -> bool {
        matches!(self, Self::Last | Self::Only)
    }
}

/// Content of one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A hierarchical value (JSON encoding).
    Document(Value),
    /// One table row (CSV encoding).
    Row(Vec<String>),
}

/// One logical output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Names the unit's own file in directory layout.
    pub title: String,
    pub payload: Payload,
}

impl Unit {
    pub fn document(title: impl Into<String>, value: Value) -> Self {
        Self {
            title: title.into(),
            payload: Payload::Document(value),
        }
    }

    pub fn row(title: impl Into<String>, cells: Vec<String>) -> Self {
        Self {
            title: title.into(),
            payload: Payload::Row(cells),
        }
    }
}

/// Destination of an emission, relative to its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The channel's shared output. `fresh` marks the first bytes of the channel.
    Channel { fresh: bool },
    /// A file of its own, named after the unit title.
    Unit(String),
}

/// Bytes produced by one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub channel: &'static str,
    pub extension: &'static str,
    pub target: Target,
    pub bytes: Vec<u8>,
}

/// Framing state of one output channel.
#[derive(Debug, Clone)]
pub struct Frame {
    channel: &'static str,
    encoding: OutputFormat,
    layout: Layout,
    header: Vec<String>,
    depth: usize,
    state: FrameState,
    items: usize,
    started: bool,
}

impl Frame {
    pub fn new(channel: &'static str, encoding: OutputFormat, layout: Layout) -> Self {
        Self {
            channel,
            encoding,
            layout,
            header: Vec::new(),
            depth: 0,
            state: FrameState::NotStarted,
            items: 0,
            started: false,
        }
    }

    /// Column names written before the first CSV row.
    pub fn with_header<I, S>(mut self, header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = header.into_iter().map(Into::into).collect();
        self
    }

    /// Nest the JSON wrapper `depth` levels deep inside an enclosing document.
    pub fn nested(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of units emitted so far.
    pub fn items(&self) -> usize {
        self.items
    }

    /// Open the channel: the JSON wrapper, or the CSV header line.
    ///
    /// Directory-layout JSON has nothing to open and yields `None`.
    pub fn open(&mut self) -> Result<Option<Emission>> {
        if self.state != FrameState::NotStarted {
            return Err(self.misuse("open"));
        }
        self.state = FrameState::Open;
        let bytes = self.opening_bytes()?;
        Ok(self.channel_emission(bytes))
    }

    /// Emit one unit at `position`.
    ///
    /// A first unit on a channel that was never opened opens it implicitly; a
    /// last unit closes it. [`Position::Standalone`] bypasses the wrapper and
    /// renders one self-contained document.
    pub fn emit(&mut self, unit: &Unit, position: Position) -> Result<Emission> {
        if position == Position::Standalone {
            return self.emit_standalone(unit);
        }

        let mut bytes = Vec::new();
        match self.state {
            FrameState::NotStarted if position.is_first() => {
                self.state = FrameState::Open;
                bytes.extend(self.opening_bytes()?);
            }
            FrameState::Open if position.is_first() == (self.items == 0) => {}
            _ => return Err(self.misuse("emit")),
        }

        let target = match (self.encoding, self.layout) {
            (OutputFormat::Json, Layout::Directory) => {
                bytes = standalone_json(self.json_value(unit)?)?;
                Target::Unit(unit.title.clone())
            }
            (OutputFormat::Json, Layout::Stream) => {
                if self.items > 0 {
                    bytes.push(b',');
                }
                bytes.push(b'\n');
                let pretty = pretty_json(self.json_value(unit)?)?;
                bytes.extend(indent_lines(&pretty, self.depth + 1).into_bytes());
                Target::Channel { fresh: false }
            }
            (OutputFormat::Csv, _) => {
                bytes.extend(csv_line(self.row_cells(unit)?, csv::QuoteStyle::Always)?);
                Target::Channel { fresh: false }
            }
        };
        self.items += 1;

        if position.is_last() {
            self.state = FrameState::Closed;
            bytes.extend(self.closing_bytes());
        }

        Ok(self.emission(target, bytes))
    }

    /// Close the channel. Closing an already closed channel is a no-op.
    pub fn close(&mut self) -> Result<Option<Emission>> {
        match self.state {
            FrameState::Closed => Ok(None),
            FrameState::NotStarted => Err(self.misuse("close")),
            FrameState::Open => {
                self.state = FrameState::Closed;
                let bytes = self.closing_bytes();
                Ok(self.channel_emission(bytes))
            }
        }
    }

    fn emit_standalone(&mut self, unit: &Unit) -> Result<Emission> {
        if self.state != FrameState::NotStarted {
            return Err(self.misuse("emit standalone"));
        }
        self.state = FrameState::Closed;
        self.items = 1;

        match self.encoding {
            OutputFormat::Json => {
                let bytes = standalone_json(self.json_value(unit)?)?;
                let target = match self.layout {
                    Layout::Directory => Target::Unit(unit.title.clone()),
                    Layout::Stream => Target::Channel { fresh: false },
                };
                Ok(self.emission(target, bytes))
            }
            OutputFormat::Csv => {
                let mut bytes = self.header_line()?;
                bytes.extend(csv_line(self.row_cells(unit)?, csv::QuoteStyle::Always)?);
                Ok(self.emission(Target::Channel { fresh: false }, bytes))
            }
        }
    }

    fn opening_bytes(&self) -> Result<Vec<u8>> {
        match (self.encoding, self.layout) {
            (OutputFormat::Json, Layout::Stream) => Ok(b"[".to_vec()),
            (OutputFormat::Json, Layout::Directory) => Ok(Vec::new()),
            (OutputFormat::Csv, _) => self.header_line(),
        }
    }

    fn closing_bytes(&self) -> Vec<u8> {
        if (self.encoding, self.layout) != (OutputFormat::Json, Layout::Stream) {
            return Vec::new();
        }
        let mut out = String::new();
        if self.items > 0 {
            out.push('\n');
            out.push_str(&INDENT.repeat(self.depth));
        }
        out.push(']');
        if self.depth == 0 {
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Header names are quoted only when they contain a delimiter or quote;
    /// data rows are always quoted.
    fn header_line(&self) -> Result<Vec<u8>> {
        csv_line(&self.header, csv::QuoteStyle::Necessary)
    }

    fn channel_emission(&mut self, bytes: Vec<u8>) -> Option<Emission> {
        if bytes.is_empty() {
            return None;
        }
        Some(self.emission(Target::Channel { fresh: false }, bytes))
    }

    /// Stamp `fresh` on the first channel write.
    fn emission(&mut self, target: Target, bytes: Vec<u8>) -> Emission {
        let target = match target {
            Target::Channel { .. } => {
                let fresh = !self.started;
                self.started = true;
                Target::Channel { fresh }
            }
            unit => unit,
        };
        Emission {
            channel: self.channel,
            extension: self.encoding.extension(),
            target,
            bytes,
        }
    }

    fn json_value<'u>(&self, unit: &'u Unit) -> Result<&'u Value> {
        match &unit.payload {
            Payload::Document(value) => Ok(value),
            Payload::Row(_) => Err(ZiviError::Output(format!(
                "channel {} expects JSON documents, got a table row",
                self.channel
            ))),
        }
    }

    fn row_cells<'u>(&self, unit: &'u Unit) -> Result<&'u [String]> {
        match &unit.payload {
            Payload::Row(cells) => Ok(cells),
            Payload::Document(_) => Err(ZiviError::Output(format!(
                "channel {} expects table rows, got a JSON document",
                self.channel
            ))),
        }
    }

    fn misuse(&self, action: &str) -> ZiviError {
        ZiviError::Output(format!(
            "cannot {action} channel {} in state {:?}",
            self.channel, self.state
        ))
    }
}

// ---------------------------------------------------------------------------
// Enclosing document for search results plus details on one JSON stream
// ---------------------------------------------------------------------------

/// `{` and the first member key; the results frame follows at depth 1.
pub fn document_open(first_key: &str) -> Emission {
    document_emission(format!("{{\n{INDENT}\"{first_key}\": "), true)
}

/// Separator and key of a further member.
pub fn document_member(key: &str) -> Emission {
    document_emission(format!(",\n{INDENT}\"{key}\": "), false)
}

pub fn document_close() -> Emission {
    document_emission("\n}\n".to_string(), false)
}

fn document_emission(text: String, fresh: bool) -> Emission {
    Emission {
        channel: SEARCH_CHANNEL,
        extension: OutputFormat::Json.extension(),
        target: Target::Channel { fresh },
        bytes: text.into_bytes(),
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Tab-indented JSON without a trailing newline.
fn pretty_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(INDENT.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| ZiviError::Output(format!("JSON serialization failed: {e}")))?;
    String::from_utf8(buf).map_err(|e| ZiviError::Output(e.to_string()))
}

fn standalone_json(value: &Value) -> Result<Vec<u8>> {
    let mut text = pretty_json(value)?;
    text.push('\n');
    Ok(text.into_bytes())
}

/// Prefix every line of `text` with `depth` indentation units.
fn indent_lines(text: &str, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One CSV record with every field quoted, newline-terminated.
fn csv_line(cells: &[String], quote_style: csv::QuoteStyle) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(quote_style)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(cells)
        .map_err(|e| ZiviError::Output(format!("CSV row failed: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| ZiviError::Output(format!("CSV row failed: {e}")))
}
