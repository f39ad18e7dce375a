//! Byte-offset positions and the shared source map.
//!
//! Every node of the semantic graph, every syntax node and every compile error
//! is located with a [`Pos`] or a [`Span`]: a byte offset (or byte range) inside
//! one file of a [`SourceMap`]. Conversion to protocol positions (zero based
//! line, UTF-16 column) goes through the file's [`Rope`].

use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

use ropey::Rope;
use tower_lsp::lsp_types::Position;

/// Index of a file inside a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u32);

/// A single byte offset inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub file: FileId,
    pub offset: usize,
}

impl Pos {
    pub fn new(file: FileId, offset: usize) -> Pos {
        Pos { file, offset }
    }

    /// `self` is located before or at `other`. Positions in different files are
    /// never ordered.
    pub fn before_equal(&self, other: &Pos) -> bool {
        self.file == other.file && self.offset <= other.offset
    }
}

/// A byte range inside a file. `end` is exclusive for slicing but inclusive for
/// containment, so a cursor placed right after a token still hits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl Span {
    pub fn new(file: FileId, start: usize, end: usize) -> Span {
        Span { file, start, end }
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.file, self.start)
    }

    pub fn end_pos(&self) -> Pos {
        Pos::new(self.file, self.end)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Anything that occupies a range of a source file.
pub trait Rangeable {
    fn span(&self) -> Span;

    fn contains(&self, pos: Pos) -> bool {
        let span = self.span();
        span.pos().before_equal(&pos) && pos.before_equal(&span.end_pos())
    }

    fn includes(&self, other: &impl Rangeable) -> bool {
        let outer = self.span();
        let inner = other.span();
        outer.file == inner.file && outer.start <= inner.start && outer.end >= inner.end
    }
}

impl chumsky::span::Span for Span {
    type Context = FileId;
    type Offset = usize;

    fn new(context: Self::Context, range: Range<Self::Offset>) -> Self {
        Span::new(context, range.start, range.end)
    }

    fn context(&self) -> Self::Context {
        self.file
    }

    fn start(&self) -> Self::Offset {
        self.start
    }

    fn end(&self) -> Self::Offset {
        self.end
    }
}

impl Rangeable for Span {
    fn span(&self) -> Span {
        *self
    }
}

/// One loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    pub rope: Rope,
}

impl SourceFile {
    pub fn slice(&self, span: Span) -> Option<&str> {
        self.text.get(span.byte_range())
    }
}

/// All files taking part in one compilation, addressed by [`FileId`].
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap::default()
    }

    /// Registers a file and returns its id. Registering the same path twice
    /// returns the id of the first registration.
    pub fn add(&mut self, path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> FileId {
        let path = path.into();
        if let Some(id) = self.file_id(&path) {
            return id;
        }

        let text: Arc<str> = text.into();
        let rope = Rope::from_str(&text);
        self.files.push(SourceFile { path, text, rope });
        FileId((self.files.len() - 1) as u32)
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn path(&self, id: FileId) -> Option<&Path> {
        self.get(id).map(|file| file.path.as_path())
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.files
            .iter()
            .position(|file| file.path == path)
            .map(|idx| FileId(idx as u32))
    }

    pub fn slice(&self, span: Span) -> Option<&str> {
        self.get(span.file)?.slice(span)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(idx, file)| (FileId(idx as u32), file))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Protocol range of a span, converted with the span's own file.
    pub fn to_lsp_range(&self, span: Span) -> Option<tower_lsp::lsp_types::Range> {
        let rope = &self.get(span.file)?.rope;
        Some(tower_lsp::lsp_types::Range {
            start: offset_to_position(rope, span.start)?,
            end: offset_to_position(rope, span.end)?,
        })
    }
}

/// Converts a byte offset to a protocol position.
///
/// An offset in the middle of a multi-byte character is rounded down to the
/// start of that character. Offsets past the end of the text yield `None`.
pub fn offset_to_position(rope: &Rope, offset: usize) -> Option<Position> {
    let char_idx = rope.try_byte_to_char(offset).ok()?;
    let line = rope.char_to_line(char_idx);
    let line_start = rope.line_to_char(line);
    let character = rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_start);

    Some(Position {
        line: line as u32,
        character: character as u32,
    })
}

/// Converts a protocol position to a byte offset.
///
/// The column may address any character of the line including its line
/// terminator, or the end of the text on the last line. A column inside a
/// surrogate pair is rounded down to the start of the character.
pub fn position_to_offset(rope: &Rope, position: Position) -> Option<usize> {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return None;
    }

    let line_start = rope.line_to_char(line);
    let line_chars = rope.line(line).len_chars();
    let last_char = match line + 1 < rope.len_lines() {
        true => line_start + line_chars.saturating_sub(1),
        false => line_start + line_chars,
    };

    let target = rope.char_to_utf16_cu(line_start) + position.character as usize;
    if target > rope.char_to_utf16_cu(last_char) {
        return None;
    }

    let char_idx = rope.utf16_cu_to_char(target);
    Some(rope.char_to_byte(char_idx))
}
