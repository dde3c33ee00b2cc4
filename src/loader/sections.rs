//! Splitting a pipeline document into per-header chunks.
//!
//! Each chunk is parsed on its own so a syntax error in one task section does
//! not hide problems in the others, and so repeated `[Task]` headers can be
//! reported as duplicate tasks instead of a single TOML parse failure.

/// What kind of header opened a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Header {
    /// Text before the first header.
    Preamble,
    /// `[name]` or `[name.sub]`.
    Table,
    /// `[[name]]`.
    ArrayOfTables,
}

#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    pub header: Header,
    /// Zero-based line of the header in the source document.
    pub start_line: usize,
    /// The header line, empty for the preamble.
    pub header_line: String,
    /// Chunk text, header included. Its first line is `start_line` in the document.
    pub text: String,
}

impl Chunk {
    fn new(header: Header, start_line: usize, header_line: &str) -> Self {
        Self {
            header,
            start_line,
            header_line: header_line.to_string(),
            text: String::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// Whether the chunk has anything besides whitespace and comments.
    pub fn has_content(&self) -> bool {
        self.text.lines().any(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
    }
}

/// Tracks strings and array nesting so brackets inside values are not
/// mistaken for headers.
#[derive(Debug, Default)]
struct Lexer {
    depth: usize,
    multiline: Option<&'static [u8]>,
}

impl Lexer {
    fn at_top_level(&self) -> bool {
        self.depth == 0 && self.multiline.is_none()
    }

    fn scan(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(delim) = self.multiline {
                if delim == b"\"\"\"" && bytes[i] == b'\\' {
                    i += 2;
                } else if bytes[i..].starts_with(delim) {
                    self.multiline = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            match bytes[i] {
                b'#' => return,
                quote @ (b'"' | b'\'') => {
                    let triple: &'static [u8] = if quote == b'"' { b"\"\"\"" } else { b"'''" };
                    if bytes[i..].starts_with(triple) {
                        self.multiline = Some(triple);
                        i += 3;
                        continue;
                    }
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        if quote == b'"' && bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                b'[' => self.depth += 1,
                b']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
        }
    }
}

/// Split `source` at top-level table headers.
pub(crate) fn split(source: &str) -> Vec<Chunk> {
    let mut chunks = vec![Chunk::new(Header::Preamble, 0, "")];
    let mut lexer = Lexer::default();

    for (number, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if lexer.at_top_level() && trimmed.starts_with('[') {
            let header = if trimmed.starts_with("[[") {
                Header::ArrayOfTables
            } else {
                Header::Table
            };
            let mut chunk = Chunk::new(header, number, line.trim());
            chunk.push_line(line);
            chunks.push(chunk);
            continue;
        }

        lexer.scan(line);
        if let Some(chunk) = chunks.last_mut() {
            chunk.push_line(line);
        }
    }

    chunks
}
