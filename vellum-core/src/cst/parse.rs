//! A position- and comment-preserving parser for the YAML subset OpenAPI
//! documents are written in: block and flow collections, the five scalar
//! styles, comments, anchors and aliases. JSON parses through the same path,
//! since a JSON document is a YAML flow collection.

use miette::SourceSpan;
use rustc_hash::FxHashSet;

use super::{Kind, Node, Style, Tag};

/// Parses a document from text.
pub fn parse(source: &str) -> Result<Node, SyntaxError> {
    Parser::new(source).parse_document()
}

/// Parses a document from raw bytes, rejecting non-UTF-8 input.
pub fn parse_bytes(source: &[u8]) -> Result<Node, SyntaxError> {
    let text = std::str::from_utf8(source).map_err(|err| SyntaxError {
        message: format!("document is not valid UTF-8: {err}"),
        line: 1,
        column: 1,
        src: String::new(),
        span: (0, 0).into(),
    })?;
    parse(text)
}

/// A malformed document, labelled with the offending source position.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{message} at line {line}, column {column}")]
pub struct SyntaxError {
    pub message: String,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
    #[source_code]
    src: String,
    #[label("here")]
    span: SourceSpan,
}

impl SyntaxError {
    fn new(message: impl Into<String>, src: &str, offset: usize, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            src: src.to_owned(),
            span: (offset.min(src.len()), 1usize).into(),
        }
    }
}

/// One source line, sliced to its significant content. `indent` is the
/// 0-based column where `content` starts; sequence parsing re-slices lines
/// in place to step past `- ` markers.
#[derive(Clone, Copy, Debug)]
struct Line<'s> {
    indent: usize,
    content: &'s str,
    /// 1-based line number.
    number: usize,
    /// Byte offset of `content` within the source.
    offset: usize,
}

struct Parser<'s> {
    src: &'s str,
    lines: Vec<Line<'s>>,
    pos: usize,
    /// Comment lines waiting to become some node's head comment.
    comments: Vec<String>,
    /// Whether the root node has been entered (controls `---` handling).
    started: bool,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0;
        for (idx, raw) in src.split('\n').enumerate() {
            let raw_len = raw.len();
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let trimmed = line.trim_start_matches(' ');
            let indent = line.len() - trimmed.len();
            lines.push(Line {
                indent,
                content: trimmed.trim_end(),
                number: idx + 1,
                offset: offset + indent,
            });
            offset += raw_len + 1;
        }
        Self {
            src,
            lines,
            pos: 0,
            comments: Vec::new(),
            started: false,
        }
    }

    fn err(&self, message: impl Into<String>, line: &Line<'s>, col_in_content: usize) -> SyntaxError {
        SyntaxError::new(
            message,
            self.src,
            line.offset + col_in_content,
            line.number,
            line.indent + col_in_content + 1,
        )
    }

    fn parse_document(mut self) -> Result<Node, SyntaxError> {
        let root = match self.peek_line()? {
            Some(_) => self.parse_block_node(0)?,
            None => Node::scalar(Tag::Null, ""),
        };
        if let Some(line) = self.peek_line()? {
            return Err(self.err("unexpected content after the document root", &line, 0));
        }
        let doc = Node::document(root);
        {
            let mut data = doc.borrow_mut();
            data.line = 1;
            data.column = 1;
        }
        // Anything left over is a trailing comment for the document.
        if let Some(foot) = self.take_comments() {
            doc.borrow_mut().foot_comment = Some(foot);
        }
        Ok(doc)
    }

    /// Advances past blank lines, comments and directives, and returns the
    /// next significant line without consuming it.
    fn peek_line(&mut self) -> Result<Option<Line<'s>>, SyntaxError> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            if line.content.is_empty() {
                self.pos += 1;
                continue;
            }
            if let Some(stripped) = line.content.strip_prefix('#') {
                self.comments.push(stripped.strip_prefix(' ').unwrap_or(stripped).to_owned());
                self.pos += 1;
                continue;
            }
            if line.indent == 0 && line.content.starts_with('%') && !self.started {
                self.pos += 1;
                continue;
            }
            if line.indent == 0 && (line.content == "---" || line.content.starts_with("--- ")) {
                if self.started {
                    // A second document ends the first.
                    self.pos = self.lines.len();
                    return Ok(None);
                }
                if line.content == "---" {
                    self.pos += 1;
                    continue;
                }
                let rest = &line.content[4..];
                let pad = line.content.len() - rest.trim_start().len();
                self.lines[self.pos] = Line {
                    indent: line.indent + pad,
                    content: rest.trim_start().trim_end(),
                    number: line.number,
                    offset: line.offset + pad,
                };
                continue;
            }
            if line.indent == 0 && line.content == "..." {
                self.pos = self.lines.len();
                return Ok(None);
            }
            // Tabs can't indent block structure.
            if line.content.starts_with('\t') {
                return Err(self.err("tab characters can't be used for indentation", &line, 0));
            }
            return Ok(Some(line));
        }
        Ok(None)
    }

    fn take_comments(&mut self) -> Option<String> {
        if self.comments.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.comments).join("\n"))
        }
    }

    /// Parses the node that begins at the current line. `min_indent` is the
    /// smallest column (0-based) the node may start at; a shallower line
    /// means the value is absent and parses as an empty scalar.
    fn parse_block_node(&mut self, min_indent: usize) -> Result<Node, SyntaxError> {
        let Some(line) = self.peek_line()? else {
            return Ok(Node::scalar(Tag::Null, ""));
        };
        if line.indent < min_indent {
            return Ok(Node::scalar(Tag::Null, ""));
        }
        self.started = true;
        // Mappings and sequences leave pending comments to their first
        // entry; value lines claim them for themselves.
        if line.content == "-" || line.content.starts_with("- ") {
            self.parse_block_sequence(line.indent)
        } else if find_key_split(line.content).is_some() {
            self.parse_block_mapping(line.indent)
        } else {
            let head = self.take_comments();
            let node = self.parse_value_line()?;
            if head.is_some() {
                node.borrow_mut().head_comment = head;
            }
            Ok(node)
        }
    }

    fn parse_block_mapping(&mut self, indent: usize) -> Result<Node, SyntaxError> {
        let map = Node::mapping();
        {
            let first = self.lines[self.pos];
            let mut data = map.borrow_mut();
            data.line = first.number;
            data.column = first.indent + 1;
        }
        let mut seen = FxHashSet::default();
        loop {
            let Some(line) = self.peek_line()? else { break };
            if line.indent != indent || line.content == "-" || line.content.starts_with("- ") {
                break;
            }
            let Some(split) = find_key_split(line.content) else {
                break;
            };
            let head = self.take_comments();
            let key = self.scalar_from_token(&line, 0, split.key)?;
            if head.is_some() {
                key.borrow_mut().head_comment = head;
            }
            let key_text = key.value();
            if !seen.insert(key_text.clone()) {
                return Err(self.err(format!("duplicate mapping key {key_text:?}"), &line, 0));
            }
            let value = self.parse_entry_value(&line, indent, split.colon + 1)?;
            map.push_entry(key, value);
        }
        Ok(map)
    }

    fn parse_block_sequence(&mut self, indent: usize) -> Result<Node, SyntaxError> {
        let seq = Node::sequence();
        {
            let first = self.lines[self.pos];
            let mut data = seq.borrow_mut();
            data.line = first.number;
            data.column = first.indent + 1;
        }
        loop {
            let Some(line) = self.peek_line()? else { break };
            if line.indent != indent || !(line.content == "-" || line.content.starts_with("- ")) {
                break;
            }
            let head = self.take_comments();
            let item = if line.content == "-" {
                self.pos += 1;
                self.parse_block_node(indent + 1)?
            } else {
                let rest = &line.content[1..];
                let pad = 1 + (rest.len() - rest.trim_start().len());
                self.lines[self.pos] = Line {
                    indent: line.indent + pad,
                    content: line.content[pad..].trim_end(),
                    number: line.number,
                    offset: line.offset + pad,
                };
                self.parse_block_node(indent + 1)?
            };
            if head.is_some() {
                item.borrow_mut().head_comment = head;
            }
            seq.push_item(item);
        }
        Ok(seq)
    }

    /// Parses the value part of a `key: value` entry. `col` is the 0-based
    /// position just past the colon within the entry's line.
    fn parse_entry_value(
        &mut self,
        line: &Line<'s>,
        parent_indent: usize,
        col: usize,
    ) -> Result<Node, SyntaxError> {
        let rest = line.content.get(col..).unwrap_or("");
        let pad = rest.len() - rest.trim_start().len();
        let rest = rest.trim_start();
        let value_col = col + pad;

        // Nothing after the colon: the value is a nested block (or absent).
        // A block sequence may sit at the key's own indent.
        if rest.is_empty() || rest.starts_with('#') {
            let comment = rest
                .strip_prefix('#')
                .map(|c| c.strip_prefix(' ').unwrap_or(c).to_owned());
            self.pos += 1;
            let value = match self.peek_line()? {
                Some(next)
                    if next.indent == parent_indent
                        && (next.content == "-" || next.content.starts_with("- ")) =>
                {
                    self.parse_block_sequence(parent_indent)?
                }
                _ => self.parse_block_node(parent_indent + 1)?,
            };
            if let Some(comment) = comment {
                value.borrow_mut().line_comment = Some(comment);
            }
            return Ok(value);
        }
        self.parse_inline_value(line, value_col, parent_indent)
    }

    /// Parses a node that starts mid-line at `col`, consuming the rest of
    /// the current line (and further lines for flow and block scalars).
    fn parse_inline_value(
        &mut self,
        line: &Line<'s>,
        col: usize,
        parent_indent: usize,
    ) -> Result<Node, SyntaxError> {
        let rest = &line.content[col..];

        if let Some(after) = rest.strip_prefix('&') {
            let name_len = after
                .find(|c: char| c.is_whitespace())
                .unwrap_or(after.len());
            let (name, after_anchor) = after.split_at(name_len);
            if name.is_empty() {
                return Err(self.err("anchor is missing a name", line, col));
            }
            let node = if after_anchor.trim_start().is_empty() {
                self.pos += 1;
                self.parse_block_node(parent_indent + 1)?
            } else {
                let skip = 1 + name_len + (after_anchor.len() - after_anchor.trim_start().len());
                self.parse_inline_value(line, col + skip, parent_indent)?
            };
            node.borrow_mut().anchor = Some(name.to_owned());
            return Ok(node);
        }

        if let Some(after) = rest.strip_prefix('*') {
            let name_len = after
                .find(|c: char| c.is_whitespace())
                .unwrap_or(after.len());
            let (name, tail) = after.split_at(name_len);
            if name.is_empty() {
                return Err(self.err("alias is missing a name", line, col));
            }
            let node = Node::alias(name);
            {
                let mut data = node.borrow_mut();
                data.line = line.number;
                data.column = line.indent + col + 1;
                data.line_comment = trailing_comment(tail);
            }
            self.pos += 1;
            return Ok(node);
        }

        if rest.starts_with('|') || rest.starts_with('>') {
            return self.parse_block_scalar(line, col, parent_indent);
        }

        if rest.starts_with('{') || rest.starts_with('[') {
            return self.parse_flow_value(line, col);
        }

        if rest.starts_with('"') || rest.starts_with('\'') {
            let (node, consumed) = self.quoted_scalar(line, col)?;
            let tail = &line.content[col + consumed..];
            if let Some(comment) = trailing_comment(tail) {
                node.borrow_mut().line_comment = Some(comment);
            } else if !tail.trim().is_empty() {
                return Err(self.err("unexpected content after quoted scalar", line, col + consumed));
            }
            self.pos += 1;
            return Ok(node);
        }

        // A plain scalar, possibly continued on more-indented lines.
        let (text, comment) = split_plain(rest);
        let mut text = text.trim_end().to_owned();
        let node_line = line.number;
        let node_col = line.indent + col + 1;
        self.pos += 1;
        loop {
            let Some(next) = self.peek_line()? else { break };
            if next.indent <= parent_indent
                || next.content == "-"
                || next.content.starts_with("- ")
                || find_key_split(next.content).is_some()
            {
                break;
            }
            let (more, _) = split_plain(next.content);
            text.push(' ');
            text.push_str(more.trim_end());
            self.pos += 1;
        }
        let node = Node::scalar(infer_tag(&text), text);
        {
            let mut data = node.borrow_mut();
            data.line = node_line;
            data.column = node_col;
            data.line_comment = comment;
        }
        Ok(node)
    }

    /// A node that occupies the whole current line (a sequence item value or
    /// a document-root scalar).
    fn parse_value_line(&mut self) -> Result<Node, SyntaxError> {
        let line = self.lines[self.pos];
        self.parse_inline_value(&line, 0, line.indent.saturating_sub(1))
    }

    fn parse_block_scalar(
        &mut self,
        line: &Line<'s>,
        col: usize,
        parent_indent: usize,
    ) -> Result<Node, SyntaxError> {
        let rest = &line.content[col..];
        let style = if rest.starts_with('|') {
            Style::Literal
        } else {
            Style::Folded
        };
        let mut header = &rest[1..];
        let mut chomp = Chomp::Clip;
        if let Some(after) = header.strip_prefix('-') {
            chomp = Chomp::Strip;
            header = after;
        } else if let Some(after) = header.strip_prefix('+') {
            chomp = Chomp::Keep;
            header = after;
        }
        let comment = trailing_comment(header);
        if comment.is_none() && !header.trim().is_empty() {
            return Err(self.err("unexpected content after block scalar indicator", line, col + 1));
        }
        self.pos += 1;

        // Collect all lines more indented than the entry, plus interior
        // blanks. The first non-blank line fixes the block's indent.
        let mut collected: Vec<(usize, &str)> = Vec::new();
        while self.pos < self.lines.len() {
            let next = self.lines[self.pos];
            if next.content.is_empty() {
                collected.push((0, ""));
                self.pos += 1;
                continue;
            }
            if next.indent <= parent_indent {
                break;
            }
            collected.push((next.indent, next.content));
            self.pos += 1;
        }
        // Drop trailing blanks back out of the block.
        while matches!(collected.last(), Some((_, ""))) {
            collected.pop();
        }
        let block_indent = collected
            .iter()
            .find(|(_, content)| !content.is_empty())
            .map(|&(indent, _)| indent)
            .unwrap_or(parent_indent + 1);
        let mut text = String::new();
        for (idx, &(indent, content)) in collected.iter().enumerate() {
            if idx > 0 {
                text.push('\n');
            }
            for _ in block_indent..indent {
                text.push(' ');
            }
            text.push_str(content);
        }
        match chomp {
            Chomp::Strip => {}
            Chomp::Clip | Chomp::Keep => {
                if !text.is_empty() {
                    text.push('\n');
                }
            }
        }

        let node = Node::scalar(Tag::Str, text);
        {
            let mut data = node.borrow_mut();
            data.style = style;
            data.line = line.number;
            data.column = line.indent + col + 1;
            data.line_comment = comment;
        }
        Ok(node)
    }

    fn parse_flow_value(&mut self, line: &Line<'s>, col: usize) -> Result<Node, SyntaxError> {
        let start_offset = line.offset + col;
        let mut cursor = FlowCursor {
            src: self.src,
            offset: start_offset,
            line: line.number,
            col: line.indent + col + 1,
        };
        let node = cursor.parse_node()?;

        // The flow value may have spanned lines; resync the line cursor and
        // only allow trailing whitespace or a comment after it.
        while self.pos < self.lines.len() {
            let l = self.lines[self.pos];
            let end = l.offset + l.content.len();
            if end >= cursor.offset {
                break;
            }
            self.pos += 1;
        }
        if self.pos < self.lines.len() {
            let l = self.lines[self.pos];
            let consumed = cursor.offset.saturating_sub(l.offset);
            let tail = l.content.get(consumed..).unwrap_or("");
            if let Some(comment) = trailing_comment(tail) {
                node.borrow_mut().line_comment = Some(comment);
            } else if !tail.trim().is_empty() {
                return Err(self.err("unexpected content after flow collection", &l, consumed));
            }
            self.pos += 1;
        }
        Ok(node)
    }

    fn quoted_scalar(&self, line: &Line<'s>, col: usize) -> Result<(Node, usize), SyntaxError> {
        let rest = &line.content[col..];
        let quote = rest.chars().next().unwrap_or('"');
        let (text, consumed, style) = if quote == '"' {
            let (raw, consumed) = scan_double_quoted(rest)
                .ok_or_else(|| self.err("unterminated double-quoted scalar", line, col))?;
            let decoded = decode_double_quoted(raw)
                .map_err(|msg| self.err(msg, line, col))?;
            (decoded, consumed, Style::DoubleQuoted)
        } else {
            let (raw, consumed) = scan_single_quoted(rest)
                .ok_or_else(|| self.err("unterminated single-quoted scalar", line, col))?;
            (raw.replace("''", "'"), consumed, Style::SingleQuoted)
        };
        let node = Node::scalar(Tag::Str, text);
        {
            let mut data = node.borrow_mut();
            data.style = style;
            data.line = line.number;
            data.column = line.indent + col + 1;
        }
        Ok((node, consumed))
    }

    fn scalar_from_token(&self, line: &Line<'s>, col: usize, token: &'s str) -> Result<Node, SyntaxError> {
        if token.starts_with('"') || token.starts_with('\'') {
            let (node, _) = self.quoted_scalar(line, col)?;
            return Ok(node);
        }
        if token.starts_with('?') {
            return Err(self.err("complex mapping keys are not supported", line, col));
        }
        let text = token.trim_end();
        let node = Node::scalar(infer_tag(text), text);
        {
            let mut data = node.borrow_mut();
            data.line = line.number;
            data.column = line.indent + col + 1;
        }
        Ok(node)
    }
}

#[derive(Clone, Copy, Debug)]
enum Chomp {
    Clip,
    Strip,
    Keep,
}

#[derive(Clone, Copy, Debug)]
struct KeySplit<'s> {
    key: &'s str,
    /// 0-based position of the colon within the line content.
    colon: usize,
}

/// Finds the `:` that splits a block mapping entry, skipping quoted keys
/// and colons nested in flow brackets. Returns `None` if the line isn't a
/// mapping entry.
fn find_key_split(content: &str) -> Option<KeySplit<'_>> {
    let bytes = content.as_bytes();
    let mut idx = 0;
    if bytes.first() == Some(&b'"') {
        let (_, consumed) = scan_double_quoted(content)?;
        idx = consumed;
    } else if bytes.first() == Some(&b'\'') {
        let (_, consumed) = scan_single_quoted(content)?;
        idx = consumed;
    }
    let mut depth = 0usize;
    while idx < bytes.len() {
        match bytes[idx] {
            b'[' | b'{' => depth += 1,
            b']' | b'}' => depth = depth.saturating_sub(1),
            b'#' if idx > 0 && bytes[idx - 1] == b' ' => return None,
            b':' if depth == 0 => {
                let next = bytes.get(idx + 1);
                if next.is_none() || next == Some(&b' ') {
                    return Some(KeySplit {
                        key: content[..idx].trim_end(),
                        colon: idx,
                    });
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

/// Splits a plain scalar from its trailing comment. A `#` only begins a
/// comment when preceded by whitespace.
fn split_plain(text: &str) -> (&str, Option<String>) {
    let bytes = text.as_bytes();
    for idx in 0..bytes.len() {
        if bytes[idx] == b'#' && (idx == 0 || bytes[idx - 1] == b' ') {
            let comment = &text[idx + 1..];
            return (
                text[..idx].trim_end(),
                Some(comment.strip_prefix(' ').unwrap_or(comment).to_owned()),
            );
        }
    }
    (text, None)
}

fn trailing_comment(tail: &str) -> Option<String> {
    let tail = tail.trim_start();
    tail.strip_prefix('#')
        .map(|c| c.strip_prefix(' ').unwrap_or(c).to_owned())
}

/// Scans a double-quoted token, returning the raw interior and the total
/// consumed length including both quotes.
fn scan_double_quoted(text: &str) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'"'));
    let mut idx = 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'"' => return Some((&text[1..idx], idx + 1)),
            _ => idx += 1,
        }
    }
    None
}

/// Scans a single-quoted token; `''` is an escaped quote.
fn scan_single_quoted(text: &str) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'\''));
    let mut idx = 1;
    while idx < bytes.len() {
        if bytes[idx] == b'\'' {
            if bytes.get(idx + 1) == Some(&b'\'') {
                idx += 2;
                continue;
            }
            return Some((&text[1..idx], idx + 1));
        }
        idx += 1;
    }
    None
}

/// Decodes the escapes of a double-quoted scalar.
fn decode_double_quoted(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('e') => out.push('\x1b'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('x') => out.push(decode_unicode(&mut chars, 2)?),
            Some('u') => out.push(decode_unicode(&mut chars, 4)?),
            Some('U') => out.push(decode_unicode(&mut chars, 8)?),
            other => {
                return Err(match other {
                    Some(c) => format!("unknown escape `\\{c}` in double-quoted scalar"),
                    None => "dangling `\\` in double-quoted scalar".to_owned(),
                });
            }
        }
    }
    Ok(out)
}

fn decode_unicode(chars: &mut std::str::Chars<'_>, len: usize) -> Result<char, String> {
    let digits: String = chars.take(len).collect();
    if digits.len() != len {
        return Err("truncated unicode escape in double-quoted scalar".to_owned());
    }
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("invalid unicode escape `\\u{digits}`"))
}

/// Infers the core-schema tag of a plain scalar.
fn infer_tag(text: &str) -> Tag {
    use winnow::{
        Parser,
        ascii::digit1,
        combinator::{alt, eof, opt, preceded},
        token::one_of,
    };

    fn sign(input: &mut &str) -> winnow::Result<Option<char>> {
        opt(one_of(['+', '-'])).parse_next(input)
    }

    fn exponent(input: &mut &str) -> winnow::Result<()> {
        (one_of(['e', 'E']), sign, digit1).void().parse_next(input)
    }

    fn float_body(input: &mut &str) -> winnow::Result<()> {
        alt((
            (digit1, '.', opt(digit1), opt(exponent)).void(),
            ('.', digit1, opt(exponent)).void(),
            (digit1, exponent).void(),
        ))
        .parse_next(input)
    }

    if matches!(text, "" | "~" | "null" | "Null" | "NULL") {
        return Tag::Null;
    }
    if matches!(text, "true" | "True" | "TRUE" | "false" | "False" | "FALSE") {
        return Tag::Bool;
    }
    if (sign, digit1, eof).parse(text).is_ok() {
        return Tag::Int;
    }
    if (sign, float_body, eof).parse(text).is_ok() {
        return Tag::Float;
    }
    let mut special = (
        sign,
        preceded('.', alt(("inf", "Inf", "INF", "nan", "NaN", "NAN"))),
        eof,
    );
    if special.parse(text).is_ok() {
        return Tag::Float;
    }
    Tag::Str
}

/// A character cursor for flow collections, which may span multiple lines.
struct FlowCursor<'s> {
    src: &'s str,
    offset: usize,
    /// 1-based.
    line: usize,
    /// 1-based.
    col: usize,
}

impl<'s> FlowCursor<'s> {
    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.src, self.offset, self.line, self.col)
    }

    fn parse_node(&mut self) -> Result<Node, SyntaxError> {
        self.skip_ws();
        let (line, col) = (self.line, self.col);
        let node = match self.peek() {
            Some('{') => self.parse_flow_mapping()?,
            Some('[') => self.parse_flow_sequence()?,
            Some('"') => self.parse_flow_double()?,
            Some('\'') => self.parse_flow_single()?,
            Some(_) => self.parse_flow_plain()?,
            None => return Err(self.error("unexpected end of input in flow collection")),
        };
        {
            let mut data = node.borrow_mut();
            data.line = line;
            data.column = col;
            if data.kind != Kind::Scalar {
                data.style = Style::Flow;
            }
        }
        Ok(node)
    }

    fn parse_flow_mapping(&mut self) -> Result<Node, SyntaxError> {
        self.bump(); // {
        let map = Node::mapping();
        let mut seen = FxHashSet::default();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(map);
        }
        loop {
            let key = self.parse_node()?;
            if !seen.insert(key.value()) {
                return Err(self.error(format!("duplicate mapping key {:?}", key.value())));
            }
            self.skip_ws();
            if self.peek() != Some(':') {
                return Err(self.error("expected `:` in flow mapping"));
            }
            self.bump();
            let value = self.parse_node()?;
            map.push_entry(key, value);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                    // Tolerate a trailing comma before the closer.
                    if self.peek() == Some('}') {
                        self.bump();
                        break;
                    }
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error("expected `,` or `}` in flow mapping")),
            }
        }
        Ok(map)
    }

    fn parse_flow_sequence(&mut self) -> Result<Node, SyntaxError> {
        self.bump(); // [
        let seq = Node::sequence();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(seq);
        }
        loop {
            let item = self.parse_node()?;
            seq.push_item(item);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                    if self.peek() == Some(']') {
                        self.bump();
                        break;
                    }
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error("expected `,` or `]` in flow sequence")),
            }
        }
        Ok(seq)
    }

    fn parse_flow_double(&mut self) -> Result<Node, SyntaxError> {
        let rest = &self.src[self.offset..];
        let (raw, consumed) =
            scan_double_quoted(rest).ok_or_else(|| self.error("unterminated double-quoted scalar"))?;
        let decoded = decode_double_quoted(raw).map_err(|msg| self.error(msg))?;
        for _ in 0..consumed {
            self.bump();
        }
        let node = Node::scalar(Tag::Str, decoded);
        node.borrow_mut().style = Style::DoubleQuoted;
        Ok(node)
    }

    fn parse_flow_single(&mut self) -> Result<Node, SyntaxError> {
        let rest = &self.src[self.offset..];
        let (raw, consumed) =
            scan_single_quoted(rest).ok_or_else(|| self.error("unterminated single-quoted scalar"))?;
        for _ in 0..consumed {
            self.bump();
        }
        let node = Node::scalar(Tag::Str, raw.replace("''", "'"));
        node.borrow_mut().style = Style::SingleQuoted;
        Ok(node)
    }

    fn parse_flow_plain(&mut self) -> Result<Node, SyntaxError> {
        let start = self.offset;
        while let Some(c) = self.peek() {
            match c {
                ',' | ']' | '}' | '\n' | '#' => break,
                ':' => {
                    let next = self.src[self.offset + 1..].chars().next();
                    if matches!(next, None | Some(' ') | Some(',') | Some(']') | Some('}')) {
                        break;
                    }
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
        let text = self.src[start..self.offset].trim_end();
        if text.is_empty() {
            return Err(self.error("empty flow scalar"));
        }
        Ok(Node::scalar(infer_tag(text), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn block_mapping_positions() {
        let doc = parse(indoc! {"
            openapi: 3.1.0
            info:
              title: Example
              version: 1.0.0
        "})
        .unwrap();
        let root = doc.unwrap_document();
        assert!(root.is_mapping());

        let openapi = root.get("openapi").unwrap();
        assert_eq!(openapi.value(), "3.1.0");
        assert_eq!(openapi.line(), 1);
        assert_eq!(openapi.column(), 10);
        // `3.1.0` has two dots, so it's a string, not a float.
        assert_eq!(openapi.tag(), Tag::Str);

        let title = root.get("info").unwrap().get("title").unwrap();
        assert_eq!(title.line(), 3);
        assert_eq!(title.column(), 10);
    }

    #[test]
    fn insertion_order_preserved() {
        let doc = parse("b: 1\na: 2\nzz: 3\n").unwrap();
        let keys: Vec<_> = doc
            .unwrap_document()
            .entries()
            .into_iter()
            .map(|(k, _)| k.value())
            .collect();
        assert_eq!(keys, ["b", "a", "zz"]);
    }

    #[test]
    fn scalar_tags() {
        let doc = parse(indoc! {"
            int: 42
            neg: -7
            float: 3.5
            exp: 1e3
            bool: true
            null_value: null
            tilde: ~
            str: hello world
            version: 2.0
        "})
        .unwrap();
        let root = doc.unwrap_document();
        assert_eq!(root.get("int").unwrap().tag(), Tag::Int);
        assert_eq!(root.get("neg").unwrap().tag(), Tag::Int);
        assert_eq!(root.get("float").unwrap().tag(), Tag::Float);
        assert_eq!(root.get("exp").unwrap().tag(), Tag::Float);
        assert_eq!(root.get("bool").unwrap().tag(), Tag::Bool);
        assert_eq!(root.get("null_value").unwrap().tag(), Tag::Null);
        assert_eq!(root.get("tilde").unwrap().tag(), Tag::Null);
        assert_eq!(root.get("str").unwrap().tag(), Tag::Str);
        assert_eq!(root.get("version").unwrap().tag(), Tag::Float);
    }

    #[test]
    fn comments_attach() {
        let doc = parse(indoc! {"
            # Top of file.
            # Second line.
            openapi: 3.0.1 # inline note
            info:
              # About the title.
              title: Example
        "})
        .unwrap();
        let root = doc.unwrap_document();
        let (openapi_key, openapi) = root.get_entry("openapi").unwrap();
        assert_eq!(
            openapi_key.borrow().head_comment.as_deref(),
            Some("Top of file.\nSecond line."),
        );
        assert_eq!(openapi.borrow().line_comment.as_deref(), Some("inline note"));
        let (title_key, _) = root.get("info").unwrap().get_entry("title").unwrap();
        assert_eq!(
            title_key.borrow().head_comment.as_deref(),
            Some("About the title."),
        );
    }

    #[test]
    fn sequences_block_and_compact() {
        let doc = parse(indoc! {"
            tags:
              - name: pets
                description: All pets
              - name: stores
            plain:
              - 1
              - 2
        "})
        .unwrap();
        let root = doc.unwrap_document();
        let tags = root.get("tags").unwrap();
        let items = tags.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("name").unwrap().value(), "pets");
        assert_eq!(items[0].get("description").unwrap().value(), "All pets");
        assert_eq!(items[1].get("name").unwrap().value(), "stores");
        let plain: Vec<_> = root
            .get("plain")
            .unwrap()
            .items()
            .iter()
            .map(Node::value)
            .collect();
        assert_eq!(plain, ["1", "2"]);
    }

    #[test]
    fn sequence_at_key_indent() {
        let doc = parse(indoc! {"
            tags:
            - name: pets
            - name: stores
            next: value
        "})
        .unwrap();
        let root = doc.unwrap_document();
        assert_eq!(root.get("tags").unwrap().items().len(), 2);
        assert_eq!(root.get("next").unwrap().value(), "value");
    }

    #[test]
    fn nested_dash_only_items() {
        let doc = parse(indoc! {"
            matrix:
              -
                - 1
                - 2
              -
                - 3
        "})
        .unwrap();
        let matrix = doc.unwrap_document().get("matrix").unwrap();
        let rows = matrix.items();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].items().len(), 2);
        assert_eq!(rows[1].items()[0].value(), "3");
    }

    #[test]
    fn quoted_scalars() {
        let doc = parse(indoc! {r#"
            double: "line\nbreak \u0041"
            single: 'it''s fine'
            "quoted key": yes
        "#})
        .unwrap();
        let root = doc.unwrap_document();
        let double = root.get("double").unwrap();
        assert_eq!(double.value(), "line\nbreak A");
        assert_eq!(double.style(), Style::DoubleQuoted);
        let single = root.get("single").unwrap();
        assert_eq!(single.value(), "it's fine");
        assert_eq!(single.style(), Style::SingleQuoted);
        assert!(root.get("quoted key").is_some());
    }

    #[test]
    fn block_scalars() {
        let doc = parse(indoc! {"
            literal: |
              first line
                indented
              last line
            stripped: |-
              no trailing newline
            folded: >
              folded
              text
        "})
        .unwrap();
        let root = doc.unwrap_document();
        let literal = root.get("literal").unwrap();
        assert_eq!(literal.style(), Style::Literal);
        assert_eq!(literal.value(), "first line\n  indented\nlast line\n");
        let stripped = root.get("stripped").unwrap();
        assert_eq!(stripped.value(), "no trailing newline");
        assert_eq!(root.get("folded").unwrap().style(), Style::Folded);
    }

    #[test]
    fn flow_collections() {
        let doc = parse(indoc! {"
            empty_map: {}
            empty_seq: []
            inline: {name: dog, age: 3}
            multi: [a, b,
              c]
        "})
        .unwrap();
        let root = doc.unwrap_document();
        assert!(root.get("empty_map").unwrap().is_mapping());
        assert!(root.get("empty_seq").unwrap().is_sequence());
        let inline = root.get("inline").unwrap();
        assert_eq!(inline.style(), Style::Flow);
        assert_eq!(inline.get("age").unwrap().tag(), Tag::Int);
        assert_eq!(root.get("multi").unwrap().items().len(), 3);
    }

    #[test]
    fn json_documents_parse() {
        let doc = parse(indoc! {r#"
            {
              "openapi": "3.0.1",
              "info": {
                "title": "Example",
                "version": "1.0.0"
              },
              "tags": [{"name": "pets"}]
            }
        "#})
        .unwrap();
        let root = doc.unwrap_document();
        assert_eq!(root.get("openapi").unwrap().value(), "3.0.1");
        assert_eq!(
            root.get("tags").unwrap().items()[0]
                .get("name")
                .unwrap()
                .value(),
            "pets",
        );
    }

    #[test]
    fn anchors_and_aliases() {
        let doc = parse(indoc! {"
            base: &shared
              kind: common
            copy: *shared
        "})
        .unwrap();
        let root = doc.unwrap_document();
        let base = root.get("base").unwrap();
        assert_eq!(base.borrow().anchor.as_deref(), Some("shared"));
        let copy = root.get("copy").unwrap();
        assert_eq!(copy.kind(), Kind::Alias);
        assert_eq!(copy.value(), "shared");
    }

    #[test]
    fn multiline_plain_scalar() {
        let doc = parse(indoc! {"
            description: wraps onto
              a second line
            next: value
        "})
        .unwrap();
        let root = doc.unwrap_document();
        assert_eq!(
            root.get("description").unwrap().value(),
            "wraps onto a second line",
        );
        assert_eq!(root.get("next").unwrap().value(), "value");
    }

    #[test]
    fn duplicate_keys_rejected() {
        let err = parse("a: 1\na: 2\n").unwrap_err();
        assert!(err.message.contains("duplicate"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn document_markers() {
        let doc = parse("---\nkey: value\n...\nignored: true\n").unwrap();
        let root = doc.unwrap_document();
        assert_eq!(root.get("key").unwrap().value(), "value");
        assert!(root.get("ignored").is_none());
    }

    #[test]
    fn tab_indentation_rejected() {
        let err = parse("a:\n\tb: 1\n").unwrap_err();
        assert!(err.message.contains("tab"));
    }

    #[test]
    fn unterminated_quote_rejected() {
        assert!(parse("bad: \"no end\n").is_err());
        assert!(parse("bad: {a: 1\n").is_err());
    }

    #[test]
    fn scalar_root() {
        let doc = parse("just a scalar\n").unwrap();
        let root = doc.unwrap_document();
        assert!(root.is_scalar());
        assert_eq!(root.value(), "just a scalar");
    }

    #[test]
    fn sequence_root() {
        let doc = parse("- one\n- two\n").unwrap();
        let root = doc.unwrap_document();
        assert!(root.is_sequence());
        assert_eq!(root.items().len(), 2);
    }
}
