//! Text-level preprocessing of SQL scripts: comment removal and
//! statement splitting.
//!
//! Nothing here knows about string literals. A `--` or `/*` inside a
//! quoted string is treated as a comment marker, and a `;` inside a string
//! ends the statement.

const BLOCK_COMMENT_START: &[u8] = b"/*";
const BLOCK_COMMENT_END: &[u8] = b"*/";
const LINE_COMMENT: &str = "--";
const STATEMENT_TERMINATOR: char = ';';

/// Removes block comments and then line comments from `sql`.
///
/// Line structure is preserved: a commented-out line keeps its line ending.
pub fn strip_comments(sql: &str) -> String {
    let without_blocks = strip_block_comments(sql);
    strip_line_comments(&without_blocks)
}

/// Removes `/* ... */` comments.
///
/// Comments do not nest: a start marker inside a comment is ignored, and the
/// first end marker closes the comment. An unterminated comment is kept
/// verbatim.
pub fn strip_block_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut stripped = String::with_capacity(sql.len());
    let mut comment_start: Option<usize> = None;
    let mut emit_from = 0;
    let mut current = 0;

    while current + 1 < bytes.len() {
        let marker = &bytes[current..current + 2];
        if marker == BLOCK_COMMENT_START {
            if comment_start.is_none() {
                comment_start = Some(current);
            }
            current += 2;
        } else if marker == BLOCK_COMMENT_END {
            if let Some(start) = comment_start.take() {
                stripped.push_str(&sql[emit_from..start]);
                emit_from = current + 2;
            }
            current += 2;
        } else {
            current += 1;
        }
    }

    stripped.push_str(&sql[emit_from..]);
    stripped
}

/// Truncates every line at its first `--`.
pub fn strip_line_comments(sql: &str) -> String {
    sql.split_inclusive('\n')
        .map(|line| {
            let content = line.trim_end_matches(['\r', '\n']);
            let line_ending = &line[content.len()..];
            match content.find(LINE_COMMENT) {
                Some(idx) => format!("{}{}", &content[..idx], line_ending),
                None => line.to_owned(),
            }
        })
        .collect()
}

/// Splits a comment-stripped script on `;`.
///
/// Empty and whitespace-only pieces, including the one after a final
/// terminator, are kept.
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(STATEMENT_TERMINATOR).collect()
}

/// Strips comments from each script independently and returns all of their
/// statements, in script order and then in order within each script.
pub fn scan_statements<S: AsRef<str>>(scripts: &[S]) -> Vec<String> {
    scripts
        .iter()
        .flat_map(|script| {
            let stripped = strip_comments(script.as_ref());
            split_statements(&stripped)
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}
