use std::{collections::VecDeque, fmt::Display};

use anyhow::anyhow;
use indexmap::IndexSet;
use regex::Regex;

/// A table or view name exactly as written, schema qualifier included.
/// Stops at whitespace, parentheses, commas and semicolons.
const IDENTIFIER: &str = r"[^\s(),;]+";

/// Keywords only count at the start of the text or after whitespace or `(`.
const KEYWORD_BOUNDARY: &str = r"(?:^|[\s(])";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    AmbiguousDestination { candidates: Vec<String> },
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::AmbiguousDestination { candidates } => write!(
                f,
                "Statement defines more than one destination: {}",
                candidates
                    .iter()
                    .map(|name| format!("`{}`", name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// "`destination` is derived from each of `sources`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub destination: String,
    pub sources: IndexSet<String>,
}

/// Extracts table-level dependencies from single SQL statements.
///
/// Statements are expected to be comment-free (see
/// [`crate::scanner::strip_comments`]). Matching is purely textual: there is
/// no notion of nesting level, so a table referenced inside a subquery is a
/// source just like one in the outer query.
#[derive(Debug, Clone)]
pub struct Analyzer {
    destination: Regex,
    cte_start: Regex,
    cte_continuation: Regex,
    source: Regex,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        let destination = format!(
            r"(?i){KEYWORD_BOUNDARY}(?:CREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:TEMPORARY|TEMP)\s+)?(?:TABLE|VIEW)(?:\s+IF\s+NOT\s+EXISTS)?|INSERT(?:\s+INTO)?)\s+({IDENTIFIER})"
        );
        let cte_start = format!(
            r"(?i)(?:^|[\s(,])WITH\s+(?:RECURSIVE\s+)?({IDENTIFIER})\s+AS\s*\("
        );
        let cte_continuation = format!(r"(?i)^\s*,\s*({IDENTIFIER})\s+AS\s*\(");
        let source = format!(r"(?i){KEYWORD_BOUNDARY}(?:FROM|JOIN)\s+({IDENTIFIER})");

        Self {
            destination: Regex::new(&destination).expect("invalid destination pattern"),
            cte_start: Regex::new(&cte_start).expect("invalid cte pattern"),
            cte_continuation: Regex::new(&cte_continuation)
                .expect("invalid cte continuation pattern"),
            source: Regex::new(&source).expect("invalid source pattern"),
        }
    }

    /// Returns the table or view the statement creates or inserts into.
    ///
    /// Recognizes `CREATE [OR REPLACE] [TEMP|TEMPORARY] TABLE|VIEW [IF NOT EXISTS]`,
    /// `INSERT INTO` and bare `INSERT`. More than one match in the same
    /// statement is an [`AnalysisError::AmbiguousDestination`].
    pub fn destination(&self, statement: &str) -> anyhow::Result<Option<String>> {
        let mut candidates: Vec<String> = self
            .destination
            .captures_iter(statement)
            .filter_map(|captures| captures.get(1))
            .map(|name| name.as_str().to_owned())
            .collect();

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => Err(anyhow!(AnalysisError::AmbiguousDestination { candidates })),
        }
    }

    /// Returns the names defined by every `WITH name AS (...)` clause of the
    /// statement, chained definitions (`, name AS (...)`) and clauses nested
    /// inside CTE bodies included.
    pub fn cte_names(&self, statement: &str) -> IndexSet<String> {
        let mut names = IndexSet::new();
        // Spans still to be searched for WITH clauses: the whole statement and
        // then every CTE body found along the way.
        let mut pending = VecDeque::from([(0, statement.len())]);

        while let Some((start, end)) = pending.pop_front() {
            let mut cursor = start;
            while let Some(captures) = self.cte_start.captures(&statement[cursor..end]) {
                let (Some(with), Some(name)) = (captures.get(0), captures.get(1)) else {
                    break;
                };
                self.record_cte(&mut names, name.as_str());
                let mut open = cursor + with.end() - 1;

                // Walk the chain `name AS (...), name AS (...), ...`.
                loop {
                    let Some(close) = matching_paren(&statement[..end], open) else {
                        log::warn!(
                            "Unbalanced parentheses in body of CTE starting at byte {}",
                            open
                        );
                        pending.push_back((open + 1, end));
                        cursor = end;
                        break;
                    };
                    pending.push_back((open + 1, close));
                    cursor = close + 1;

                    let Some(next) = self.cte_continuation.captures(&statement[cursor..end])
                    else {
                        break;
                    };
                    let (Some(definition), Some(name)) = (next.get(0), next.get(1)) else {
                        break;
                    };
                    self.record_cte(&mut names, name.as_str());
                    open = cursor + definition.end() - 1;
                }
            }
        }

        names
    }

    fn record_cte(&self, names: &mut IndexSet<String>, name: &str) {
        log::debug!("Found CTE `{}`", name);
        names.insert(name.to_owned());
    }

    /// Returns every identifier following `FROM` or `JOIN`, at any nesting level.
    pub fn sources(&self, statement: &str) -> IndexSet<String> {
        self.source
            .captures_iter(statement)
            .filter_map(|captures| captures.get(1))
            .map(|name| name.as_str().to_owned())
            .collect()
    }

    /// Resolves the statement into a dependency edge: its destination and
    /// every source that is not one of its own CTEs.
    ///
    /// Returns `None` for statements without a destination.
    pub fn dependency(&self, statement: &str) -> anyhow::Result<Option<DependencyEdge>> {
        let Some(destination) = self.destination(statement)? else {
            return Ok(None);
        };
        let cte_names = self.cte_names(statement);
        let sources = self
            .sources(statement)
            .into_iter()
            .filter(|source| !cte_names.contains(source))
            .collect();

        Ok(Some(DependencyEdge {
            destination,
            sources,
        }))
    }
}

/// Returns the position of the `)` closing the `(` at byte `open`.
///
/// Every parenthesis counts, including ones inside string literals. Returns
/// `None` if there is no `(` at `open` or it is never closed.
pub fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut depth: usize = 0;
    for (idx, &byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_matching_paren() {
        let text = "x (a (b) (c (d))) y";
        assert_eq!(matching_paren(text, 2), Some(16));
        assert_eq!(matching_paren(text, 5), Some(7));
        assert_eq!(matching_paren(text, 0), None);
        assert_eq!(matching_paren("((unclosed)", 0), None);
        assert_eq!(matching_paren("(", 5), None);
    }

    #[test]
    fn test_destination() {
        let analyzer = Analyzer::new();
        let cases = [
            ("CREATE TABLE t AS SELECT 1", Some("t")),
            ("create table if not exists s.t (id int)", Some("s.t")),
            ("CREATE VIEW v AS SELECT * FROM x", Some("v")),
            ("CREATE VIEW IF NOT EXISTS v AS SELECT 1", Some("v")),
            ("CREATE TEMP TABLE tmp AS SELECT 1", Some("tmp")),
            ("CREATE OR REPLACE VIEW v AS SELECT 1", Some("v")),
            ("INSERT INTO t(a, b) SELECT a, b FROM x", Some("t")),
            ("\n  insert t select * from x", Some("t")),
            ("SELECT * FROM x", None),
            ("DROP TABLE t", None),
            ("   \n", None),
        ];
        for (statement, expected) in cases {
            assert_eq!(
                analyzer.destination(statement).unwrap().as_deref(),
                expected,
                "statement: {}",
                statement
            );
        }
    }

    #[test]
    fn test_ambiguous_destination() {
        let analyzer = Analyzer::new();
        let err = analyzer
            .destination("CREATE TABLE a (id int); CREATE TABLE b (id int)")
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::AmbiguousDestination {
                candidates: vec!["a".to_owned(), "b".to_owned()]
            })
        );
        assert_eq!(
            err.to_string(),
            "Statement defines more than one destination: `a`, `b`"
        );
    }

    #[test]
    fn test_cte_names_chain() {
        let analyzer = Analyzer::new();
        let statement = "CREATE TABLE t AS WITH a AS (SELECT * FROM x), b AS (SELECT * FROM a JOIN y) SELECT * FROM b";
        assert_eq!(analyzer.cte_names(statement), set(&["a", "b"]));
    }

    #[test]
    fn test_cte_names_nested_and_sequential() {
        let analyzer = Analyzer::new();
        let statement = "
            CREATE TABLE t AS
            WITH outer_cte AS (
                WITH inner_cte AS (SELECT (1 + (2)) AS n FROM x)
                SELECT * FROM inner_cte
            ) ,
            second AS(SELECT * FROM outer_cte)
            SELECT * FROM second
            UNION ALL
            SELECT * FROM (WITH late AS (SELECT * FROM y) SELECT * FROM late) sub";
        assert_eq!(
            analyzer.cte_names(statement),
            set(&["outer_cte", "second", "late", "inner_cte"])
        );
    }

    #[test]
    fn test_cte_names_recursive_and_case_insensitive() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.cte_names("with recursive r as (select 1 union all select n from r) select * from r"),
            set(&["r"])
        );
    }

    #[test]
    fn test_cte_names_empty() {
        let analyzer = Analyzer::new();
        assert!(analyzer.cte_names("SELECT * FROM x").is_empty());
        assert!(analyzer.cte_names("").is_empty());
    }

    #[test]
    fn test_cte_names_unbalanced_body() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.cte_names("WITH a AS (SELECT ')' , b AS (SELECT 1) SELECT 1"),
            set(&["a"])
        );
        assert_eq!(
            analyzer.cte_names("WITH a AS (SELECT (1 FROM x"),
            set(&["a"])
        );
    }

    #[test]
    fn test_sources() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer.sources(
                "SELECT * FROM s.x LEFT JOIN y ON x.id = y.id WHERE id IN (SELECT id FROM z)"
            ),
            set(&["s.x", "y", "z"])
        );
        assert_eq!(analyzer.sources("select * from (select 1) q"), set(&[]));
        assert_eq!(analyzer.sources("SELECT 1"), set(&[]));
    }

    #[test]
    fn test_dependency() {
        let analyzer = Analyzer::new();
        let statement = "CREATE TABLE t AS WITH a AS (SELECT * FROM x), b AS (SELECT * FROM a JOIN y) SELECT * FROM b";
        assert_eq!(analyzer.sources(statement), set(&["x", "a", "y", "b"]));
        assert_eq!(
            analyzer.dependency(statement).unwrap(),
            Some(DependencyEdge {
                destination: "t".to_owned(),
                sources: set(&["x", "y"]),
            })
        );
    }

    #[test]
    fn test_dependency_without_destination() {
        let analyzer = Analyzer::new();
        assert_eq!(
            analyzer
                .dependency("WITH a AS (SELECT * FROM x) SELECT * FROM a")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_dependency_without_sources() {
        let analyzer = Analyzer::new();
        let edge = analyzer
            .dependency("CREATE TABLE t (id INT)")
            .unwrap()
            .unwrap();
        assert_eq!(edge.destination, "t");
        assert!(edge.sources.is_empty());
    }
}
