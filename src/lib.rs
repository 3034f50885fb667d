//! # sqlineage
//!
//! A library for extracting table-level lineage from collections of SQL scripts.
//!
//! # Features
//!
//! - Find the table or view each statement creates or inserts into.
//! - Collect the tables it reads from (`FROM`/`JOIN`), at any nesting level.
//! - Leave out the statement's own common table expressions, chained and nested ones included.
//! - Render the resulting graph as a PlantUML class diagram.
//!
//! The extraction is heuristic and works on the text of the statements: there is no
//! SQL parser behind it, and names are kept exactly as written.
//!
//! # Example
//!
//! ```rust
//! use sqlineage::extract_graph;
//!
//! fn main() -> anyhow::Result<()> {
//!     let sql = r#"
//!         CREATE TABLE orders_summary AS
//!         WITH recent AS (SELECT * FROM orders WHERE created_at > '2024-01-01')
//!         SELECT * FROM recent JOIN customers ON recent.cust_id = customers.id;
//!     "#;
//!     let graph = extract_graph(&[sql])?;
//!     assert!(graph.relations().contains("orders <|-- orders_summary"));
//!     assert!(graph.relations().contains("customers <|-- orders_summary"));
//!     println!("{}", graph.render());
//!     Ok(())
//! }
//! ```
pub mod graph;
pub mod lineage;
pub mod scanner;

pub use graph::{DependencyGraph, DiagramStyle};
pub use lineage::{AnalysisError, Analyzer, DependencyEdge};

/// Builds the dependency graph of `scripts`, analyzed in order.
///
/// Fails on the first statement with an ambiguous destination.
pub fn extract_graph<S: AsRef<str>>(scripts: &[S]) -> anyhow::Result<DependencyGraph> {
    let analyzer = Analyzer::new();
    let mut graph = DependencyGraph::new();
    for script in scripts {
        graph.extend_from_script(&analyzer, script.as_ref())?;
    }
    Ok(graph)
}
