use indexmap::{IndexMap, IndexSet};

use crate::{
    lineage::{Analyzer, DependencyEdge},
    scanner::{split_statements, strip_comments},
};

/// Layout directives written at the top of every diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramStyle {
    pub directives: Vec<String>,
}

impl Default for DiagramStyle {
    fn default() -> Self {
        Self {
            directives: [
                "skinparam padding 10",
                "left to right direction",
                "hide members",
                "hide circle",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// Table-level lineage of a set of scripts: every destination mapped to the
/// tables it is built from.
///
/// A destination defined more than once keeps only its latest definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge, replacing any earlier edge with the same destination.
    /// Returns the replaced sources.
    pub fn insert(&mut self, edge: DependencyEdge) -> Option<IndexSet<String>> {
        let replaced = self.edges.insert(edge.destination.clone(), edge.sources);
        if replaced.is_some() {
            log::debug!(
                "Destination `{}` redefined, keeping the latest",
                edge.destination
            );
        }
        replaced
    }

    /// Analyzes every statement of a raw script and adds the resulting edges.
    /// Returns the number of statements that produced an edge.
    ///
    /// Stops at the first statement with an ambiguous destination.
    pub fn extend_from_script(
        &mut self,
        analyzer: &Analyzer,
        script: &str,
    ) -> anyhow::Result<usize> {
        let stripped = strip_comments(script);
        let mut n_edges = 0;
        for statement in split_statements(&stripped) {
            if let Some(edge) = analyzer.dependency(statement)? {
                log::debug!("{} <- {:?}", edge.destination, edge.sources);
                self.insert(edge);
                n_edges += 1;
            }
        }
        Ok(n_edges)
    }

    pub fn get(&self, destination: &str) -> Option<&IndexSet<String>> {
        self.edges.get(destination)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&String, &IndexSet<String>)> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Distinct `base <|-- derived` relations, one per (source, destination) pair.
    pub fn relations(&self) -> IndexSet<String> {
        self.edges
            .iter()
            .flat_map(|(derived, bases)| {
                bases
                    .iter()
                    .map(move |base| format!("{} <|-- {}", base, derived))
            })
            .collect()
    }

    pub fn render(&self) -> String {
        self.render_with(&DiagramStyle::default())
    }

    /// Renders the graph as a PlantUML document.
    pub fn render_with(&self, style: &DiagramStyle) -> String {
        let mut out = String::from("@startuml\n");
        for line in style.directives.iter().chain(self.relations().iter()) {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("@enduml\n");
        out
    }
}

impl FromIterator<DependencyEdge> for DependencyGraph {
    fn from_iter<T: IntoIterator<Item = DependencyEdge>>(iter: T) -> Self {
        let mut graph = DependencyGraph::new();
        for edge in iter {
            graph.insert(edge);
        }
        graph
    }
}
