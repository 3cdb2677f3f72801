use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Adjacency list: node -> successors, in declared order.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node -> predecessors.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
  /// Nodes with multiple incoming edges.
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a graph from node names (in declaration order) and the edge map.
  ///
  /// Edge endpoints are assumed to exist; validation happens before this.
  pub fn new(node_names: &[String], edges: &BTreeMap<String, Vec<String>>) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for name in node_names {
      adjacency.entry(name.clone()).or_default();
      reverse_adjacency.entry(name.clone()).or_default();
    }

    // Walk sources in declaration order so predecessor lists are stable
    for from in node_names {
      let Some(targets) = edges.get(from) else {
        continue;
      };
      for to in targets {
        adjacency.entry(from.clone()).or_default().push(to.clone());
        let preds = reverse_adjacency.entry(to.clone()).or_default();
        if !preds.contains(from) {
          preds.push(from.clone());
        }
      }
    }

    let entry_points: Vec<String> = node_names
      .iter()
      .filter(|name| reverse_adjacency.get(*name).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(name, _)| name.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      join_points,
    }
  }

  /// Nodes with no incoming edges.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Declared successors of a node.
  pub fn successors(&self, name: &str) -> &[String] {
    self
      .adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Direct predecessors of a node.
  pub fn predecessors(&self, name: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a node has multiple incoming edges.
  pub fn is_join_point(&self, name: &str) -> bool {
    self.join_points.contains(name)
  }

  pub fn join_points(&self) -> &HashSet<String> {
    &self.join_points
  }

  /// All nodes reachable from `start`, including `start`.
  pub fn reachable_from(&self, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(name) = queue.pop_front() {
      if !seen.insert(name.clone()) {
        continue;
      }
      for next in self.successors(&name) {
        if !seen.contains(next) {
          queue.push_back(next.clone());
        }
      }
    }
    seen
  }

  /// Whether `to` is reachable from `from` through one or more edges.
  pub fn can_reach(&self, from: &str, to: &str) -> bool {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = self.successors(from).iter().map(|s| s.as_str()).collect();
    while let Some(name) = queue.pop_front() {
      if name == to {
        return true;
      }
      if seen.insert(name) {
        queue.extend(self.successors(name).iter().map(|s| s.as_str()));
      }
    }
    false
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn diamond() -> Graph {
    let names: Vec<String> = ["a", "b", "c", "d", "orphan"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    let mut edges = BTreeMap::new();
    edges.insert("a".to_string(), vec!["b".to_string(), "c".to_string()]);
    edges.insert("b".to_string(), vec!["d".to_string()]);
    edges.insert("c".to_string(), vec!["d".to_string()]);
    Graph::new(&names, &edges)
  }

  #[test]
  fn test_successors_keep_declared_order() {
    let graph = diamond();
    assert_eq!(graph.successors("a"), &["b".to_string(), "c".to_string()]);
    assert!(graph.successors("d").is_empty());
    assert!(graph.successors("missing").is_empty());
  }

  #[test]
  fn test_predecessors_and_join_points() {
    let graph = diamond();
    assert_eq!(graph.predecessors("d"), &["b".to_string(), "c".to_string()]);
    assert!(graph.is_join_point("d"));
    assert!(!graph.is_join_point("b"));
    assert_eq!(graph.join_points().len(), 1);
  }

  #[test]
  fn test_entry_points() {
    let graph = diamond();
    assert_eq!(graph.entry_points(), &["a".to_string(), "orphan".to_string()]);
  }

  #[test]
  fn test_reachability() {
    let graph = diamond();
    let reachable = graph.reachable_from("a");
    assert_eq!(reachable.len(), 4);
    assert!(!reachable.contains("orphan"));

    assert!(graph.can_reach("a", "d"));
    assert!(!graph.can_reach("d", "a"));
    assert!(!graph.can_reach("a", "a"));
  }
}
