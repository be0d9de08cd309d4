//! Site connectivity derived from the transmission table.
//!
//! Regions are carved out of this graph: a region's "outside" set is every
//! site one transmission hop away that does not belong to the region.

use crate::data::ModelData;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Degree and component summary used by `decomp inspect`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyStats {
    pub site_count: usize,
    pub link_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub max_degree: usize,
}

/// Undirected site graph; one edge per unordered site pair with at least
/// one transmission technology between them.
#[derive(Debug, Clone)]
pub struct SiteGraph {
    graph: UnGraph<String, ()>,
    index: BTreeMap<String, NodeIndex>,
}

impl SiteGraph {
    pub fn from_data(data: &ModelData) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut index = BTreeMap::new();
        for site in data.sites.keys() {
            index.insert(site.clone(), graph.add_node(site.clone()));
        }
        let mut pairs = BTreeSet::new();
        for key in data.transmissions.keys() {
            let pair = if key.site_in <= key.site_out {
                (key.site_in.clone(), key.site_out.clone())
            } else {
                (key.site_out.clone(), key.site_in.clone())
            };
            pairs.insert(pair);
        }
        for (a, b) in pairs {
            // Links to sites outside the table (coupled files) have no node.
            if let (Some(&ia), Some(&ib)) = (index.get(&a), index.get(&b)) {
                graph.add_edge(ia, ib, ());
            }
        }
        Self { graph, index }
    }

    /// Sites adjacent to `region` that are not part of it.
    pub fn outside_neighbors(&self, region: &BTreeSet<String>) -> BTreeSet<String> {
        let mut outside = BTreeSet::new();
        for site in region {
            let Some(&node) = self.index.get(site) else {
                continue;
            };
            for neighbor in self.graph.neighbors(node) {
                let name = &self.graph[neighbor];
                if !region.contains(name) {
                    outside.insert(name.clone());
                }
            }
        }
        outside
    }

    pub fn stats(&self) -> TopologyStats {
        let degrees: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors(n).count())
            .collect();
        TopologyStats {
            site_count: self.graph.node_count(),
            link_count: self.graph.edge_count(),
            connected_components: connected_components(&self.graph),
            min_degree: degrees.iter().copied().min().unwrap_or(0),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
        }
    }

    /// Connected groups of sites (breadth-first), each sorted by name.
    pub fn islands(&self) -> Vec<BTreeSet<String>> {
        let mut visited = BTreeSet::new();
        let mut islands = Vec::new();
        for start in self.graph.node_indices() {
            if visited.contains(&start) {
                continue;
            }
            let mut members = BTreeSet::new();
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                if !visited.insert(node) {
                    continue;
                }
                members.insert(self.graph[node].clone());
                queue.extend(self.graph.neighbors(node).filter(|n| !visited.contains(n)));
            }
            islands.push(members);
        }
        islands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Site, Transmission};
    use crate::keys::TraKey;

    fn chain() -> ModelData {
        let mut data = ModelData::new();
        for s in ["A", "B", "C", "D"] {
            data.sites.insert(s.into(), Site::default());
        }
        for (a, b) in [("A", "B"), ("B", "C")] {
            let key = TraKey::new(a, b, "hvac", "Elec");
            data.transmissions
                .insert(key.reversed(), Transmission::default());
            data.transmissions.insert(key, Transmission::default());
        }
        data
    }

    #[test]
    fn test_outside_neighbors() {
        let graph = SiteGraph::from_data(&chain());
        let region: BTreeSet<String> = ["B".to_string()].into();
        let outside = graph.outside_neighbors(&region);
        assert_eq!(outside.len(), 2);
        assert!(outside.contains("A") && outside.contains("C"));
    }

    #[test]
    fn test_stats_and_islands() {
        let graph = SiteGraph::from_data(&chain());
        let stats = graph.stats();
        assert_eq!(stats.site_count, 4);
        assert_eq!(stats.link_count, 2);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.min_degree, 0);
        assert_eq!(graph.islands().len(), 2);
    }
}
