//! Evaluation order over a group
//!
//! Depth-first topological numbering: when a vertex finishes (all of its
//! successors visited) it takes the highest unused rank, counting down from
//! `vertex_count - 1`. Sorting by rank puts every producer before every
//! consumer. A back edge means the connections form a cycle and is reported
//! as [`Error::CyclicGraph`] instead of producing a bogus order.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::graph::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Numbering<'a> {
    vertices: Vec<&'a str>,
    adjacency: Vec<Vec<usize>>,
    marks: Vec<Mark>,
    ranks: Vec<usize>,
    next_rank: usize,
    stack: Vec<usize>,
}

impl<'a> Numbering<'a> {
    fn new(group: &'a Group) -> Self {
        let vertices: Vec<&str> = group
            .objects
            .iter()
            .map(|o| o.name.as_str())
            .chain(group.rules.iter().map(|r| r.name.as_str()))
            .collect();
        let index: HashMap<&str, usize> = vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();

        let mut adjacency = vec![Vec::new(); vertices.len()];
        for c in &group.connections {
            if let (Some(&from), Some(&to)) = (index.get(c.source.as_str()), index.get(c.target.as_str())) {
                if !adjacency[from].contains(&to) {
                    adjacency[from].push(to);
                }
            }
        }

        let n = vertices.len();
        Self {
            vertices,
            adjacency,
            marks: vec![Mark::Unvisited; n],
            ranks: vec![0; n],
            next_rank: n.saturating_sub(1),
            stack: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) -> Result<()> {
        self.marks[v] = Mark::InProgress;
        self.stack.push(v);

        for i in 0..self.adjacency[v].len() {
            let w = self.adjacency[v][i];
            match self.marks[w] {
                Mark::Unvisited => self.visit(w)?,
                Mark::InProgress => {
                    let start = self.stack.iter().position(|&s| s == w).unwrap_or(0);
                    return Err(Error::CyclicGraph {
                        nodes: self.stack[start..]
                            .iter()
                            .map(|&s| self.vertices[s].to_string())
                            .collect(),
                    });
                }
                Mark::Done => {}
            }
        }

        self.stack.pop();
        self.marks[v] = Mark::Done;
        self.ranks[v] = self.next_rank;
        self.next_rank = self.next_rank.saturating_sub(1);
        Ok(())
    }
}

/// Rank of every object and rule; `rank(u) < rank(v)` for each edge `u → v`
pub fn ranks(group: &Group) -> Result<HashMap<String, usize>> {
    let mut numbering = Numbering::new(group);
    for v in 0..numbering.vertices.len() {
        if numbering.marks[v] == Mark::Unvisited {
            numbering.visit(v)?;
        }
    }

    Ok(numbering
        .vertices
        .iter()
        .zip(&numbering.ranks)
        .map(|(v, r)| (v.to_string(), *r))
        .collect())
}

/// Node names in evaluation order (producers first)
pub fn evaluation_order(group: &Group) -> Result<Vec<String>> {
    let mut ranked: Vec<(String, usize)> = ranks(group)?.into_iter().collect();
    ranked.sort_by_key(|(_, rank)| *rank);
    Ok(ranked.into_iter().map(|(name, _)| name).collect())
}
