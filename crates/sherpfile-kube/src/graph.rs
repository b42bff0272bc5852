//! Release dependency graph
//!
//! Releases are grouped by dependency depth, much like sync waves: every
//! release in group *n* only needs releases placed in earlier groups, so all
//! members of a group can run at the same time.
//!
//! # Example
//!
//! ```yaml
//! releases:
//!   - name: database        # group 1
//!     chart: charts/postgres
//!   - name: backend         # group 2
//!     chart: charts/backend
//!     needs: [database]
//!   - name: frontend        # group 3
//!     chart: charts/frontend
//!     needs: [backend]
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use sherpfile_core::{ReleaseId, ReleaseSpec, Selector};

use crate::actions::NeedsPolicy;
use crate::error::{KubeError, Result};

/// A release in the working set with its resolved needs
#[derive(Debug, Clone)]
pub struct ReleaseNode {
    /// Position in the document's release list
    pub index: usize,
    /// Qualified identity
    pub id: ReleaseId,
    /// The release itself
    pub release: ReleaseSpec,
    /// Resolved needs inside the working set
    pub needs: Vec<ReleaseId>,
    /// Matched by the selector (false when pulled in through needs)
    pub selected: bool,
}

/// A release placed into a group
#[derive(Debug, Clone)]
pub struct PlannedRelease {
    /// Position in the document's release list
    pub index: usize,
    pub id: ReleaseId,
    pub release: ReleaseSpec,
    /// Releases that must finish first, in this pass's direction
    pub waits_for: Vec<ReleaseId>,
}

/// Releases that can run concurrently
#[derive(Debug, Clone)]
pub struct Group {
    /// 1-based group number
    pub number: usize,
    pub releases: Vec<PlannedRelease>,
}

impl Group {
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.releases.iter().map(|r| r.id.to_string()).collect()
    }
}

/// Dependency graph over the releases in scope
#[derive(Debug, Clone, Default)]
pub struct ReleaseGraph {
    nodes: Vec<ReleaseNode>,
}

impl ReleaseGraph {
    /// Build the graph for the releases matched by `selector`
    ///
    /// The working set is the selection plus whatever `policy` pulls in.
    /// Needs of releases in the working set must name a declared release.
    pub fn build(releases: &[ReleaseSpec], selector: &Selector, policy: NeedsPolicy) -> Result<Self> {
        let selected: Vec<bool> = releases.iter().map(|r| selector.matches(r)).collect();

        let mut seen = HashSet::new();
        for (release, _) in releases.iter().zip(&selected).filter(|(_, s)| **s) {
            if !seen.insert(release.id()) {
                return Err(KubeError::DuplicateRelease {
                    id: release.id().to_string(),
                });
            }
        }

        // A selected release wins over an unselected one with the same identity
        let mut by_id: HashMap<ReleaseId, usize> = HashMap::new();
        for (index, release) in releases.iter().enumerate() {
            let entry = by_id.entry(release.id()).or_insert(index);
            if selected[index] && !selected[*entry] {
                *entry = index;
            }
        }

        let mut in_set = selected.clone();
        match policy {
            NeedsPolicy::Strict | NeedsPolicy::SkipNeeds => {}
            NeedsPolicy::IncludeNeeds => {
                for index in (0..releases.len()).filter(|&i| selected[i]) {
                    for target in resolve_needs(&releases[index], &by_id)? {
                        in_set[target] = true;
                    }
                }
            }
            NeedsPolicy::IncludeTransitiveNeeds => {
                let mut queue: VecDeque<usize> = (0..releases.len()).filter(|&i| selected[i]).collect();
                while let Some(index) = queue.pop_front() {
                    for target in resolve_needs(&releases[index], &by_id)? {
                        if !in_set[target] {
                            in_set[target] = true;
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        let mut nodes = Vec::new();
        for (index, release) in releases.iter().enumerate().filter(|(i, _)| in_set[*i]) {
            let mut needs = Vec::new();
            for target in resolve_needs(release, &by_id)? {
                if in_set[target] {
                    needs.push(releases[target].id());
                } else if policy == NeedsPolicy::Strict {
                    return Err(KubeError::NeedNotSelected {
                        release: release.id().to_string(),
                        need: releases[target].id().to_string(),
                    });
                } else {
                    tracing::debug!(
                        release = %release.id(),
                        need = %releases[target].id(),
                        "dropping need on a release outside the selection"
                    );
                }
            }
            nodes.push(ReleaseNode {
                index,
                id: release.id(),
                release: release.clone(),
                needs,
                selected: selected[index],
            });
        }

        Ok(Self { nodes })
    }

    /// Releases in the working set, in declaration order
    pub fn nodes(&self) -> &[ReleaseNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Layered topological order
    ///
    /// With `reverse`, edges are inverted so dependents come first, as
    /// deletion requires. Within a group, declaration order is kept.
    pub fn groups(&self, reverse: bool) -> Result<Vec<Group>> {
        let position: HashMap<&ReleaseId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(p, node)| (&node.id, p))
            .collect();

        let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (p, node) in self.nodes.iter().enumerate() {
            for need in &node.needs {
                let Some(&q) = position.get(need) else {
                    continue;
                };
                if reverse {
                    prerequisites[q].push(p);
                } else {
                    prerequisites[p].push(q);
                }
            }
        }

        let mut placed = vec![false; self.nodes.len()];
        let mut remaining = self.nodes.len();
        let mut groups = Vec::new();

        while remaining > 0 {
            let ready: Vec<usize> = (0..self.nodes.len())
                .filter(|&p| !placed[p] && prerequisites[p].iter().all(|&q| placed[q]))
                .collect();

            if ready.is_empty() {
                let releases = (0..self.nodes.len())
                    .filter(|&p| !placed[p])
                    .map(|p| self.nodes[p].id.to_string())
                    .collect();
                return Err(KubeError::Cycle { releases });
            }

            for &p in &ready {
                placed[p] = true;
            }
            remaining -= ready.len();

            let releases = ready
                .into_iter()
                .map(|p| {
                    let node = &self.nodes[p];
                    PlannedRelease {
                        index: node.index,
                        id: node.id.clone(),
                        release: node.release.clone(),
                        waits_for: prerequisites[p].iter().map(|&q| self.nodes[q].id.clone()).collect(),
                    }
                })
                .collect();
            groups.push(Group {
                number: groups.len() + 1,
                releases,
            });
        }

        Ok(groups)
    }
}

fn resolve_needs(release: &ReleaseSpec, by_id: &HashMap<ReleaseId, usize>) -> Result<Vec<usize>> {
    let mut targets = Vec::new();
    for (raw, id) in release.needs.iter().zip(release.resolved_needs()?) {
        let target = by_id.get(&id).copied().ok_or_else(|| KubeError::UnknownNeed {
            release: release.id().to_string(),
            need: raw.clone(),
        })?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Summary of a plan for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub groups: Vec<GroupSummary>,
    pub total_releases: usize,
}

/// Summary of a single group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub number: usize,
    pub releases: Vec<String>,
}

impl PlanSummary {
    pub fn from_groups(groups: &[Group]) -> Self {
        let groups: Vec<GroupSummary> = groups
            .iter()
            .map(|g| GroupSummary {
                number: g.number,
                releases: g.ids(),
            })
            .collect();
        let total_releases = groups.iter().map(|g| g.releases.len()).sum();
        Self { groups, total_releases }
    }

    /// Format as a human-readable string
    pub fn display(&self) -> String {
        let mut lines = vec![format!(
            "Plan: {} {} in {} {}",
            self.total_releases,
            plural(self.total_releases, "release"),
            self.groups.len(),
            plural(self.groups.len(), "group")
        )];

        for group in &self.groups {
            lines.push(format!(
                "  Group {}: {} {}",
                group.number,
                group.releases.len(),
                plural(group.releases.len(), "release")
            ));
            for release in &group.releases {
                lines.push(format!("    - {}", release));
            }
        }

        lines.join("\n")
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
