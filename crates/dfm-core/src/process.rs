//! Process and Execute: the top-level pipeline document and its cross-site subtype.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::block::{Block, NodeId};
use crate::error::{Error, Result};

/// A `Block` subtype that additionally carries an optional target site. Nesting an
/// `Execute` inside a body schedules that subgraph on another site.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Execute {
    /// Site this block's body should run on; `None` means "wherever the enclosing
    /// process runs."
    pub site: Option<String>,
    /// The nodes belonging to this execute block.
    pub body: Block,
}

impl Execute {
    /// Whether this execute block targets a different site than `this_site`.
    #[must_use]
    pub fn targets_remote_site(&self, this_site: &str) -> bool {
        matches!(&self.site, Some(site) if site != this_site)
    }
}

/// The frozen, top-level pipeline document submitted by a client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Process {
    /// Discriminator, present on the wire for polymorphic dispatch symmetry with
    /// `FunctionCall`; always `"dfm.api.Process"`.
    #[serde(default = "process_api_class")]
    pub api_class: String,
    /// Optional target site for the whole process.
    pub site: Option<String>,
    /// Optional deadline. Always carries an explicit timezone on the wire; a bare
    /// local timestamp without an offset fails to parse into `DateTime<FixedOffset>`
    /// and is rejected at the HTTP boundary with 422, per the deadline invariant.
    pub deadline: Option<DateTime<FixedOffset>>,
    /// The top-level execute block.
    pub execute: Execute,
}

fn process_api_class() -> String {
    "dfm.api.Process".to_string()
}

impl Process {
    /// Construct a `Process` whose `execute.body` is built by `f`, which runs with an
    /// active block scope (see [`crate::block::with_block_scope`]).
    pub fn build<F>(site: Option<String>, deadline: Option<DateTime<FixedOffset>>, execute_site: Option<String>, f: F) -> Result<Process>
    where
        F: FnOnce(&crate::block::BlockBuilder) -> Result<()>,
    {
        let (body, ()) = crate::block::with_block_scope(f)?;
        Ok(Process {
            api_class: process_api_class(),
            site,
            deadline,
            execute: Execute {
                site: execute_site,
                body,
            },
        })
    }

    /// Validate that every node reference within `execute.body` resolves to a node id
    /// known in the same block. Ancestor-block resolution for nested `Execute`
    /// subgraphs is out of scope for this crate; the execute service's compiler (in
    /// `dfm-registry`) walks the full block stack.
    pub fn validate_local_refs(&self) -> Result<()> {
        let known_ids: Vec<NodeId> = self.execute.body.iter().map(|fc| fc.node_id).collect();
        for fc in self.execute.body.iter() {
            self.execute
                .body
                .resolve_local_refs(fc.node_id, &|id| known_ids.contains(&id))?;
        }
        Ok(())
    }

    /// Whether the deadline, if present, is non-positive or already past `now`, per
    /// the scheduler's forward-immediately rule.
    #[must_use]
    pub fn deadline_already_due(&self, now: DateTime<FixedOffset>) -> bool {
        match &self.deadline {
            None => true,
            Some(d) => d.timestamp() <= 0 || *d <= now,
        }
    }
}

/// Parse a deadline from an RFC 3339 string, failing if the string has no explicit
/// offset. `chrono`'s RFC 3339 parser already requires an offset, so a successful parse
/// is sufficient; this wrapper exists to give the spec's "absence of zone is an error"
/// invariant a named call site and a crate-local error variant.
pub fn parse_deadline(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).map_err(|_| Error::DeadlineMissingZone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn deadline_requires_explicit_zone() {
        assert!(parse_deadline("2026-08-01T00:00:00Z").is_ok());
        assert!(parse_deadline("2026-08-01T00:00:00+02:00").is_ok());
        assert!(parse_deadline("2026-08-01T00:00:00").is_err());
    }

    #[test]
    fn build_constructs_process_with_nodes() {
        let process = Process::build(Some("localhost".into()), None, None, |b| {
            b.add_node(
                "dfm.GreetMe",
                "dfm",
                None,
                true,
                false,
                HashMap::new(),
            )
            .map(|_| ())
        })
        .unwrap();

        assert_eq!(process.execute.body.len(), 1);
        process.validate_local_refs().unwrap();
    }

    #[test]
    fn due_deadline_detection() {
        let now = DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z").unwrap();
        let past = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z").unwrap();
        let future = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap();

        let mut p = Process::build(None, Some(past), None, |_| Ok(())).unwrap();
        assert!(p.deadline_already_due(now));

        p.deadline = Some(future);
        assert!(!p.deadline_already_due(now));

        p.deadline = None;
        assert!(p.deadline_already_due(now));
    }
}
