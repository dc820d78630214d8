//! Pipeline plan files
//!
//! A plan is the JSON body of a pipeline without its creator, which is
//! given on the command line:
//!
//! ```json
//! {
//!   "name": "add-email-column",
//!   "stages": [
//!     {
//!       "name": "staging",
//!       "tasks": [
//!         {
//!           "name": "migrate",
//!           "target": { "engine": "postgres", "connection": { "dsn": "postgres://..." } },
//!           "payload": { "kind": "migration", "statement": "ALTER TABLE ..." }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use keel_core::dto::pipeline::{PipelineCreate, StageCreate};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Plan {
    pub name: String,
    pub stages: Vec<StageCreate>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse plan file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn into_request(self, creator_id: i64) -> PipelineCreate {
        PipelineCreate {
            creator_id,
            name: self.name,
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::engine::Engine;
    use keel_core::domain::task::TaskPayload;

    #[test]
    fn test_parse_plan() {
        let plan = Plan::parse(
            r#"{
                "name": "add-email-column",
                "stages": [
                    {
                        "name": "staging",
                        "tasks": [
                            {
                                "name": "migrate",
                                "target": { "engine": "postgres", "connection": { "dsn": "postgres://localhost/app" } },
                                "payload": { "kind": "migration", "statement": "ALTER TABLE users ADD COLUMN email TEXT" }
                            },
                            {
                                "name": "reader",
                                "target": { "engine": "mysql", "connection": { "dsn": "mysql://localhost/app" } },
                                "payload": { "kind": "create_role", "role": { "name": "reader" } },
                                "depends_on": ["migrate"],
                                "max_attempts": 3
                            }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        let req = plan.into_request(9);
        assert_eq!(req.creator_id, 9);
        let tasks = &req.stages[0].tasks;
        assert_eq!(tasks[0].target.engine, Engine::Postgres);
        assert!(matches!(tasks[0].payload, TaskPayload::Migration(_)));
        assert_eq!(tasks[1].depends_on, vec!["migrate".to_string()]);
        assert_eq!(tasks[1].max_attempts, Some(3));
    }

    #[test]
    fn test_parse_rejects_unknown_payload() {
        let result = Plan::parse(
            r#"{ "name": "p", "stages": [ { "name": "s", "tasks": [
                { "name": "t", "target": { "engine": "postgres", "connection": { "dsn": "x" } },
                  "payload": { "kind": "vacuum" } }
            ] } ] }"#,
        );
        assert!(result.is_err());
    }
}
