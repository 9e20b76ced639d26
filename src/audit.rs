//! Append-only JSONL log of session transitions. Never records credentials,
//! only which operation ran and how it ended.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct AuditLog {
    pub path: PathBuf,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl AuditLog {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login(&mut self, email: &str, ok: bool) -> Result<()> {
        self.log("login", serde_json::json!({ "email": email, "ok": ok }))
    }

    pub fn logout(&mut self) -> Result<()> {
        self.log("logout", serde_json::json!({}))
    }

    pub fn register(&mut self, email: &str, ok: bool) -> Result<()> {
        self.log("register", serde_json::json!({ "email": email, "ok": ok }))
    }

    pub fn profile_update(&mut self, user_id: &str, ok: bool) -> Result<()> {
        self.log(
            "profile_update",
            serde_json::json!({ "user_id": user_id, "ok": ok }),
        )
    }

    pub fn user_delete(&mut self, user_id: &str, ok: bool) -> Result<()> {
        self.log(
            "user_delete",
            serde_json::json!({ "user_id": user_id, "ok": ok }),
        )
    }

    pub fn password_reset(&mut self, email: &str, ok: bool) -> Result<()> {
        self.log(
            "password_reset",
            serde_json::json!({ "email": email, "ok": ok }),
        )
    }

    /// Outcome of the startup hydration pass: "restored", "fallback",
    /// "anonymous", or "wiped".
    pub fn hydrate(&mut self, outcome: &str) -> Result<()> {
        self.log("hydrate", serde_json::json!({ "outcome": outcome }))
    }
}
