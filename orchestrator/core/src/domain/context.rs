// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Invocation context supplied alongside a tool call.

use crate::domain::pattern::now_ms;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolContext {
    /// Tools invoked before this one, oldest first.
    pub recent_tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    /// Epoch milliseconds. Defaults to the time the request is handled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_age_minutes: Option<f64>,
}

impl ToolContext {
    pub fn previous_tool(&self) -> Option<&str> {
        self.recent_tools.last().map(String::as_str)
    }

    pub fn effective_timestamp_ms(&self) -> i64 {
        self.timestamp_ms.unwrap_or_else(now_ms)
    }

    /// Copy with the timestamp pinned, so every consumer of one request
    /// agrees on "now".
    pub fn pinned(&self) -> Self {
        Self {
            timestamp_ms: Some(self.effective_timestamp_ms()),
            ..self.clone()
        }
    }
}
