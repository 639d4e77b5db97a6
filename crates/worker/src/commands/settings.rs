// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `axw settings`: print the effective engine settings.

use anyhow::Result;
use ax_engine::Settings;

use crate::output::OutputFormat;

pub fn render(settings: &Settings, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => toml::to_string(settings)?,
        OutputFormat::Json => serde_json::to_string_pretty(settings)?,
    })
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
