// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for environment configuration loading and option trees.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML configuration")]
    Toml(#[from] toml::de::Error),

    /// A field parsed but holds a value the environment cannot run with
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid options tree")]
    Options(#[from] OptionsError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Option trees are keyed maps; the root must be a mapping
    #[error("options root must be a mapping, found {found}")]
    NotAMapping { found: &'static str },

    #[error("option key must be a string, found {found}")]
    NonStringKey { found: &'static str },
}
