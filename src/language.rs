// src/language.rs

//! Language identifiers.
//!
//! A `Language` is the closed set of identifiers the service knows how to
//! dispatch. Parsing a loose external string into a `Language` is the first
//! half of backend resolution; the registry does the second half.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnsupportedLanguage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
    CSharp,
    Go,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::TypeScript,
        Language::CSharp,
        Language::Go,
    ];

    /// Canonical identifier, as accepted by the orchestrator.
    pub fn id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::CSharp => "csharp",
            Language::Go => "go",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::TypeScript => "TypeScript",
            Language::CSharp => "C#",
            Language::Go => "Go",
        }
    }

    /// File extension used for workspace files (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::TypeScript => "ts",
            Language::CSharp => "cs",
            Language::Go => "go",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Language::Python => "text/x-python",
            Language::TypeScript => "text/typescript",
            Language::CSharp => "text/x-csharp",
            Language::Go => "text/x-go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "csharp" | "c#" | "cs" => Ok(Language::CSharp),
            "go" | "golang" => Ok(Language::Go),
            _ => Err(UnsupportedLanguage::new(s)),
        }
    }
}
