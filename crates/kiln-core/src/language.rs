//! Language registry: maps a language identifier to its toolchain profile.
//!
//! Every supported language is pure data: a file extension, an ordered list
//! of invocation steps and a starter template. The pipeline never branches
//! on the language itself, so adding a language means adding a table entry
//! (or a `[[language]]` table in a TOML override file).
//!
//! # Argument templates
//!
//! Programs and arguments may contain the following placeholders, expanded
//! relative to the workspace directory:
//!
//! | Placeholder  | Expands to                          |
//! |--------------|-------------------------------------|
//! | `{source}`   | source file name, e.g. `main.cpp`   |
//! | `{stem}`     | source file stem, e.g. `main`       |
//! | `{artifact}` | compiled artifact name (`main`)     |

use crate::error::SandboxError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Default file stem for submitted source code.
pub const DEFAULT_SOURCE_STEM: &str = "main";

/// Name of the artifact compile steps are expected to produce.
pub const ARTIFACT_NAME: &str = "main";

/// Whether a step builds an artifact or executes the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Produces an artifact; a non-zero exit aborts the pipeline.
    Compile,
    /// Executes the source or the artifact.
    Run,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => write!(f, "compile"),
            Self::Run => write!(f, "run"),
        }
    }
}

/// One toolchain invocation: a program plus its argument template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStep {
    /// Step kind.
    pub kind: StepKind,
    /// Program to execute, looked up on `PATH` unless it is a relative path.
    pub program: String,
    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,
}

impl InvocationStep {
    /// Create a compile step.
    pub fn compile(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            kind: StepKind::Compile,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Create a run step.
    pub fn run(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            kind: StepKind::Run,
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Expand placeholders into a concrete program and argv.
    pub fn render(&self, profile: &LanguageProfile) -> (String, Vec<String>) {
        let source = profile.source_name();
        let stem = profile.source_stem();
        let expand = |template: &str| {
            template
                .replace("{source}", &source)
                .replace("{stem}", stem)
                .replace("{artifact}", ARTIFACT_NAME)
        };
        (
            expand(&self.program),
            self.args.iter().map(|a| expand(a)).collect(),
        )
    }

    /// True if the program is produced inside the workspace rather than
    /// installed on the host.
    fn is_workspace_program(&self) -> bool {
        self.program.contains("{artifact}") || self.program.starts_with("./")
    }
}

/// Toolchain profile for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Canonical identifier (lower case).
    pub id: String,
    /// Additional identifiers resolving to this profile.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Source file extension without the dot.
    pub extension: String,
    /// Source file stem override (default: `main`).
    #[serde(default)]
    pub source_stem: Option<String>,
    /// Compile steps (zero or more) followed by exactly one run step.
    pub steps: Vec<InvocationStep>,
    /// Starter program printing `Hello, World!`.
    #[serde(default)]
    pub template: Option<String>,
}

impl LanguageProfile {
    /// File stem the source is written under.
    pub fn source_stem(&self) -> &str {
        self.source_stem.as_deref().unwrap_or(DEFAULT_SOURCE_STEM)
    }

    /// File name the source is written under, e.g. `main.py`.
    pub fn source_name(&self) -> String {
        format!("{}.{}", self.source_stem(), self.extension)
    }

    /// True if the profile has a separate compile step.
    pub fn is_compiled(&self) -> bool {
        self.steps.iter().any(|s| s.kind == StepKind::Compile)
    }

    /// Compile steps in execution order.
    pub fn compile_steps(&self) -> impl Iterator<Item = &InvocationStep> {
        self.steps.iter().filter(|s| s.kind == StepKind::Compile)
    }

    /// The run step, if the profile has one.
    pub fn run_step(&self) -> Option<&InvocationStep> {
        self.steps.iter().find(|s| s.kind == StepKind::Run)
    }

    /// Check the profile's structural invariants.
    pub fn validate(&self) -> Result<(), SandboxError> {
        let invalid = |reason: &str| SandboxError::InvalidProfile {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if self.extension.is_empty() || self.extension.contains(['/', '\\', '.']) {
            return Err(invalid("extension must be a bare suffix"));
        }
        if let Some(stem) = &self.source_stem {
            if stem.is_empty() || stem.contains(['/', '\\']) || stem == ".." {
                return Err(invalid("source_stem must be a plain file stem"));
            }
        }
        if self.steps.iter().any(|s| s.program.trim().is_empty()) {
            return Err(invalid("step program is empty"));
        }

        let runs = self.steps.iter().filter(|s| s.kind == StepKind::Run).count();
        if runs != 1 {
            return Err(invalid("exactly one run step is required"));
        }
        if self.steps.last().map(|s| s.kind) != Some(StepKind::Run) {
            return Err(invalid("compile steps must precede the run step"));
        }
        Ok(())
    }
}

// ============================================================================
// Built-in table
// ============================================================================

type StepSpec = (StepKind, &'static str, &'static [&'static str]);

struct Builtin {
    id: &'static str,
    aliases: &'static [&'static str],
    extension: &'static str,
    source_stem: Option<&'static str>,
    steps: &'static [StepSpec],
    template: &'static str,
}

use StepKind::{Compile, Run};

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "python",
        aliases: &["python3", "py"],
        extension: "py",
        source_stem: None,
        steps: &[(Run, "python3", &["{source}"])],
        template: "print('Hello, World!')\n",
    },
    Builtin {
        id: "javascript",
        aliases: &["js", "node", "nodejs"],
        extension: "js",
        source_stem: None,
        steps: &[(Run, "node", &["{source}"])],
        template: "console.log('Hello, World!');\n",
    },
    Builtin {
        id: "typescript",
        aliases: &["ts"],
        extension: "ts",
        source_stem: None,
        steps: &[(Run, "ts-node", &["{source}"])],
        template: "console.log('Hello, World!');\n",
    },
    Builtin {
        id: "java",
        aliases: &[],
        extension: "java",
        source_stem: Some("Main"),
        steps: &[
            (Compile, "javac", &["{source}"]),
            (Run, "java", &["-cp", ".", "{stem}"]),
        ],
        template: r#"public class Main {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#,
    },
    Builtin {
        id: "cpp",
        aliases: &["c++", "cxx"],
        extension: "cpp",
        source_stem: None,
        steps: &[
            (Compile, "g++", &["{source}", "-o", "{artifact}"]),
            (Run, "./{artifact}", &[]),
        ],
        template: r#"#include <iostream>
int main() {
    std::cout << "Hello, World!" << std::endl;
    return 0;
}
"#,
    },
    Builtin {
        id: "csharp",
        aliases: &["cs", "c#"],
        extension: "cs",
        source_stem: None,
        steps: &[(Run, "dotnet", &["script", "{source}"])],
        template: r#"using System;
class Program {
    static void Main() {
        Console.WriteLine("Hello, World!");
    }
}
"#,
    },
    Builtin {
        id: "go",
        aliases: &["golang"],
        extension: "go",
        source_stem: None,
        steps: &[
            (Compile, "go", &["build", "-o", "{artifact}", "{source}"]),
            (Run, "./{artifact}", &[]),
        ],
        template: r#"package main

import "fmt"

func main() {
    fmt.Println("Hello, World!")
}
"#,
    },
    Builtin {
        id: "rust",
        aliases: &["rs"],
        extension: "rs",
        source_stem: None,
        steps: &[
            (Compile, "rustc", &["{source}", "-o", "{artifact}"]),
            (Run, "./{artifact}", &[]),
        ],
        template: "fn main() {\n    println!(\"Hello, World!\");\n}\n",
    },
    Builtin {
        id: "kotlin",
        aliases: &["kt"],
        extension: "kt",
        source_stem: None,
        steps: &[
            (
                Compile,
                "kotlinc",
                &["{source}", "-include-runtime", "-d", "{artifact}.jar"],
            ),
            (Run, "java", &["-jar", "{artifact}.jar"]),
        ],
        template: "fun main() {\n    println(\"Hello, World!\")\n}\n",
    },
    Builtin {
        id: "scala",
        aliases: &[],
        extension: "scala",
        source_stem: None,
        steps: &[(Run, "scala", &["{source}"])],
        template: "@main def hello(): Unit = println(\"Hello, World!\")\n",
    },
    Builtin {
        id: "swift",
        aliases: &[],
        extension: "swift",
        source_stem: None,
        steps: &[(Run, "swift", &["{source}"])],
        template: "print(\"Hello, World!\")\n",
    },
    Builtin {
        id: "haskell",
        aliases: &["hs"],
        extension: "hs",
        source_stem: None,
        steps: &[
            (Compile, "ghc", &["{source}", "-o", "{artifact}"]),
            (Run, "./{artifact}", &[]),
        ],
        template: "main :: IO ()\nmain = putStrLn \"Hello, World!\"\n",
    },
    Builtin {
        id: "php",
        aliases: &[],
        extension: "php",
        source_stem: None,
        steps: &[(Run, "php", &["{source}"])],
        template: "<?php\necho \"Hello, World!\\n\";\n",
    },
    Builtin {
        id: "ruby",
        aliases: &["rb"],
        extension: "rb",
        source_stem: None,
        steps: &[(Run, "ruby", &["{source}"])],
        template: "puts \"Hello, World!\"\n",
    },
    Builtin {
        id: "perl",
        aliases: &["pl"],
        extension: "pl",
        source_stem: None,
        steps: &[(Run, "perl", &["{source}"])],
        template: "print \"Hello, World!\\n\";\n",
    },
    Builtin {
        id: "lua",
        aliases: &[],
        extension: "lua",
        source_stem: None,
        steps: &[(Run, "lua", &["{source}"])],
        template: "print(\"Hello, World!\")\n",
    },
    Builtin {
        id: "r",
        aliases: &["rscript"],
        extension: "r",
        source_stem: None,
        steps: &[(Run, "Rscript", &["{source}"])],
        template: "cat(\"Hello, World!\\n\")\n",
    },
    Builtin {
        id: "sql",
        aliases: &["sqlite", "sqlite3"],
        extension: "sql",
        source_stem: None,
        steps: &[(Run, "sqlite3", &[":memory:", ".read {source}"])],
        template: "SELECT 'Hello, World!';\n",
    },
    Builtin {
        id: "bash",
        aliases: &["sh", "shell"],
        extension: "sh",
        source_stem: None,
        steps: &[(Run, "bash", &["{source}"])],
        template: "echo \"Hello, World!\"\n",
    },
    Builtin {
        id: "powershell",
        aliases: &["pwsh", "ps1"],
        extension: "ps1",
        source_stem: None,
        steps: &[(Run, "pwsh", &["-NoProfile", "-File", "{source}"])],
        template: "Write-Output \"Hello, World!\"\n",
    },
];

impl From<&Builtin> for LanguageProfile {
    fn from(b: &Builtin) -> Self {
        Self {
            id: b.id.to_string(),
            aliases: b.aliases.iter().map(|a| a.to_string()).collect(),
            extension: b.extension.to_string(),
            source_stem: b.source_stem.map(str::to_string),
            steps: b
                .steps
                .iter()
                .map(|(kind, program, args)| InvocationStep {
                    kind: *kind,
                    program: program.to_string(),
                    args: args.iter().map(|a| a.to_string()).collect(),
                })
                .collect(),
            template: Some(b.template.to_string()),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// On-disk registry document.
///
/// ```toml
/// planned = ["cobol"]
///
/// [[language]]
/// id = "c"
/// extension = "c"
/// steps = [
///     { kind = "compile", program = "gcc", args = ["{source}", "-o", "{artifact}"] },
///     { kind = "run", program = "./{artifact}" },
/// ]
/// ```
#[derive(Debug, Default, Deserialize)]
struct RegistryDocument {
    #[serde(default, rename = "language")]
    languages: Vec<LanguageProfile>,
    #[serde(default)]
    planned: Vec<String>,
}

/// Lookup table from language identifier to toolchain profile.
///
/// Built once at startup and shared read-only (behind an `Arc`) by every
/// request afterwards.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
    index: HashMap<String, usize>,
    planned: Vec<String>,
}

impl LanguageRegistry {
    /// Registry containing only the built-in languages.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for builtin in BUILTINS {
            // Built-in entries are static data covered by tests.
            if let Err(e) = registry.insert(LanguageProfile::from(builtin)) {
                tracing::error!(error = %e, "Invalid built-in language profile");
            }
        }
        registry
    }

    /// Registry containing only the languages in a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, SandboxError> {
        Self::default().with_overrides(document)
    }

    /// Built-in registry extended with the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading language overrides");
        let document = std::fs::read_to_string(path)?;
        Self::builtin().with_overrides(&document)
    }

    /// Merge a TOML document into this registry.
    ///
    /// Profiles whose id already exists replace the existing entry
    /// (including its aliases); new ids are appended.
    pub fn with_overrides(mut self, document: &str) -> Result<Self, SandboxError> {
        let doc: RegistryDocument = toml::from_str(document)?;
        for profile in doc.languages {
            self.insert(profile)?;
        }
        for id in doc.planned {
            let id = normalize(&id);
            if self.index.contains_key(&id) {
                return Err(SandboxError::InvalidProfile {
                    id,
                    reason: "planned identifier already has a profile".into(),
                });
            }
            if !self.planned.contains(&id) {
                self.planned.push(id);
            }
        }
        tracing::debug!(
            languages = self.profiles.len(),
            planned = self.planned.len(),
            "Language registry built"
        );
        Ok(self)
    }

    /// Add or replace a profile.
    fn insert(&mut self, mut profile: LanguageProfile) -> Result<(), SandboxError> {
        profile.id = normalize(&profile.id);
        profile.aliases = profile.aliases.iter().map(|a| normalize(a)).collect();
        profile.validate()?;

        let mut profiles = self.profiles.clone();
        match profiles.iter().position(|p| p.id == profile.id) {
            Some(pos) => profiles[pos] = profile,
            None => profiles.push(profile),
        }
        self.rebuild_index(profiles)
    }

    fn rebuild_index(&mut self, profiles: Vec<LanguageProfile>) -> Result<(), SandboxError> {
        let mut index = HashMap::new();
        for (i, profile) in profiles.iter().enumerate() {
            for key in std::iter::once(&profile.id).chain(profile.aliases.iter()) {
                if index.insert(key.clone(), i).is_some() {
                    return Err(SandboxError::InvalidProfile {
                        id: profile.id.clone(),
                        reason: format!("identifier '{key}' is registered twice"),
                    });
                }
            }
        }
        self.planned.retain(|id| !index.contains_key(id));
        self.profiles = profiles;
        self.index = index;
        Ok(())
    }

    /// Resolve an identifier (case-insensitive) to its profile.
    pub fn resolve(&self, identifier: &str) -> Result<&LanguageProfile, SandboxError> {
        let key = normalize(identifier);
        if let Some(&i) = self.index.get(&key) {
            return Ok(&self.profiles[i]);
        }
        if self.planned.contains(&key) {
            return Err(SandboxError::NotImplemented(key));
        }
        Err(SandboxError::UnknownLanguage(identifier.to_string()))
    }

    /// All registered profiles in registration order.
    pub fn profiles(&self) -> &[LanguageProfile] {
        &self.profiles
    }

    /// Identifiers that are known but not implemented.
    pub fn planned(&self) -> &[String] {
        &self.planned
    }

    /// Number of registered profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True if no profile is registered.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Check whether every host program the profile needs is on `PATH`.
    pub fn is_available(&self, profile: &LanguageProfile) -> bool {
        profile
            .steps
            .iter()
            .filter(|s| !s.is_workspace_program())
            .all(|s| which::which(&s.program).is_ok())
    }
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
