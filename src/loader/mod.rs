//! Document loader: pipeline TOML text in, validated pipeline graph out.
//!
//! The loader never stops at the first problem. Syntax errors, malformed
//! values, invalid nodes, duplicate names, dangling references and cycles are
//! all collected and returned together as one `DocumentLoad` error.

mod roles;
mod sections;

pub use roles::{KeyClass, RoleRegistry, UPSTREAM_PREFIX};

use crate::config::Config;
use crate::core::dag::{PipelineGraph, DEFAULT_ROOT_SENTINELS};
use crate::core::params::ParameterRecord;
use crate::core::task::{AxisRange, BoundingBox, TaskCatalog, TaskNode, UpstreamRef, UpstreamRole};
use crate::error::{Error, Issue, Result};
use sections::{Chunk, Header};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Section key holding a task's bounding box.
pub const BOUNDING_BOX_KEY: &str = "bounding_box";

/// Everything the loader needs, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Names that refer to external inputs instead of tasks.
    pub root_sentinels: Vec<String>,
    pub roles: RoleRegistry,
    pub catalog: TaskCatalog,
    /// Reject sections whose names are missing from the catalog.
    pub strict_catalog: bool,
    /// Document used by [`Loader::load_default`].
    pub default_document: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root_sentinels: DEFAULT_ROOT_SENTINELS.iter().map(|s| s.to_string()).collect(),
            roles: RoleRegistry::default(),
            catalog: TaskCatalog::default(),
            strict_catalog: false,
            default_document: None,
        }
    }
}

impl TryFrom<&Config> for LoaderConfig {
    type Error = Error;

    fn try_from(config: &Config) -> Result<Self> {
        let mut loader = Self::default();
        for sentinel in &config.root_sentinels {
            if !loader.root_sentinels.contains(sentinel) {
                loader.root_sentinels.push(sentinel.clone());
            }
        }
        for (key, role) in &config.upstream_roles {
            loader
                .roles
                .register(key.clone(), UpstreamRole::from_name(role));
        }
        loader.roles.set_generic(config.generic_upstream_roles);
        for (name, kind) in &config.catalog {
            let kind = kind
                .parse()
                .map_err(|_| Error::Config(format!("unknown task kind '{}' for {}", kind, name)))?;
            loader.catalog.register(name.clone(), kind);
        }
        loader.strict_catalog = config.strict_catalog;
        loader.default_document = config.default_document_path();
        Ok(loader)
    }
}

/// One task section gathered from the document, before conversion.
struct SectionDraft {
    name: String,
    table: toml::Table,
}

/// Loads pipeline documents into validated [`PipelineGraph`]s.
///
/// A loader holds no mutable state and can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Parse `source` and build a validated graph.
    ///
    /// # Errors
    /// `DocumentLoad` carrying every issue found in the document.
    pub fn load(&self, source: &str) -> Result<PipelineGraph> {
        let mut issues = Vec::new();
        let sections = self.collect_sections(source, &mut issues);
        debug!(sections = sections.len(), "parsed pipeline document");

        let mut graph =
            PipelineGraph::with_root_sentinels(self.config.root_sentinels.iter().cloned());
        let mut repeats = Vec::new();
        for section in sections {
            let node = self.build_node(section, &mut issues);
            let name = node.name.clone();
            let repeated = if graph.contains(&name) {
                node.upstream.clone()
            } else {
                Vec::new()
            };
            if let Err(err) = graph.add_node(node) {
                issues.push(Issue::new(name.clone(), err));
                repeats.push((name, repeated));
            }
        }

        if let Err(graph_issues) = graph.resolve_edges() {
            issues.extend(graph_issues);
        }

        // Repeated sections never enter the graph; their references still count.
        for (name, upstream) in repeats {
            for reference in upstream {
                if !graph.contains(&reference.target) && !graph.is_root_sentinel(&reference.target)
                {
                    issues.push(Issue::new(
                        name.clone(),
                        Error::UnknownUpstream {
                            node: name.clone(),
                            missing: reference.target,
                        },
                    ));
                }
            }
        }

        if issues.is_empty() {
            debug!(
                tasks = graph.node_count(),
                edges = graph.edge_count(),
                "pipeline graph validated"
            );
            Ok(graph)
        } else {
            debug!(issues = issues.len(), "pipeline document rejected");
            Err(Error::DocumentLoad(issues))
        }
    }

    /// Read and load a document from disk.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PipelineGraph> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading pipeline document");
        let source = fs::read_to_string(path)?;
        self.load(&source)
    }

    /// Load the configured default document.
    ///
    /// # Errors
    /// `NoDefaultDocument` when none is configured.
    pub fn load_default(&self) -> Result<PipelineGraph> {
        let path = self
            .config
            .default_document
            .as_ref()
            .ok_or(Error::NoDefaultDocument)?;
        self.load_file(path)
    }

    fn collect_sections(&self, source: &str, issues: &mut Vec<Issue>) -> Vec<SectionDraft> {
        let mut sections = Vec::new();
        for chunk in sections::split(source) {
            match chunk.header {
                Header::Preamble => {
                    if !chunk.has_content() {
                        continue;
                    }
                    match parse_chunk(&chunk.text, chunk.start_line) {
                        Ok(table) => {
                            for (key, value) in table {
                                match value {
                                    // `A = { ... }` and `A.x = ...` define tasks too.
                                    toml::Value::Table(body) => sections.push(SectionDraft {
                                        name: key,
                                        table: body,
                                    }),
                                    _ => issues.push(Issue::global(Error::UnknownNesting(format!(
                                        "key '{}' is outside of any task section; tasks are tables such as [{}]",
                                        key, key
                                    )))),
                                }
                            }
                        }
                        Err(err) => issues.push(Issue::global(err)),
                    }
                }
                Header::ArrayOfTables => {
                    issues.push(Issue::global(Error::UnknownNesting(format!(
                        "line {}: array of tables {} is not a task section",
                        chunk.start_line + 1,
                        chunk.header_line
                    ))));
                }
                Header::Table => add_table_chunk(&chunk, &mut sections, issues),
            }
        }
        sections
    }

    fn build_node(&self, section: SectionDraft, issues: &mut Vec<Issue>) -> TaskNode {
        let SectionDraft { name, table } = section;
        let mut problems = Vec::new();
        let mut node = TaskNode::new(&name).with_kind(self.config.catalog.kind_of(&name));
        let mut parameters = toml::Table::new();

        for (key, raw) in table {
            if key == BOUNDING_BOX_KEY {
                node.bounding_box = parse_bounding_box(&raw, &mut problems);
                continue;
            }
            match self.config.roles.classify(&key) {
                KeyClass::Parameter => {
                    parameters.insert(key, raw);
                }
                KeyClass::Upstream(role) => match raw {
                    toml::Value::String(target) => {
                        node.upstream.push(UpstreamRef { key, role, target })
                    }
                    other => problems.push(Error::MalformedValue {
                        key,
                        reason: format!(
                            "upstream reference must be a task name, found {}",
                            other.type_str()
                        ),
                    }),
                },
                KeyClass::Rejected(reason) => problems.push(Error::MalformedValue { key, reason }),
            }
        }
        node.parameters = ParameterRecord::from_toml_table("", &parameters, &mut problems);

        if !self.config.catalog.contains(&name) {
            if self.config.strict_catalog {
                problems.push(Error::UnknownTask(name.clone()));
            } else {
                warn!(task = %name, "task is not in the catalog");
            }
        }

        if let Err(err) = node.validate_self() {
            problems.push(err);
        }

        issues.extend(problems.into_iter().map(|err| Issue::new(name.clone(), err)));
        node
    }
}

/// Register a `[name]` or `[name.sub]` chunk.
///
/// A plain header always opens a new section, so repeated headers surface as
/// duplicate tasks. A dotted header merges into the latest section of that name.
fn add_table_chunk(chunk: &Chunk, sections: &mut Vec<SectionDraft>, issues: &mut Vec<Issue>) {
    let path = match header_path(chunk) {
        Ok(path) => path,
        Err(err) => {
            issues.push(Issue::global(err));
            return;
        }
    };
    let name = path[0].clone();

    let mut table = match parse_chunk(&chunk.text, chunk.start_line) {
        Ok(table) => table,
        Err(err) => {
            issues.push(Issue::new(name.clone(), err));
            // Keep the task so references to it do not pile up as unknown.
            if path.len() == 1 {
                sections.push(SectionDraft {
                    name,
                    table: toml::Table::new(),
                });
            }
            return;
        }
    };
    let body = match table.remove(&name) {
        Some(toml::Value::Table(body)) => body,
        _ => toml::Table::new(),
    };

    if path.len() == 1 {
        sections.push(SectionDraft { name, table: body });
        return;
    }

    let position = match sections.iter().rposition(|s| s.name == name) {
        Some(position) => position,
        None => {
            sections.push(SectionDraft {
                name: name.clone(),
                table: toml::Table::new(),
            });
            sections.len() - 1
        }
    };
    let mut conflicts = Vec::new();
    merge_tables(&mut sections[position].table, body, "", &mut conflicts);
    for key in conflicts {
        issues.push(Issue::new(
            name.clone(),
            Error::Syntax(format!(
                "line {}: duplicate key '{}' in {}",
                chunk.start_line + 1,
                key,
                chunk.header_line
            )),
        ));
    }
}

/// Dotted path named by a table header, e.g. `["Voxels", "bounding_box"]`.
fn header_path(chunk: &Chunk) -> Result<Vec<String>> {
    let table = parse_chunk(&chunk.header_line, chunk.start_line)?;

    let mut path = Vec::new();
    let mut current = &table;
    while let Some((key, toml::Value::Table(inner))) = current.iter().next() {
        path.push(key.clone());
        current = inner;
    }

    if path.is_empty() {
        Err(Error::Syntax(format!(
            "line {}: malformed header {}",
            chunk.start_line + 1,
            chunk.header_line
        )))
    } else {
        Ok(path)
    }
}

/// Parse one chunk whose first line is the zero-based `first_line` of the document.
fn parse_chunk(text: &str, first_line: usize) -> Result<toml::Table> {
    toml::from_str(text).map_err(|err| syntax_error(text, first_line, &err))
}

fn syntax_error(text: &str, first_line: usize, err: &toml::de::Error) -> Error {
    let message = err.message().trim();
    let line = err
        .span()
        .and_then(|span| text.get(..span.start))
        .map(|before| first_line + before.matches('\n').count() + 1);
    match line {
        Some(line) => Error::Syntax(format!("line {}: {}", line, message)),
        None => Error::Syntax(message.to_string()),
    }
}

fn merge_tables(
    dst: &mut toml::Table,
    src: toml::Table,
    prefix: &str,
    conflicts: &mut Vec<String>,
) {
    for (key, value) in src {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        if let Some(existing) = dst.get_mut(&key) {
            match (existing, value) {
                (toml::Value::Table(existing), toml::Value::Table(incoming)) => {
                    merge_tables(existing, incoming, &path, conflicts)
                }
                _ => conflicts.push(path),
            }
        } else {
            dst.insert(key, value);
        }
    }
}

fn parse_bounding_box(raw: &toml::Value, problems: &mut Vec<Error>) -> Option<BoundingBox> {
    let toml::Value::Table(axes) = raw else {
        problems.push(Error::MalformedValue {
            key: BOUNDING_BOX_KEY.to_string(),
            reason: "expected a table of x, y and z ranges".to_string(),
        });
        return None;
    };

    let mut bbox = BoundingBox::default();
    for (axis, range) in axes {
        let key = format!("{}.{}", BOUNDING_BOX_KEY, axis);
        let Some(slot) = bbox.axis_mut(axis) else {
            problems.push(Error::MalformedValue {
                key,
                reason: "unknown axis, expected x, y or z".to_string(),
            });
            continue;
        };
        let bounds = range
            .as_array()
            .and_then(|items| items.iter().map(number_of).collect::<Option<Vec<f64>>>());
        match bounds.as_deref() {
            Some(&[min, max]) => *slot = Some(AxisRange::new(min, max)),
            _ => problems.push(Error::MalformedValue {
                key,
                reason: "expected [min, max] numbers".to_string(),
            }),
        }
    }
    Some(bbox)
}

fn number_of(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(i) => Some(*i as f64),
        toml::Value::Float(f) => Some(*f),
        _ => None,
    }
}
