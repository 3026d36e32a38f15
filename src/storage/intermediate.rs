//! Partial indexing results produced by one worker, pending merge.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const CRASHED_TRANSLATION_UNIT_MESSAGE: &str =
    "The indexing worker stopped while processing this translation unit. \
     Check that the file is valid for its language and that the project setup \
     provides every required option.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Module,
    Namespace,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    Function,
    Method,
    TypeAlias,
    Constant,
    Unresolved,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Module => "module",
            NodeKind::Namespace => "namespace",
            NodeKind::Class => "class",
            NodeKind::Struct => "struct",
            NodeKind::Interface => "interface",
            NodeKind::Trait => "trait",
            NodeKind::Enum => "enum",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::TypeAlias => "type_alias",
            NodeKind::Constant => "constant",
            NodeKind::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Member,
    Call,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Member => "member",
            EdgeKind::Call => "call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Definition,
    Reference,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Definition => "definition",
            LocationKind::Reference => "reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    pub id: u64,
    pub kind: NodeKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEdge {
    pub kind: EdgeKind,
    pub source_id: u64,
    pub target_id: u64,
    /// Node id of the file the edge was found in.
    pub file_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFile {
    /// Id of the file's own node.
    pub id: u64,
    pub path: PathBuf,
    pub language: String,
    pub modification_time: i64,
    pub content_hash: String,
    pub indexed: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn point(line: u32, column: u32) -> Self {
        Self {
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub file_id: u64,
    pub element_id: u64,
    pub kind: LocationKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageError {
    pub message: String,
    pub translation_unit: PathBuf,
    pub file_path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub fatal: bool,
    pub indexed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntermediateStorage {
    next_id: u64,
    nodes: Vec<StorageNode>,
    edges: Vec<StorageEdge>,
    files: Vec<StorageFile>,
    locations: Vec<StorageLocation>,
    errors: Vec<StorageError>,
    /// Node name to position in `nodes`.
    #[serde(skip)]
    node_index: HashMap<String, usize>,
    /// File node id to position in `files`.
    #[serde(skip)]
    file_index: HashMap<u64, usize>,
    #[serde(skip)]
    edge_index: HashSet<(EdgeKind, u64, u64)>,
}

impl IntermediateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding a single fatal error for a translation unit whose
    /// worker disappeared before finishing it.
    pub fn for_crashed_file(path: &Path) -> Self {
        Self::for_translation_unit_error(path, CRASHED_TRANSLATION_UNIT_MESSAGE)
    }

    /// Records a translation unit that could not be indexed at all. The file
    /// stays incomplete so the next refresh retries it.
    pub fn for_translation_unit_error(path: &Path, message: &str) -> Self {
        let mut storage = Self::new();
        storage.add_file(StorageFile {
            id: 0,
            path: path.to_path_buf(),
            language: String::new(),
            modification_time: 0,
            content_hash: String::new(),
            indexed: true,
            complete: false,
        });
        storage.add_error(StorageError {
            message: message.to_string(),
            translation_unit: path.to_path_buf(),
            file_path: path.to_path_buf(),
            line: 1,
            column: 1,
            fatal: true,
            indexed: true,
        });
        storage
    }

    /// Size metric used to order storages awaiting merge.
    pub fn source_location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.errors.is_empty()
    }

    pub fn nodes(&self) -> &[StorageNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[StorageEdge] {
        &self.edges
    }

    pub fn files(&self) -> &[StorageFile] {
        &self.files
    }

    pub fn locations(&self) -> &[StorageLocation] {
        &self.locations
    }

    pub fn errors(&self) -> &[StorageError] {
        &self.errors
    }

    fn ensure_indexes(&mut self) {
        if self.node_index.len() != self.nodes.len() {
            self.node_index = self
                .nodes
                .iter()
                .enumerate()
                .map(|(pos, n)| (n.name.clone(), pos))
                .collect();
        }
        if self.file_index.len() != self.files.len() {
            self.file_index = self
                .files
                .iter()
                .enumerate()
                .map(|(pos, f)| (f.id, pos))
                .collect();
        }
        if self.edge_index.len() != self.edges.len() {
            self.edge_index = self
                .edges
                .iter()
                .map(|e| (e.kind, e.source_id, e.target_id))
                .collect();
        }
    }

    /// Adds a node, or returns the id of the node already carrying `name`.
    /// An unresolved node takes the kind of a later concrete definition.
    pub fn add_node(&mut self, kind: NodeKind, name: &str) -> u64 {
        self.ensure_indexes();
        if let Some(&pos) = self.node_index.get(name) {
            let node = &mut self.nodes[pos];
            if kind != NodeKind::Unresolved && node.kind == NodeKind::Unresolved {
                node.kind = kind;
            }
            return node.id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.nodes.push(StorageNode {
            id,
            kind,
            name: name.to_string(),
        });
        self.node_index.insert(name.to_string(), self.nodes.len() - 1);
        id
    }

    pub fn add_edge(&mut self, kind: EdgeKind, source_id: u64, target_id: u64, file_id: u64) -> bool {
        self.ensure_indexes();
        if !self.edge_index.insert((kind, source_id, target_id)) {
            return false;
        }
        self.edges.push(StorageEdge {
            kind,
            source_id,
            target_id,
            file_id,
        });
        true
    }

    /// Registers a file and its node. `file.id` is ignored and replaced.
    pub fn add_file(&mut self, mut file: StorageFile) -> u64 {
        let id = self.add_node(NodeKind::File, &file.path.to_string_lossy());
        file.id = id;
        if let Some(&pos) = self.file_index.get(&id) {
            let existing = &mut self.files[pos];
            existing.indexed |= file.indexed;
            existing.complete &= file.complete;
            if existing.content_hash.is_empty() {
                existing.content_hash = file.content_hash;
                existing.language = file.language;
                existing.modification_time = file.modification_time;
            }
        } else {
            self.file_index.insert(id, self.files.len());
            self.files.push(file);
        }
        id
    }

    pub fn add_location(&mut self, file_id: u64, element_id: u64, kind: LocationKind, span: Span) {
        self.locations.push(StorageLocation {
            file_id,
            element_id,
            kind,
            span,
        });
    }

    pub fn add_error(&mut self, error: StorageError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    /// Marks a file as incomplete, e.g. after a recoverable syntax error.
    pub fn mark_incomplete(&mut self, file_id: u64) {
        self.ensure_indexes();
        if let Some(&pos) = self.file_index.get(&file_id) {
            self.files[pos].complete = false;
        }
    }

    /// Folds `other` into `self`, remapping its ids onto this storage.
    pub fn merge(&mut self, other: IntermediateStorage) {
        let mut remap: HashMap<u64, u64> = HashMap::with_capacity(other.nodes.len());
        let file_ids: HashSet<u64> = other.files.iter().map(|f| f.id).collect();

        for node in &other.nodes {
            if file_ids.contains(&node.id) {
                continue;
            }
            remap.insert(node.id, self.add_node(node.kind, &node.name));
        }
        for file in other.files {
            let old = file.id;
            let new = self.add_file(file);
            remap.insert(old, new);
        }

        let map = |id: u64| remap.get(&id).copied().unwrap_or(id);
        for edge in other.edges {
            self.add_edge(edge.kind, map(edge.source_id), map(edge.target_id), map(edge.file_id));
        }
        for loc in other.locations {
            self.add_location(map(loc.file_id), map(loc.element_id), loc.kind, loc.span);
        }
        for err in other.errors {
            self.add_error(err);
        }
    }
}
