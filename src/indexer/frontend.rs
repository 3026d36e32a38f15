//! Turns one source file into an intermediate storage.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use tree_sitter::Node;

use super::command::IndexerCommand;
use super::parser::{language_id_for_path, language_name, parser_for_id, scope_separator, LanguageId};
use super::refresh::{content_hash, file_fingerprint};
use crate::storage::intermediate::{
    EdgeKind, IntermediateStorage, LocationKind, NodeKind, Span, StorageError, StorageFile,
};

pub trait ParserFrontend: Send + Sync {
    /// Indexes the command's source file. An error means the whole
    /// translation unit could not be processed.
    fn index(&self, command: &IndexerCommand) -> Result<IntermediateStorage>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterFrontend;

impl TreeSitterFrontend {
    pub fn new() -> Self {
        Self
    }
}

impl ParserFrontend for TreeSitterFrontend {
    fn index(&self, command: &IndexerCommand) -> Result<IntermediateStorage> {
        let path = &command.source_file_path;
        let language = language_id_for_path(path)
            .ok_or_else(|| anyhow!("unsupported source file type: {}", path.display()))?;
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read source file: {}", path.display()))?;
        let source = String::from_utf8_lossy(&bytes);
        let mtime = file_fingerprint(path).map(|fp| fp.mtime_ns).unwrap_or(0);

        let mut parser = parser_for_id(language)?;
        let tree = parser
            .parse(source.as_ref(), None)
            .ok_or_else(|| anyhow!("Failed to parse source"))?;

        let mut storage = IntermediateStorage::new();
        let file_id = storage.add_file(StorageFile {
            id: 0,
            path: path.clone(),
            language: language_name(language).to_string(),
            modification_time: mtime,
            content_hash: content_hash(&bytes),
            indexed: true,
            complete: true,
        });

        let mut extractor = Extractor {
            language,
            source: source.as_bytes(),
            storage: &mut storage,
            file_id,
            shallow: command.shallow,
            definitions: HashMap::new(),
            calls: Vec::new(),
        };
        extractor.walk(tree.root_node());
        extractor.resolve_calls();

        let root = tree.root_node();
        if root.has_error() {
            let (line, column, message) = first_syntax_error(root)
                .map(|n| {
                    let pos = n.start_position();
                    let message = if n.is_missing() {
                        format!("missing {}", n.kind())
                    } else {
                        "syntax error".to_string()
                    };
                    (pos.row as u32 + 1, pos.column as u32 + 1, message)
                })
                .unwrap_or((1, 1, "syntax error".to_string()));
            storage.add_error(StorageError {
                message,
                translation_unit: path.clone(),
                file_path: path.clone(),
                line,
                column,
                fatal: false,
                indexed: true,
            });
            storage.mark_incomplete(file_id);
        }
        Ok(storage)
    }
}

fn first_syntax_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn span_of(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_line: start.row as u32 + 1,
        start_column: start.column as u32 + 1,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32 + 1,
    }
}

#[derive(Clone)]
struct Scope {
    name: String,
    id: u64,
    kind: NodeKind,
}

struct PendingCall {
    caller: u64,
    callee: String,
    span: Span,
}

struct Extractor<'a> {
    language: LanguageId,
    source: &'a [u8],
    storage: &'a mut IntermediateStorage,
    file_id: u64,
    shallow: bool,
    /// Simple name to node id of definitions in this file.
    definitions: HashMap<String, u64>,
    calls: Vec<PendingCall>,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> Option<String> {
        node.utf8_text(self.source)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field).and_then(|n| self.text(n))
    }

    /// Follows nested C/C++ declarators down to the declared name.
    fn declarator_name(&self, node: Node<'_>) -> Option<String> {
        let mut current = node.child_by_field_name("declarator")?;
        for _ in 0..8 {
            match current.kind() {
                "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
                | "operator_name" => return self.text(current),
                _ => current = current.child_by_field_name("declarator")?,
            }
        }
        None
    }

    /// Kind and simple name of a definition node, or a scope-only container
    /// (reported as `Unresolved`).
    fn classify(&self, node: Node<'_>) -> Option<(NodeKind, String)> {
        use LanguageId::*;
        let named = |kind: NodeKind| self.field_text(node, "name").map(|n| (kind, n));
        match (self.language, node.kind()) {
            (Rust, "function_item") | (Rust, "function_signature_item") => named(NodeKind::Function),
            (Rust, "struct_item") | (Rust, "union_item") => named(NodeKind::Struct),
            (Rust, "enum_item") => named(NodeKind::Enum),
            (Rust, "trait_item") => named(NodeKind::Trait),
            (Rust, "mod_item") => named(NodeKind::Module),
            (Rust, "type_item") => named(NodeKind::TypeAlias),
            (Rust, "const_item") | (Rust, "static_item") => named(NodeKind::Constant),
            (Rust, "impl_item") => self
                .field_text(node, "type")
                .map(|t| (NodeKind::Unresolved, strip_generics(&t))),

            (Python, "function_definition") => named(NodeKind::Function),
            (Python, "class_definition") => named(NodeKind::Class),

            (Go, "function_declaration") => named(NodeKind::Function),
            (Go, "method_declaration") => named(NodeKind::Method),
            (Go, "type_spec") => {
                let kind = match node.child_by_field_name("type").map(|t| t.kind()) {
                    Some("struct_type") => NodeKind::Struct,
                    Some("interface_type") => NodeKind::Interface,
                    _ => NodeKind::TypeAlias,
                };
                named(kind)
            }

            (Java, "class_declaration") | (Java, "record_declaration") => named(NodeKind::Class),
            (Java, "interface_declaration") => named(NodeKind::Interface),
            (Java, "enum_declaration") => named(NodeKind::Enum),
            (Java, "method_declaration") | (Java, "constructor_declaration") => {
                named(NodeKind::Method)
            }

            (C, "function_definition") | (Cpp, "function_definition") => {
                self.declarator_name(node).map(|n| (NodeKind::Function, n))
            }
            (C, "struct_specifier") | (Cpp, "struct_specifier")
                if node.child_by_field_name("body").is_some() =>
            {
                named(NodeKind::Struct)
            }
            (C, "enum_specifier") | (Cpp, "enum_specifier")
                if node.child_by_field_name("body").is_some() =>
            {
                named(NodeKind::Enum)
            }
            (Cpp, "class_specifier") if node.child_by_field_name("body").is_some() => {
                named(NodeKind::Class)
            }
            (Cpp, "namespace_definition") => named(NodeKind::Namespace),

            (Javascript | Typescript | Tsx, "function_declaration")
            | (Javascript | Typescript | Tsx, "generator_function_declaration") => {
                named(NodeKind::Function)
            }
            (Javascript | Typescript | Tsx, "class_declaration")
            | (Typescript | Tsx, "abstract_class_declaration") => named(NodeKind::Class),
            (Javascript | Typescript | Tsx, "method_definition") => named(NodeKind::Method),
            (Typescript | Tsx, "interface_declaration") => named(NodeKind::Interface),
            (Typescript | Tsx, "type_alias_declaration") => named(NodeKind::TypeAlias),
            (Typescript | Tsx, "enum_declaration") => named(NodeKind::Enum),
            (Typescript | Tsx, "internal_module") | (Typescript | Tsx, "module") => {
                named(NodeKind::Namespace)
            }
            _ => None,
        }
    }

    fn callee_name(&self, node: Node<'_>) -> Option<String> {
        let field = match (self.language, node.kind()) {
            (LanguageId::Python, "call") => "function",
            (LanguageId::Java, "method_invocation") => "name",
            (LanguageId::Java, "object_creation_expression") => "type",
            (_, "call_expression") => "function",
            (LanguageId::Javascript | LanguageId::Typescript | LanguageId::Tsx, "new_expression") => {
                "constructor"
            }
            _ => return None,
        };
        let text = self.field_text(node, field)?;
        let text = strip_generics(&text);
        text.rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn qualify(&self, scopes: &[Scope], name: &str) -> String {
        let sep = scope_separator(self.language);
        let mut out = String::new();
        for scope in scopes {
            out.push_str(&scope.name);
            out.push_str(sep);
        }
        out.push_str(name);
        out
    }

    fn walk(&mut self, root: Node<'_>) {
        let mut scopes: Vec<Scope> = Vec::new();
        let mut stack: Vec<(Node<'_>, usize)> = vec![(root, 0)];

        while let Some((node, depth)) = stack.pop() {
            scopes.truncate(depth);
            let mut child_depth = depth;

            if let Some((mut kind, name)) = self.classify(node) {
                let in_type = scopes.last().is_some_and(|s| {
                    matches!(
                        s.kind,
                        NodeKind::Class
                            | NodeKind::Struct
                            | NodeKind::Trait
                            | NodeKind::Interface
                            | NodeKind::Unresolved
                    )
                });
                if kind == NodeKind::Function && in_type {
                    kind = NodeKind::Method;
                }
                let qualified = self.qualify(&scopes, &name);
                let id = self.storage.add_node(kind, &qualified);
                if kind != NodeKind::Unresolved {
                    self.storage
                        .add_location(self.file_id, id, LocationKind::Definition, span_of(node));
                    self.definitions.entry(simple_name(&name)).or_insert(id);
                }
                if let Some(parent) = scopes.last() {
                    self.storage
                        .add_edge(EdgeKind::Member, parent.id, id, self.file_id);
                }
                scopes.push(Scope {
                    name,
                    id,
                    kind,
                });
                child_depth = scopes.len();
            } else if !self.shallow {
                if let Some(callee) = self.callee_name(node) {
                    let caller = scopes
                        .iter()
                        .rev()
                        .find(|s| matches!(s.kind, NodeKind::Function | NodeKind::Method))
                        .map(|s| s.id)
                        .unwrap_or(self.file_id);
                    self.calls.push(PendingCall {
                        caller,
                        callee,
                        span: span_of(node),
                    });
                }
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            for child in children.into_iter().rev() {
                stack.push((child, child_depth));
            }
        }
    }

    fn resolve_calls(&mut self) {
        for call in std::mem::take(&mut self.calls) {
            let target = match self.definitions.get(&call.callee) {
                Some(&id) => id,
                None => self.storage.add_node(NodeKind::Unresolved, &call.callee),
            };
            self.storage
                .add_edge(EdgeKind::Call, call.caller, target, self.file_id);
            self.storage
                .add_location(self.file_id, target, LocationKind::Reference, call.span);
        }
    }
}

fn strip_generics(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
}

fn simple_name(name: &str) -> String {
    name.rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|s| !s.is_empty())
        .unwrap_or(name)
        .to_string()
}
