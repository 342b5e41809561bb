/*! Lexical scope resolution.
 *
 * Scopes form a tree that mirrors the function nesting of the analyzed file.
 * Declarations follow hoisting semantics: `var` declarations land in the
 * nearest enclosing function or script scope no matter how deeply the block
 * that contains them nests, and named function declarations bind their full
 * definition in the enclosing scope. Assignments to names that resolve
 * nowhere in the chain become globals, recorded at the root.
 *
 * Scopes live in an arena and refer to each other by index, so the tree
 * carries no back-pointers into the AST arena it was built from.
 */

use crate::ast::{NodeId, NodeKind, SyntaxTree};
use crate::{AnalysisError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Script,
    Function,
    Class,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    /// The script, function or class node that owns this scope.
    pub owner: NodeId,
    pub parent: Option<ScopeId>,
    /// Variables declared in this scope, in declaration order.
    pub variables: IndexMap<String, NodeId>,
    /// Globals observed in this scope. Only the root scope carries entries.
    pub globals: IndexMap<String, NodeId>,
    pub children: Vec<ScopeId>,
    /// Stable identifier, unique within one tree.
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    /// Builds the scope tree for a script, function or class subtree.
    pub fn resolve(tree: &SyntaxTree, root: NodeId) -> Result<ScopeTree> {
        let kind = match tree.kind(root) {
            NodeKind::Script { .. } => ScopeKind::Script,
            NodeKind::Function { .. } => ScopeKind::Function,
            NodeKind::Class { .. } => ScopeKind::Class,
            other => {
                return Err(AnalysisError::MalformedTree(format!(
                    "scope resolution requires a script, function or class root, got {:?}",
                    other
                )))
            }
        };

        let mut scopes = ScopeTree { scopes: Vec::new() };
        let root_scope = scopes.push(Scope {
            kind,
            owner: root,
            parent: None,
            variables: IndexMap::new(),
            globals: IndexMap::new(),
            children: Vec::new(),
            identity: "root".to_string(),
        });
        scopes.populate(tree, root_scope)?;
        Ok(scopes)
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Scope ids in preorder, parents before children.
    pub fn preorder(&self) -> Vec<ScopeId> {
        let mut out = Vec::with_capacity(self.scopes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.scope(id).children.clone();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Walks from `at` to the root and returns the first declaration of
    /// `name`, or `None` when no scope in the chain declares it.
    pub fn variable_declaration(&self, at: ScopeId, name: &str) -> Option<NodeId> {
        let mut current = Some(at);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(decl) = scope.variables.get(name) {
                return Some(*decl);
            }
            current = scope.parent;
        }
        None
    }

    /// Like [`ScopeTree::variable_declaration`], but an error when nothing
    /// in the chain declares `name`.
    pub fn require_declaration(&self, at: ScopeId, name: &str) -> Result<NodeId> {
        self.variable_declaration(at, name)
            .ok_or_else(|| AnalysisError::UnresolvedScope {
                name: name.to_string(),
            })
    }

    /// True when `name` is declared in a non-root scope reachable from `at`.
    pub fn is_local(&self, at: ScopeId, name: &str) -> bool {
        let mut current = Some(at);
        while let Some(id) = current {
            let scope = self.scope(id);
            if scope.parent.is_none() {
                return false;
            }
            if scope.variables.contains_key(name) {
                return true;
            }
            current = scope.parent;
        }
        false
    }

    /// True when `name` resolves only at the root scope.
    pub fn is_global(&self, at: ScopeId, name: &str) -> bool {
        let mut current = Some(at);
        while let Some(id) = current {
            let scope = self.scope(id);
            if scope.globals.contains_key(name) {
                return true;
            }
            if scope.parent.is_none() {
                return scope.variables.contains_key(name);
            }
            if scope.variables.contains_key(name) {
                return false;
            }
            current = scope.parent;
        }
        false
    }

    /// The scope owned by the given function node, if any. Used to correlate
    /// a call target with its defining scope.
    pub fn function_scope(&self, function: NodeId) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|scope| scope.owner == function)
            .map(|idx| ScopeId(idx as u32))
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    fn populate(&mut self, tree: &SyntaxTree, id: ScopeId) -> Result<()> {
        let owner = self.scope(id).owner;

        // Parameters are part of the function's local scope.
        if let NodeKind::Function { params, .. } = tree.kind(owner) {
            for &param in params {
                if let Some(text) = tree.name_text(param) {
                    self.scopes[id.0 as usize]
                        .variables
                        .insert(text.to_string(), param);
                }
            }
        }

        let body = match tree.kind(owner) {
            NodeKind::Script { body }
            | NodeKind::Function { body, .. }
            | NodeKind::Class { body, .. } => body.clone(),
            other => {
                return Err(AnalysisError::MalformedTree(format!(
                    "scope owner must be a script, function or class, got {:?}",
                    other
                )))
            }
        };

        // Declarations first: `var` hoisting means an assignment textually
        // before the declaration still resolves to the local.
        let mut functions = Vec::new();
        let mut stack: Vec<NodeId> = body.iter().rev().copied().collect();

        while let Some(node) = stack.pop() {
            match tree.kind(node) {
                // Hoist the declaration, but leave the nested body for the
                // child scope.
                NodeKind::Function { name, .. } => {
                    if let Some(name) = name {
                        self.scopes[id.0 as usize]
                            .variables
                            .insert(name.clone(), node);
                    }
                    functions.push(node);
                    continue;
                }
                NodeKind::VarInit { target, .. } => {
                    if let Some(text) = tree.name_text(*target) {
                        self.scopes[id.0 as usize]
                            .variables
                            .insert(text.to_string(), *target);
                    }
                }
                _ => {}
            }
            let mut children = tree.children(node);
            children.reverse();
            stack.extend(children);
        }

        let mut stack: Vec<NodeId> = body.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            match tree.kind(node) {
                NodeKind::Function { .. } => continue,
                NodeKind::Assign { target, .. } => {
                    self.record_global(tree, id, *target);
                }
                NodeKind::ForIn { target, .. } => {
                    self.record_global(tree, id, *target);
                }
                NodeKind::For {
                    init: Some(init), ..
                } => {
                    self.record_global(tree, id, *init);
                }
                _ => {}
            }
            let mut children = tree.children(node);
            children.reverse();
            stack.extend(children);
        }

        for (index, function) in functions.into_iter().enumerate() {
            let identity = match tree.function_name(function) {
                Some(name) => format!("{}.{}:{}", self.scope(id).identity, index, name),
                None => format!("{}.{}", self.scope(id).identity, index),
            };
            let child = self.push(Scope {
                kind: ScopeKind::Function,
                owner: function,
                parent: Some(id),
                variables: IndexMap::new(),
                globals: IndexMap::new(),
                children: Vec::new(),
                identity,
            });
            self.scopes[id.0 as usize].children.push(child);
            self.populate(tree, child)?;
        }

        Ok(())
    }

    /// An assignment to a name that no scope in the chain declares makes that
    /// name a global, recorded at the root.
    fn record_global(&mut self, tree: &SyntaxTree, at: ScopeId, target: NodeId) {
        let Some(text) = tree.name_text(target) else {
            return;
        };
        if self.is_local(at, text) {
            return;
        }
        let root = self.root();
        if self.scope(root).variables.contains_key(text)
            || self.scope(root).globals.contains_key(text)
        {
            return;
        }
        self.scopes[root.0 as usize]
            .globals
            .insert(text.to_string(), target);
    }
}
