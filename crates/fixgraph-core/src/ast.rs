/*! Change-annotated syntax trees.
 *
 * Parsing and tree differencing happen outside this crate. What arrives here
 * is an arena of nodes where every node carries the change classification
 * computed by the differencer and, for nodes that survived from the source
 * version, a back-reference to the matching source node.
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Change classification assigned to every node by the external differencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeTag {
    Unchanged,
    Inserted,
    Removed,
    Moved,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Undefined,
    Bool(bool),
    Number(String),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Script {
        body: Vec<NodeId>,
    },
    Function {
        name: Option<String>,
        params: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Class {
        name: Option<String>,
        body: Vec<NodeId>,
    },
    Block {
        body: Vec<NodeId>,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    DoWhile {
        condition: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    /// `for (target in object)` and `for (target of object)` loops; both
    /// iterate until the object is exhausted.
    ForIn {
        target: NodeId,
        object: NodeId,
        body: NodeId,
    },
    Switch {
        discriminant: NodeId,
        cases: Vec<NodeId>,
    },
    Case {
        test: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Try {
        block: NodeId,
        catch: Option<NodeId>,
        finally: Option<NodeId>,
    },
    Catch {
        param: Option<NodeId>,
        body: NodeId,
    },
    Break,
    Continue,
    Return {
        value: Option<NodeId>,
    },
    Throw {
        value: NodeId,
    },
    VarDecl {
        declarations: Vec<NodeId>,
    },
    VarInit {
        target: NodeId,
        init: Option<NodeId>,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Not {
        operand: NodeId,
    },
    TypeOf {
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Name {
        text: String,
    },
    Literal {
        value: LiteralValue,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: NodeKind,
    pub change: ChangeTag,
    /// Matching node in the paired source tree, when this is a destination
    /// tree and the node was not inserted.
    pub mapped: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntaxTree {
    nodes: Vec<AstNode>,
    root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: NodeKind, change: ChangeTag) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode {
            kind,
            change,
            mapped: None,
        });
        id
    }

    pub fn add_mapped(&mut self, kind: NodeKind, change: ChangeTag, mapped: NodeId) -> NodeId {
        let id = self.add(kind, change);
        self.nodes[id.0 as usize].mapped = Some(mapped);
        id
    }

    pub fn set_mapped(&mut self, id: NodeId, mapped: NodeId) {
        self.nodes[id.0 as usize].mapped = Some(mapped);
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn change(&self, id: NodeId) -> ChangeTag {
        self.nodes[id.0 as usize].change
    }

    pub fn mapped(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].mapped
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child nodes in source order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Script { body }
            | NodeKind::Block { body }
            | NodeKind::Class { body, .. } => body.clone(),
            NodeKind::Function { params, body, .. } => {
                let mut out = params.clone();
                out.extend(body.iter().copied());
                out
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = vec![*condition, *then_branch];
                out.extend(else_branch.iter().copied());
                out
            }
            NodeKind::While { condition, body } | NodeKind::DoWhile { condition, body } => {
                vec![*condition, *body]
            }
            NodeKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let mut out = Vec::new();
                out.extend(init.iter().copied());
                out.extend(condition.iter().copied());
                out.extend(update.iter().copied());
                out.push(*body);
                out
            }
            NodeKind::ForIn {
                target,
                object,
                body,
            } => vec![*target, *object, *body],
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                let mut out = vec![*discriminant];
                out.extend(cases.iter().copied());
                out
            }
            NodeKind::Case { test, body } => {
                let mut out = Vec::new();
                out.extend(test.iter().copied());
                out.extend(body.iter().copied());
                out
            }
            NodeKind::Try {
                block,
                catch,
                finally,
            } => {
                let mut out = vec![*block];
                out.extend(catch.iter().copied());
                out.extend(finally.iter().copied());
                out
            }
            NodeKind::Catch { param, body } => {
                let mut out = Vec::new();
                out.extend(param.iter().copied());
                out.push(*body);
                out
            }
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Throw { value } => vec![*value],
            NodeKind::VarDecl { declarations } => declarations.clone(),
            NodeKind::VarInit { target, init } => {
                let mut out = vec![*target];
                out.extend(init.iter().copied());
                out
            }
            NodeKind::Assign { target, value } => vec![*target, *value],
            NodeKind::Call { callee, args } => {
                let mut out = vec![*callee];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::And { left, right }
            | NodeKind::Or { left, right }
            | NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Not { operand } | NodeKind::TypeOf { operand } => vec![*operand],
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Name { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Empty => Vec::new(),
        }
    }

    pub fn is_function(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Function { .. })
    }

    /// Name of a function node, or `None` for anonymous functions and
    /// non-function nodes.
    pub fn function_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Function { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// Identifier text of a `Name` node.
    pub fn name_text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Name { text } => Some(text.as_str()),
            _ => None,
        }
    }

    /// All function nodes in the subtree rooted at `id`, in preorder.
    pub fn functions(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if current != id && self.is_function(current) {
                out.push(current);
            }
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out.sort();
        out
    }
}
