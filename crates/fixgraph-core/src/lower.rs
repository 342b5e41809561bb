/*! Lowering of syntax trees to control-flow graphs.
 *
 * Each construct lowers to a subgraph with one entry and a set of dangling
 * out-edges; enclosing constructs splice subgraphs together. Jump statements
 * (break, continue, return, throw) leave their dangling edge in a dedicated
 * list that the nearest enclosing loop, switch or the function itself
 * resolves.
 */

use crate::ast::{NodeId, NodeKind, SyntaxTree};
use crate::cfg::{Cfg, CfgNodeId, CfgNodeKind, EdgeLabel};
use crate::{AnalysisError, Result};

/// A dangling out-edge waiting for its target.
#[derive(Debug, Clone, Copy)]
struct Pending {
    from: CfgNodeId,
    label: EdgeLabel,
    condition: Option<NodeId>,
}

impl Pending {
    fn fallthrough(from: CfgNodeId) -> Self {
        Self {
            from,
            label: EdgeLabel::Fallthrough,
            condition: None,
        }
    }
}

#[derive(Debug, Default)]
struct Subgraph {
    entry: Option<CfgNodeId>,
    exits: Vec<Pending>,
    breaks: Vec<Pending>,
    continues: Vec<Pending>,
    returns: Vec<Pending>,
    throws: Vec<Pending>,
}

impl Subgraph {
    fn absorb_jumps(&mut self, other: &mut Subgraph) {
        self.breaks.append(&mut other.breaks);
        self.continues.append(&mut other.continues);
        self.returns.append(&mut other.returns);
        self.throws.append(&mut other.throws);
    }
}

/// A lowered branch condition: a cascade of split nodes for short-circuit
/// operators, or a single split node otherwise.
#[derive(Debug)]
struct CondGraph {
    entry: CfgNodeId,
    true_exits: Vec<Pending>,
    false_exits: Vec<Pending>,
}

/// Builds one CFG per function and script in the tree, the script's first.
pub fn build_cfgs(tree: &SyntaxTree) -> Result<Vec<Cfg>> {
    let root = tree
        .root()
        .ok_or_else(|| AnalysisError::MalformedTree("tree has no root".to_string()))?;

    let mut cfgs = vec![build_cfg(tree, root)?];
    for function in tree.functions(root) {
        cfgs.push(build_cfg(tree, function)?);
    }
    Ok(cfgs)
}

/// Builds the CFG for a single function, script or class node.
pub fn build_cfg(tree: &SyntaxTree, owner: NodeId) -> Result<Cfg> {
    let body = match tree.kind(owner) {
        NodeKind::Script { body }
        | NodeKind::Function { body, .. }
        | NodeKind::Class { body, .. } => body.clone(),
        other => {
            return Err(AnalysisError::MalformedTree(format!(
                "cannot build a CFG for {:?}",
                other
            )))
        }
    };

    let mut lowering = Lowering {
        tree,
        cfg: Cfg::new(owner, tree.change(owner)),
    };

    let sub = lowering.lower_block(&body)?;
    let entry = lowering.cfg.entry();
    let exit = lowering.cfg.exit();

    match sub {
        Some(mut sub) => {
            if let Some(sub_entry) = sub.entry {
                lowering
                    .cfg
                    .add_edge(entry, sub_entry, EdgeLabel::Fallthrough, None);
            }
            if !sub.breaks.is_empty() {
                return Err(AnalysisError::NoEnclosingLoop {
                    statement: "break".to_string(),
                });
            }
            if !sub.continues.is_empty() {
                return Err(AnalysisError::NoEnclosingLoop {
                    statement: "continue".to_string(),
                });
            }
            lowering.connect(&sub.exits, exit, false);
            lowering.connect(&sub.returns, exit, false);
            for pending in std::mem::take(&mut sub.throws) {
                lowering
                    .cfg
                    .add_edge(pending.from, exit, EdgeLabel::Exception, None);
            }
        }
        None => {
            lowering
                .cfg
                .add_edge(entry, exit, EdgeLabel::Fallthrough, None);
        }
    }

    Ok(lowering.cfg)
}

struct Lowering<'a> {
    tree: &'a SyntaxTree,
    cfg: Cfg,
}

impl<'a> Lowering<'a> {
    fn statement_node(&mut self, statement: NodeId) -> CfgNodeId {
        self.cfg.add_node(
            CfgNodeKind::Statement,
            Some(statement),
            self.tree.change(statement),
        )
    }

    fn connect(&mut self, pending: &[Pending], target: CfgNodeId, back_edge: bool) {
        for p in pending {
            if back_edge {
                self.cfg.add_back_edge(p.from, target, p.label, p.condition);
            } else {
                self.cfg.add_edge(p.from, target, p.label, p.condition);
            }
        }
    }

    fn lower_block(&mut self, statements: &[NodeId]) -> Result<Option<Subgraph>> {
        let mut block: Option<Subgraph> = None;

        for &statement in statements {
            let Some(mut sub) = self.lower_statement(statement)? else {
                continue;
            };

            match block.as_mut() {
                None => block = Some(sub),
                Some(block) => {
                    if let Some(entry) = sub.entry {
                        let exits = std::mem::take(&mut block.exits);
                        self.connect(&exits, entry, false);
                    }
                    block.exits = std::mem::take(&mut sub.exits);
                    block.absorb_jumps(&mut sub);
                }
            }
        }

        Ok(block)
    }

    fn lower_statement(&mut self, statement: NodeId) -> Result<Option<Subgraph>> {
        match self.tree.kind(statement).clone() {
            // Function declarations get their own CFG; they contribute no
            // nodes to the enclosing graph.
            NodeKind::Function { .. } => Ok(None),
            NodeKind::Block { body } => self.lower_block(&body),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch).map(Some),
            NodeKind::While { condition, body } => self.lower_while(condition, body).map(Some),
            NodeKind::DoWhile { condition, body } => {
                self.lower_do_while(condition, body).map(Some)
            }
            NodeKind::For {
                init,
                condition,
                update,
                body,
            } => self.lower_for(init, condition, update, body).map(Some),
            NodeKind::ForIn {
                target,
                object,
                body,
            } => self.lower_for_in(statement, target, object, body).map(Some),
            NodeKind::Switch {
                discriminant: _,
                cases,
            } => self.lower_switch(statement, &cases).map(Some),
            NodeKind::Try {
                block,
                catch,
                finally,
            } => self.lower_try(block, catch, finally).map(Some),
            NodeKind::Break => {
                let node = self.statement_node(statement);
                let mut sub = Subgraph::default();
                sub.entry = Some(node);
                sub.breaks.push(Pending::fallthrough(node));
                Ok(Some(sub))
            }
            NodeKind::Continue => {
                let node = self.statement_node(statement);
                let mut sub = Subgraph::default();
                sub.entry = Some(node);
                sub.continues.push(Pending::fallthrough(node));
                Ok(Some(sub))
            }
            NodeKind::Return { .. } => {
                let node = self.statement_node(statement);
                let mut sub = Subgraph::default();
                sub.entry = Some(node);
                sub.returns.push(Pending::fallthrough(node));
                Ok(Some(sub))
            }
            NodeKind::Throw { .. } => {
                let node = self.statement_node(statement);
                let mut sub = Subgraph::default();
                sub.entry = Some(node);
                sub.throws.push(Pending::fallthrough(node));
                Ok(Some(sub))
            }
            NodeKind::Case { .. } | NodeKind::Catch { .. } | NodeKind::VarInit { .. } => {
                Err(AnalysisError::MalformedTree(format!(
                    "{:?} cannot appear as a statement",
                    self.tree.kind(statement)
                )))
            }
            // Everything else is a straight-line statement.
            _ => {
                let node = self.statement_node(statement);
                let mut sub = Subgraph::default();
                sub.entry = Some(node);
                sub.exits.push(Pending::fallthrough(node));
                Ok(Some(sub))
            }
        }
    }

    /// Short-circuit operators become explicit control splits: the right
    /// operand of `&&`/`||` is only evaluated on one branch.
    fn lower_condition(&mut self, condition: NodeId) -> CondGraph {
        match self.tree.kind(condition).clone() {
            NodeKind::And { left, right } => {
                let first = self.lower_condition(left);
                let second = self.lower_condition(right);
                self.connect(&first.true_exits, second.entry, false);
                let mut false_exits = first.false_exits;
                false_exits.extend(second.false_exits);
                CondGraph {
                    entry: first.entry,
                    true_exits: second.true_exits,
                    false_exits,
                }
            }
            NodeKind::Or { left, right } => {
                let first = self.lower_condition(left);
                let second = self.lower_condition(right);
                self.connect(&first.false_exits, second.entry, false);
                let mut true_exits = first.true_exits;
                true_exits.extend(second.true_exits);
                CondGraph {
                    entry: first.entry,
                    true_exits,
                    false_exits: second.false_exits,
                }
            }
            _ => {
                let node = self.statement_node(condition);
                CondGraph {
                    entry: node,
                    true_exits: vec![Pending {
                        from: node,
                        label: EdgeLabel::True,
                        condition: Some(condition),
                    }],
                    false_exits: vec![Pending {
                        from: node,
                        label: EdgeLabel::False,
                        condition: Some(condition),
                    }],
                }
            }
        }
    }

    fn lower_if(
        &mut self,
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    ) -> Result<Subgraph> {
        let cond = self.lower_condition(condition);
        let mut sub = Subgraph::default();
        sub.entry = Some(cond.entry);

        match self.lower_statement(then_branch)? {
            Some(mut branch) => {
                match branch.entry {
                    Some(entry) => self.connect(&cond.true_exits, entry, false),
                    None => sub.exits.extend(cond.true_exits),
                }
                sub.exits.append(&mut branch.exits);
                sub.absorb_jumps(&mut branch);
            }
            None => sub.exits.extend(cond.true_exits),
        }

        match else_branch.map(|e| self.lower_statement(e)).transpose()? {
            Some(Some(mut branch)) => {
                match branch.entry {
                    Some(entry) => self.connect(&cond.false_exits, entry, false),
                    None => sub.exits.extend(cond.false_exits),
                }
                sub.exits.append(&mut branch.exits);
                sub.absorb_jumps(&mut branch);
            }
            _ => sub.exits.extend(cond.false_exits),
        }

        Ok(sub)
    }

    fn lower_while(&mut self, condition: NodeId, body: NodeId) -> Result<Subgraph> {
        let cond = self.lower_condition(condition);
        let mut sub = Subgraph::default();
        sub.entry = Some(cond.entry);
        sub.exits.extend(cond.false_exits);

        match self.lower_statement(body)? {
            Some(mut inner) => {
                match inner.entry {
                    Some(entry) => self.connect(&cond.true_exits, entry, false),
                    None => self.connect(&cond.true_exits, cond.entry, true),
                }
                self.connect(&inner.exits, cond.entry, true);
                self.connect(&inner.continues, cond.entry, true);
                sub.exits.append(&mut inner.breaks);
                sub.returns.append(&mut inner.returns);
                sub.throws.append(&mut inner.throws);
            }
            None => self.connect(&cond.true_exits, cond.entry, true),
        }

        Ok(sub)
    }

    fn lower_do_while(&mut self, condition: NodeId, body: NodeId) -> Result<Subgraph> {
        let body_sub = self.lower_statement(body)?;
        let cond = self.lower_condition(condition);
        let mut sub = Subgraph::default();
        sub.exits.extend(cond.false_exits);

        match body_sub {
            Some(mut inner) => {
                sub.entry = inner.entry.or(Some(cond.entry));
                if let Some(entry) = inner.entry {
                    self.connect(&cond.true_exits, entry, true);
                    self.connect(&inner.exits, cond.entry, false);
                    self.connect(&inner.continues, cond.entry, false);
                } else {
                    self.connect(&cond.true_exits, cond.entry, true);
                }
                sub.exits.append(&mut inner.breaks);
                sub.returns.append(&mut inner.returns);
                sub.throws.append(&mut inner.throws);
            }
            None => {
                sub.entry = Some(cond.entry);
                self.connect(&cond.true_exits, cond.entry, true);
            }
        }

        Ok(sub)
    }

    fn lower_for(
        &mut self,
        init: Option<NodeId>,
        condition: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) -> Result<Subgraph> {
        let init_node = init.map(|i| self.statement_node(i));
        let cond = condition.map(|c| self.lower_condition(c));
        let update_node = update.map(|u| self.statement_node(u));

        let mut sub = Subgraph::default();

        // Where one iteration starts: the condition test, or straight into
        // the body for a condition-less `for(;;)`.
        let body_sub = self.lower_statement(body)?;
        let body_entry = body_sub.as_ref().and_then(|b| b.entry);

        let round_entry = match (&cond, body_entry, update_node) {
            (Some(cond), _, _) => cond.entry,
            (None, Some(entry), _) => entry,
            (None, None, Some(update)) => update,
            // Degenerate `for(;;);` with an empty body: a single node looping
            // on itself via the init node is still representable.
            (None, None, None) => {
                let node = init_node.unwrap_or_else(|| {
                    self.cfg
                        .add_node(CfgNodeKind::Statement, None, crate::ast::ChangeTag::Unchanged)
                });
                self.cfg
                    .add_back_edge(node, node, EdgeLabel::Fallthrough, None);
                sub.entry = Some(node);
                return Ok(sub);
            }
        };

        match init_node {
            Some(init) => {
                sub.entry = Some(init);
                self.cfg
                    .add_edge(init, round_entry, EdgeLabel::Fallthrough, None);
            }
            None => sub.entry = Some(round_entry),
        }

        // Where the body continues: the update expression, then back to the
        // start of the round.
        let continue_target = update_node.unwrap_or(round_entry);
        if let Some(update) = update_node {
            self.cfg
                .add_back_edge(update, round_entry, EdgeLabel::Fallthrough, None);
        }

        if let Some(cond) = &cond {
            sub.exits.extend(cond.false_exits.iter().copied());
            match body_entry {
                Some(entry) => self.connect(&cond.true_exits, entry, false),
                None => self.connect(&cond.true_exits, continue_target, update_node.is_none()),
            }
        }

        if let Some(mut inner) = body_sub {
            let looping = update_node.is_none();
            self.connect(&inner.exits, continue_target, looping);
            self.connect(&inner.continues, continue_target, looping);
            sub.exits.append(&mut inner.breaks);
            sub.returns.append(&mut inner.returns);
            sub.throws.append(&mut inner.throws);
        }

        Ok(sub)
    }

    fn lower_for_in(
        &mut self,
        statement: NodeId,
        target: NodeId,
        object: NodeId,
        body: NodeId,
    ) -> Result<Subgraph> {
        // The iterator declaration runs once; the split node then tests for
        // a next key on each round.
        let init = self.statement_node(target);
        let test = self.statement_node(statement);
        self.cfg.add_edge(init, test, EdgeLabel::Fallthrough, None);

        let mut sub = Subgraph::default();
        sub.entry = Some(init);
        sub.exits.push(Pending {
            from: test,
            label: EdgeLabel::False,
            condition: Some(object),
        });

        match self.lower_statement(body)? {
            Some(mut inner) => {
                match inner.entry {
                    Some(entry) => {
                        self.cfg
                            .add_edge(test, entry, EdgeLabel::True, Some(object));
                    }
                    None => {
                        self.cfg
                            .add_back_edge(test, test, EdgeLabel::True, Some(object));
                    }
                }
                self.connect(&inner.exits, test, true);
                self.connect(&inner.continues, test, true);
                sub.exits.append(&mut inner.breaks);
                sub.returns.append(&mut inner.returns);
                sub.throws.append(&mut inner.throws);
            }
            None => {
                self.cfg
                    .add_back_edge(test, test, EdgeLabel::True, Some(object));
            }
        }

        Ok(sub)
    }

    fn lower_switch(&mut self, statement: NodeId, cases: &[NodeId]) -> Result<Subgraph> {
        let discriminant = self.statement_node(statement);
        let mut sub = Subgraph::default();
        sub.entry = Some(discriminant);

        // Lower every case body first so fall-through can chain them in
        // source order.
        let mut bodies: Vec<Option<Subgraph>> = Vec::with_capacity(cases.len());
        for &case in cases {
            let NodeKind::Case { body, .. } = self.tree.kind(case).clone() else {
                return Err(AnalysisError::MalformedTree(
                    "switch child is not a case".to_string(),
                ));
            };
            bodies.push(self.lower_block(&body)?);
        }

        // Effective entry of case i: its own body, or the next non-empty
        // body when the case is empty (fall-through).
        let entry_at = |bodies: &[Option<Subgraph>], i: usize| -> Option<CfgNodeId> {
            bodies[i..]
                .iter()
                .find_map(|b| b.as_ref().and_then(|b| b.entry))
        };

        // Chain fall-through between consecutive non-empty bodies.
        let mut previous_exits: Vec<Pending> = Vec::new();
        for i in 0..cases.len() {
            let Some(body) = bodies[i].as_mut() else {
                continue;
            };
            if let Some(entry) = body.entry {
                let exits = std::mem::take(&mut previous_exits);
                self.connect(&exits, entry, false);
            }
            previous_exits = std::mem::take(&mut body.exits);
            sub.exits.append(&mut body.breaks);
            sub.continues.append(&mut body.continues);
            sub.returns.append(&mut body.returns);
            sub.throws.append(&mut body.throws);
        }
        sub.exits.append(&mut previous_exits);

        // Equality-test cascade in source order; default is reached only
        // when no case fires.
        let default_entry = cases
            .iter()
            .position(|&case| matches!(self.tree.kind(case), NodeKind::Case { test: None, .. }))
            .and_then(|i| entry_at(&bodies, i));

        let mut pending_test = Pending::fallthrough(discriminant);
        for (i, &case) in cases.iter().enumerate() {
            let NodeKind::Case { test: Some(test), .. } = self.tree.kind(case).clone() else {
                continue;
            };
            let test_node = self.statement_node(case);
            self.cfg.add_edge(
                pending_test.from,
                test_node,
                pending_test.label,
                pending_test.condition,
            );
            match entry_at(&bodies, i) {
                Some(entry) => {
                    self.cfg
                        .add_edge(test_node, entry, EdgeLabel::True, Some(test));
                }
                None => sub.exits.push(Pending {
                    from: test_node,
                    label: EdgeLabel::True,
                    condition: Some(test),
                }),
            }
            pending_test = Pending {
                from: test_node,
                label: EdgeLabel::False,
                condition: Some(test),
            };
        }

        match default_entry {
            Some(entry) => {
                self.cfg.add_edge(
                    pending_test.from,
                    entry,
                    pending_test.label,
                    pending_test.condition,
                );
            }
            None => sub.exits.push(pending_test),
        }

        Ok(sub)
    }

    fn lower_try(
        &mut self,
        block: NodeId,
        catch: Option<NodeId>,
        finally: Option<NodeId>,
    ) -> Result<Subgraph> {
        let guarded_start = self.cfg.node_count();
        let block_sub = self.lower_statement(block)?;
        let guarded_end = self.cfg.node_count();

        let catch_sub = match catch {
            Some(clause) => {
                let NodeKind::Catch { body, .. } = self.tree.kind(clause).clone() else {
                    return Err(AnalysisError::MalformedTree(
                        "try handler is not a catch clause".to_string(),
                    ));
                };
                let sub = match self.lower_statement(body)? {
                    Some(sub) => sub,
                    None => {
                        let node = self.statement_node(clause);
                        let mut sub = Subgraph::default();
                        sub.entry = Some(node);
                        sub.exits.push(Pending::fallthrough(node));
                        sub
                    }
                };
                Some(sub)
            }
            None => None,
        };

        let finally_sub = finally.map(|f| self.lower_statement(f)).transpose()?.flatten();

        let mut sub = Subgraph::default();

        // Every node in the guarded body may raise; give each an exceptional
        // edge into the handler.
        if let Some(catch_sub) = &catch_sub {
            if let Some(catch_entry) = catch_sub.entry {
                for raw in guarded_start..guarded_end {
                    self.cfg.add_edge(
                        CfgNodeId(raw as u32),
                        catch_entry,
                        EdgeLabel::Exception,
                        None,
                    );
                }
            }
        }

        // Normal continuation: guarded body, then finally, then out.
        let after_guarded = finally_sub.as_ref().and_then(|f| f.entry);

        match block_sub {
            Some(mut inner) => {
                sub.entry = inner.entry;
                match after_guarded {
                    Some(finally_entry) => self.connect(&inner.exits, finally_entry, false),
                    None => sub.exits.append(&mut inner.exits),
                }
                if catch_sub.is_some() {
                    // Raises inside the guarded body reach the handler via
                    // the exceptional edges above.
                    inner.throws.clear();
                }
                sub.absorb_jumps(&mut inner);
            }
            None => sub.entry = after_guarded.or_else(|| catch_sub.as_ref().and_then(|c| c.entry)),
        }

        if let Some(mut handler) = catch_sub {
            match after_guarded {
                Some(finally_entry) => self.connect(&handler.exits, finally_entry, false),
                None => sub.exits.append(&mut handler.exits),
            }
            sub.absorb_jumps(&mut handler);
        }

        if let Some(mut fin) = finally_sub {
            sub.exits.append(&mut fin.exits);
            sub.absorb_jumps(&mut fin);
            if sub.entry.is_none() {
                sub.entry = fin.entry;
            }
        }

        if sub.entry.is_none() {
            // try {} with no catch body and no finally.
            let node = self.statement_node(block);
            sub.entry = Some(node);
            sub.exits.push(Pending::fallthrough(node));
        }

        Ok(sub)
    }
}
