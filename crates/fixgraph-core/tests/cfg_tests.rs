use fixgraph_core::ast::{ChangeTag, LiteralValue, NodeId, NodeKind, SyntaxTree};
use fixgraph_core::cfg::{Cfg, CfgNodeKind, EdgeLabel};
use fixgraph_core::lower::build_cfgs;
use fixgraph_core::AnalysisError;
use pretty_assertions::assert_eq;

fn name(tree: &mut SyntaxTree, text: &str) -> NodeId {
    tree.add(
        NodeKind::Name {
            text: text.to_string(),
        },
        ChangeTag::Unchanged,
    )
}

fn number(tree: &mut SyntaxTree, digits: &str) -> NodeId {
    tree.add(
        NodeKind::Literal {
            value: LiteralValue::Number(digits.to_string()),
        },
        ChangeTag::Unchanged,
    )
}

fn assign(tree: &mut SyntaxTree, target: &str) -> NodeId {
    let target = name(tree, target);
    let value = number(tree, "1");
    tree.add(NodeKind::Assign { target, value }, ChangeTag::Unchanged)
}

fn script(tree: &mut SyntaxTree, body: Vec<NodeId>) -> NodeId {
    let root = tree.add(NodeKind::Script { body }, ChangeTag::Unchanged);
    tree.set_root(root);
    root
}

fn labels_out(cfg: &Cfg, node: fixgraph_core::cfg::CfgNodeId) -> Vec<EdgeLabel> {
    cfg.out_edges(node)
        .iter()
        .map(|&e| cfg.edge(e).label)
        .collect()
}

/// One entry, one exit, every node reachable, and every non-exit node can
/// make progress.
fn assert_well_formed(cfg: &Cfg) {
    let entries = cfg
        .nodes()
        .filter(|n| n.kind == CfgNodeKind::Entry)
        .count();
    let exits = cfg.nodes().filter(|n| n.kind == CfgNodeKind::Exit).count();
    assert_eq!(entries, 1);
    assert_eq!(exits, 1);

    let reachable = cfg.reachable_nodes();
    for node in cfg.nodes() {
        if node.kind != CfgNodeKind::Exit {
            assert!(
                !cfg.out_edges(node.id).is_empty(),
                "node {:?} has no successor",
                node.id
            );
        }
        assert!(
            reachable.contains(&node.id),
            "node {:?} is unreachable from the entry",
            node.id
        );
    }
}

#[test]
fn test_straight_line_script() {
    let mut tree = SyntaxTree::new();
    let a = assign(&mut tree, "a");
    let b = assign(&mut tree, "b");
    script(&mut tree, vec![a, b]);

    let cfgs = build_cfgs(&tree).unwrap();
    assert_eq!(cfgs.len(), 1);
    let cfg = &cfgs[0];

    let node_a = cfg.node_for_statement(a).unwrap();
    let node_b = cfg.node_for_statement(b).unwrap();
    assert_eq!(cfg.successors(cfg.entry()), vec![node_a]);
    assert_eq!(cfg.successors(node_a), vec![node_b]);
    assert_eq!(cfg.successors(node_b), vec![cfg.exit()]);
    assert_well_formed(cfg);
}

#[test]
fn test_if_else_branches_and_merge() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let then_branch = assign(&mut tree, "a");
    let else_branch = assign(&mut tree, "b");
    let branch = tree.add(
        NodeKind::If {
            condition: cond,
            then_branch,
            else_branch: Some(else_branch),
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![branch, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let split = cfg.node_for_statement(cond).unwrap();
    let mut labels = labels_out(cfg, split);
    labels.sort_by_key(|l| format!("{:?}", l));
    assert_eq!(labels, vec![EdgeLabel::False, EdgeLabel::True]);
    for &e in cfg.out_edges(split) {
        assert_eq!(cfg.edge(e).condition, Some(cond));
    }

    let merge = cfg.node_for_statement(after).unwrap();
    let then_node = cfg.node_for_statement(then_branch).unwrap();
    let else_node = cfg.node_for_statement(else_branch).unwrap();
    assert_eq!(cfg.successors(then_node), vec![merge]);
    assert_eq!(cfg.successors(else_node), vec![merge]);
    assert_well_formed(cfg);
}

#[test]
fn test_if_without_else_false_edge_reaches_continuation() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let then_branch = assign(&mut tree, "a");
    let branch = tree.add(
        NodeKind::If {
            condition: cond,
            then_branch,
            else_branch: None,
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![branch, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let split = cfg.node_for_statement(cond).unwrap();
    let merge = cfg.node_for_statement(after).unwrap();
    let false_edge = cfg
        .out_edges(split)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::False)
        .unwrap();
    assert_eq!(false_edge.to, merge);
    assert_well_formed(cfg);
}

#[test]
fn test_while_loop_back_edge() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let body = assign(&mut tree, "a");
    let looped = tree.add(
        NodeKind::While {
            condition: cond,
            body,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![looped]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let split = cfg.node_for_statement(cond).unwrap();
    let body_node = cfg.node_for_statement(body).unwrap();

    let back = cfg
        .out_edges(body_node)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.to == split)
        .unwrap();
    assert!(back.back_edge);

    let false_edge = cfg
        .out_edges(split)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::False)
        .unwrap();
    assert_eq!(false_edge.to, cfg.exit());
    assert_well_formed(cfg);
}

#[test]
fn test_break_and_continue_resolve_to_enclosing_loop() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let inner_cond = name(&mut tree, "d");
    let brk = tree.add(NodeKind::Break, ChangeTag::Unchanged);
    let cont = tree.add(NodeKind::Continue, ChangeTag::Unchanged);
    let inner = tree.add(
        NodeKind::If {
            condition: inner_cond,
            then_branch: brk,
            else_branch: Some(cont),
        },
        ChangeTag::Unchanged,
    );
    let looped = tree.add(
        NodeKind::While {
            condition: cond,
            body: inner,
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![looped, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let split = cfg.node_for_statement(cond).unwrap();
    let brk_node = cfg.node_for_statement(brk).unwrap();
    let cont_node = cfg.node_for_statement(cont).unwrap();
    let merge = cfg.node_for_statement(after).unwrap();

    assert_eq!(cfg.successors(brk_node), vec![merge]);
    assert_eq!(cfg.successors(cont_node), vec![split]);
    let cont_edge = cfg.edge(cfg.out_edges(cont_node)[0]);
    assert!(cont_edge.back_edge);
    assert_well_formed(cfg);
}

#[test]
fn test_break_outside_loop_is_an_error() {
    let mut tree = SyntaxTree::new();
    let brk = tree.add(NodeKind::Break, ChangeTag::Unchanged);
    script(&mut tree, vec![brk]);

    let err = build_cfgs(&tree).unwrap_err();
    assert!(matches!(err, AnalysisError::NoEnclosingLoop { .. }));
}

#[test]
fn test_do_while_executes_body_first() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let body = assign(&mut tree, "a");
    let looped = tree.add(
        NodeKind::DoWhile {
            condition: cond,
            body,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![looped]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let body_node = cfg.node_for_statement(body).unwrap();
    let split = cfg.node_for_statement(cond).unwrap();

    assert_eq!(cfg.successors(cfg.entry()), vec![body_node]);
    assert_eq!(cfg.successors(body_node), vec![split]);
    let true_edge = cfg
        .out_edges(split)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::True)
        .unwrap();
    assert_eq!(true_edge.to, body_node);
    assert!(true_edge.back_edge);
    assert_well_formed(cfg);
}

#[test]
fn test_for_loop_init_condition_update() {
    let mut tree = SyntaxTree::new();
    let init = assign(&mut tree, "i");
    let cond = name(&mut tree, "c");
    let update = assign(&mut tree, "i");
    let body = assign(&mut tree, "a");
    let looped = tree.add(
        NodeKind::For {
            init: Some(init),
            condition: Some(cond),
            update: Some(update),
            body,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![looped]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let init_node = cfg.node_for_statement(init).unwrap();
    let split = cfg.node_for_statement(cond).unwrap();
    let update_node = cfg.node_for_statement(update).unwrap();
    let body_node = cfg.node_for_statement(body).unwrap();

    assert_eq!(cfg.successors(cfg.entry()), vec![init_node]);
    assert_eq!(cfg.successors(init_node), vec![split]);
    assert_eq!(cfg.successors(body_node), vec![update_node]);
    let back = cfg.edge(cfg.out_edges(update_node)[0]);
    assert_eq!(back.to, split);
    assert!(back.back_edge);
    assert_well_formed(cfg);
}

#[test]
fn test_for_in_loop() {
    let mut tree = SyntaxTree::new();
    let target = name(&mut tree, "key");
    let object = name(&mut tree, "obj");
    let body = assign(&mut tree, "a");
    let looped = tree.add(
        NodeKind::ForIn {
            target,
            object,
            body,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![looped]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let init_node = cfg.node_for_statement(target).unwrap();
    let test_node = cfg.node_for_statement(looped).unwrap();
    let body_node = cfg.node_for_statement(body).unwrap();

    assert_eq!(cfg.successors(cfg.entry()), vec![init_node]);
    assert_eq!(cfg.successors(init_node), vec![test_node]);
    let true_edge = cfg
        .out_edges(test_node)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::True)
        .unwrap();
    assert_eq!(true_edge.to, body_node);
    assert_eq!(true_edge.condition, Some(object));
    let back = cfg.edge(cfg.out_edges(body_node)[0]);
    assert_eq!(back.to, test_node);
    assert!(back.back_edge);
    assert_well_formed(cfg);
}

#[test]
fn test_switch_fall_through_and_default() {
    let mut tree = SyntaxTree::new();
    let disc = name(&mut tree, "x");
    let t1 = number(&mut tree, "1");
    let b1 = assign(&mut tree, "a");
    let case1 = tree.add(
        NodeKind::Case {
            test: Some(t1),
            body: vec![b1],
        },
        ChangeTag::Unchanged,
    );
    let t2 = number(&mut tree, "2");
    let b2 = assign(&mut tree, "b");
    let brk = tree.add(NodeKind::Break, ChangeTag::Unchanged);
    let case2 = tree.add(
        NodeKind::Case {
            test: Some(t2),
            body: vec![b2, brk],
        },
        ChangeTag::Unchanged,
    );
    let bd = assign(&mut tree, "d");
    let default = tree.add(
        NodeKind::Case {
            test: None,
            body: vec![bd],
        },
        ChangeTag::Unchanged,
    );
    let switch = tree.add(
        NodeKind::Switch {
            discriminant: disc,
            cases: vec![case1, case2, default],
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![switch, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let body1 = cfg.node_for_statement(b1).unwrap();
    let body2 = cfg.node_for_statement(b2).unwrap();
    let body_default = cfg.node_for_statement(bd).unwrap();
    let brk_node = cfg.node_for_statement(brk).unwrap();
    let merge = cfg.node_for_statement(after).unwrap();

    // Case 1 falls through into case 2; break leaves the switch.
    assert_eq!(cfg.successors(body1), vec![body2]);
    assert_eq!(cfg.successors(brk_node), vec![merge]);

    // Each test node guards its True edge with the case test expression.
    let test1 = cfg.node_for_statement(case1).unwrap();
    let test2 = cfg.node_for_statement(case2).unwrap();
    let true1 = cfg
        .out_edges(test1)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::True)
        .unwrap();
    assert_eq!(true1.to, body1);
    assert_eq!(true1.condition, Some(t1));

    // Default runs only when no test fires.
    let false2 = cfg
        .out_edges(test2)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::False)
        .unwrap();
    assert_eq!(false2.to, body_default);
    assert_well_formed(cfg);
}

#[test]
fn test_try_catch_exception_edges() {
    let mut tree = SyntaxTree::new();
    let risky = assign(&mut tree, "a");
    let thrown = name(&mut tree, "boom");
    let throw = tree.add(NodeKind::Throw { value: thrown }, ChangeTag::Unchanged);
    let block = tree.add(
        NodeKind::Block {
            body: vec![risky, throw],
        },
        ChangeTag::Unchanged,
    );
    let handler_body = assign(&mut tree, "h");
    let handler_block = tree.add(
        NodeKind::Block {
            body: vec![handler_body],
        },
        ChangeTag::Unchanged,
    );
    let param = name(&mut tree, "e");
    let catch = tree.add(
        NodeKind::Catch {
            param: Some(param),
            body: handler_block,
        },
        ChangeTag::Unchanged,
    );
    let guarded = tree.add(
        NodeKind::Try {
            block,
            catch: Some(catch),
            finally: None,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![guarded]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let risky_node = cfg.node_for_statement(risky).unwrap();
    let throw_node = cfg.node_for_statement(throw).unwrap();
    let handler_node = cfg.node_for_statement(handler_body).unwrap();

    for node in [risky_node, throw_node] {
        let exceptional = cfg
            .out_edges(node)
            .iter()
            .map(|&e| cfg.edge(e))
            .find(|e| e.label == EdgeLabel::Exception)
            .unwrap();
        assert_eq!(exceptional.to, handler_node);
    }

    // The raise is routed to the handler, never straight to the exit.
    assert!(cfg.successors(throw_node).iter().all(|&s| s != cfg.exit()));
    assert_well_formed(cfg);
}

#[test]
fn test_uncaught_throw_reaches_exit_exceptionally() {
    let mut tree = SyntaxTree::new();
    let thrown = name(&mut tree, "boom");
    let throw = tree.add(NodeKind::Throw { value: thrown }, ChangeTag::Unchanged);
    script(&mut tree, vec![throw]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let throw_node = cfg.node_for_statement(throw).unwrap();
    let edge = cfg.edge(cfg.out_edges(throw_node)[0]);
    assert_eq!(edge.to, cfg.exit());
    assert_eq!(edge.label, EdgeLabel::Exception);
    assert_well_formed(cfg);
}

#[test]
fn test_finally_runs_on_normal_exit() {
    let mut tree = SyntaxTree::new();
    let risky = assign(&mut tree, "a");
    let cleanup = assign(&mut tree, "c");
    let guarded = tree.add(
        NodeKind::Try {
            block: risky,
            catch: None,
            finally: Some(cleanup),
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![guarded, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let risky_node = cfg.node_for_statement(risky).unwrap();
    let cleanup_node = cfg.node_for_statement(cleanup).unwrap();
    let merge = cfg.node_for_statement(after).unwrap();
    assert_eq!(cfg.successors(risky_node), vec![cleanup_node]);
    assert_eq!(cfg.successors(cleanup_node), vec![merge]);
    assert_well_formed(cfg);
}

#[test]
fn test_short_circuit_condition_splits() {
    let mut tree = SyntaxTree::new();
    let a = name(&mut tree, "a");
    let b = name(&mut tree, "b");
    let cond = tree.add(NodeKind::And { left: a, right: b }, ChangeTag::Unchanged);
    let then_branch = assign(&mut tree, "x");
    let branch = tree.add(
        NodeKind::If {
            condition: cond,
            then_branch,
            else_branch: None,
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![branch]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let split_a = cfg.node_for_statement(a).unwrap();
    let split_b = cfg.node_for_statement(b).unwrap();
    let then_node = cfg.node_for_statement(then_branch).unwrap();

    let true_a = cfg
        .out_edges(split_a)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::True)
        .unwrap();
    assert_eq!(true_a.to, split_b);
    assert_eq!(true_a.condition, Some(a));

    let true_b = cfg
        .out_edges(split_b)
        .iter()
        .map(|&e| cfg.edge(e))
        .find(|e| e.label == EdgeLabel::True)
        .unwrap();
    assert_eq!(true_b.to, then_node);

    // Both False edges skip the branch.
    for split in [split_a, split_b] {
        let false_edge = cfg
            .out_edges(split)
            .iter()
            .map(|&e| cfg.edge(e))
            .find(|e| e.label == EdgeLabel::False)
            .unwrap();
        assert_eq!(false_edge.to, cfg.exit());
    }

    assert_well_formed(cfg);
}

#[test]
fn test_return_merges_into_exit() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let ret = tree.add(NodeKind::Return { value: None }, ChangeTag::Unchanged);
    let branch = tree.add(
        NodeKind::If {
            condition: cond,
            then_branch: ret,
            else_branch: None,
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    let func = tree.add(
        NodeKind::Function {
            name: Some("f".to_string()),
            params: vec![],
            body: vec![branch, after],
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![func]);

    let cfgs = build_cfgs(&tree).unwrap();
    assert_eq!(cfgs.len(), 2);
    let cfg = cfgs.iter().find(|c| c.owner == func).unwrap();
    let ret_node = cfg.node_for_statement(ret).unwrap();
    assert_eq!(cfg.successors(ret_node), vec![cfg.exit()]);
    assert_well_formed(cfg);
}

#[test]
fn test_functions_get_their_own_cfgs() {
    let mut tree = SyntaxTree::new();
    let inner_body = assign(&mut tree, "b");
    let inner = tree.add(
        NodeKind::Function {
            name: Some("inner".to_string()),
            params: vec![],
            body: vec![inner_body],
        },
        ChangeTag::Unchanged,
    );
    let outer_body = assign(&mut tree, "a");
    let outer = tree.add(
        NodeKind::Function {
            name: Some("outer".to_string()),
            params: vec![],
            body: vec![outer_body, inner],
        },
        ChangeTag::Unchanged,
    );
    let root = script(&mut tree, vec![outer]);

    let cfgs = build_cfgs(&tree).unwrap();
    assert_eq!(cfgs.len(), 3);
    assert_eq!(cfgs[0].owner, root);
    assert!(cfgs.iter().any(|c| c.owner == outer));
    assert!(cfgs.iter().any(|c| c.owner == inner));

    // The nested function contributes no nodes to the outer graph.
    let outer_cfg = cfgs.iter().find(|c| c.owner == outer).unwrap();
    assert!(outer_cfg.node_for_statement(inner_body).is_none());

    for cfg in &cfgs {
        assert_well_formed(cfg);
    }
}

#[test]
fn test_cfg_well_formedness() {
    let mut tree = SyntaxTree::new();
    let cond = name(&mut tree, "c");
    let body = assign(&mut tree, "a");
    let looped = tree.add(
        NodeKind::While {
            condition: cond,
            body,
        },
        ChangeTag::Unchanged,
    );
    let after = assign(&mut tree, "z");
    script(&mut tree, vec![looped, after]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    assert_well_formed(cfg);
}

#[test]
fn test_statements_after_return_are_unreachable() {
    let mut tree = SyntaxTree::new();
    let ret = tree.add(NodeKind::Return { value: None }, ChangeTag::Unchanged);
    let dead = assign(&mut tree, "z");
    let func = tree.add(
        NodeKind::Function {
            name: Some("f".to_string()),
            params: vec![],
            body: vec![ret, dead],
        },
        ChangeTag::Unchanged,
    );
    script(&mut tree, vec![func]);

    let cfgs = build_cfgs(&tree).unwrap();
    let cfg = cfgs.iter().find(|c| c.owner == func).unwrap();

    // Dead code keeps its node but never joins the reachable set.
    let dead_node = cfg.node_for_statement(dead).unwrap();
    let reachable = cfg.reachable_nodes();
    assert!(!reachable.contains(&dead_node));
    assert!(reachable.contains(&cfg.node_for_statement(ret).unwrap()));
    assert!(reachable.contains(&cfg.exit()));
}

#[test]
fn test_change_tags_survive_lowering() {
    let mut tree = SyntaxTree::new();
    let target = name(&mut tree, "a");
    let value = number(&mut tree, "1");
    let inserted = tree.add(NodeKind::Assign { target, value }, ChangeTag::Inserted);
    script(&mut tree, vec![inserted]);

    let cfg = &build_cfgs(&tree).unwrap()[0];
    let node = cfg.node(cfg.node_for_statement(inserted).unwrap());
    assert_eq!(node.change, ChangeTag::Inserted);
}
