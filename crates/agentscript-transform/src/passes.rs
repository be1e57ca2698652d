//! The rewrite rules themselves, applied in one traversal via
//! `oxc_traverse::Traverse` (spec §4.2).
//!
//! oxc's own transformer runs many independent proposals through a single
//! `Traverse` pass over one arena-allocated AST; this module follows the
//! same shape rather than re-parsing between each named rewrite.

use oxc::allocator::Vec as ArenaVec;
use oxc::ast::ast::{
    Argument, BinaryOperator, Expression, ForStatement, ForStatementInit,
    ForStatementLeft as ForOfLeft, Statement,
};

/// Identifiers the executor's curated globals bind to the two unique
/// sentinel values a loop body's wrapped callback returns to signal
/// `break`/`continue` to the `__safe_*` helper driving it (spec §4.2:
/// "`break`/`continue` semantics are preserved via return-sentinel values
/// understood by the helpers").
pub const LOOP_BREAK_SENTINEL: &str = "__ag_loop_break";
pub const LOOP_CONTINUE_SENTINEL: &str = "__ag_loop_continue";
use oxc::ast::NONE;
use oxc::span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::options::TransformOptions;

/// Shared mutable state for one transform run.
pub struct RewritePass<'o> {
    pub options: &'o TransformOptions,
    pub saw_call_tool_callee: bool,
}

impl<'o> RewritePass<'o> {
    pub fn new(options: &'o TransformOptions) -> Self {
        Self {
            options,
            saw_call_tool_callee: false,
        }
    }
}

impl<'a, 'o> Traverse<'a> for RewritePass<'o> {
    fn exit_expression(&mut self, node: &mut Expression<'a>, ctx: &mut TraverseCtx<'a>) {
        if self.options.transform_call_tool {
            rewrite_call_tool(node, ctx);
        }
        if self.options.transform_concatenation {
            rewrite_concatenation(node, ctx);
        }
        if self.options.transform_templates {
            rewrite_template_literal(node, ctx);
        }
        if self.options.extract_large_strings {
            // String-literal extraction is handled by `LargeStringExtractor`
            // (see `large_strings.rs`), which runs as a separate,
            // read-mostly pass so its handle table stays simple to collect.
        }
    }

    fn exit_statement(&mut self, node: &mut Statement<'a>, ctx: &mut TraverseCtx<'a>) {
        if self.options.transform_loops {
            rewrite_loop(node, ctx);
        }
    }
}

/// `callTool(...)` → `__safe_callTool(...)` (spec §4.2 `transform_call_tool`).
fn rewrite_call_tool<'a>(node: &mut Expression<'a>, ctx: &mut TraverseCtx<'a>) {
    let Expression::CallExpression(call) = node else {
        return;
    };
    let Expression::Identifier(ident) = &call.callee else {
        return;
    };
    if ident.name.as_str() != "callTool" {
        return;
    }
    let new_callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_callTool");
    call.callee = new_callee;
}

/// `a + b (+ c ...)` over non-provably-numeric operands →
/// `__safe_concat(a, b, ...)` (spec §4.2 `transform_concatenation`).
///
/// Conservative: this pass does not attempt numeric provenance analysis; it
/// flattens every left-associative `+` chain it finds into one
/// `__safe_concat` call, the same conservative stance the spec calls out
/// ("any `+` at statement/expression position not provably numeric").
fn rewrite_concatenation<'a>(node: &mut Expression<'a>, ctx: &mut TraverseCtx<'a>) {
    let Expression::BinaryExpression(bin) = node else {
        return;
    };
    if bin.operator != BinaryOperator::Addition {
        return;
    }

    let mut operands = ArenaVec::new_in(ctx.ast.allocator);
    flatten_plus_chain(ctx.ast.move_expression(&mut bin.left), &mut operands, ctx);
    flatten_plus_chain(ctx.ast.move_expression(&mut bin.right), &mut operands, ctx);

    let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_concat");
    let arguments = operands
        .into_iter()
        .map(Argument::from)
        .collect_into(ctx.ast.vec());
    *node = ctx
        .ast
        .expression_call(SPAN, callee, NONE, arguments, false);
}

fn flatten_plus_chain<'a>(
    expr: Expression<'a>,
    out: &mut ArenaVec<'a, Expression<'a>>,
    ctx: &mut TraverseCtx<'a>,
) {
    if let Expression::BinaryExpression(mut bin) = expr {
        if bin.operator == BinaryOperator::Addition {
            flatten_plus_chain(ctx.ast.move_expression(&mut bin.left), out, ctx);
            flatten_plus_chain(ctx.ast.move_expression(&mut bin.right), out, ctx);
            return;
        }
        out.push(Expression::BinaryExpression(bin));
        return;
    }
    out.push(expr);
}

/// Template literal with quasis `Q` and expressions `E` →
/// `__safe_template(Q, ...E)` (spec §4.2 `transform_templates`).
fn rewrite_template_literal<'a>(node: &mut Expression<'a>, ctx: &mut TraverseCtx<'a>) {
    let Expression::TemplateLiteral(template) = node else {
        return;
    };

    let mut arguments = ctx.ast.vec_with_capacity(template.quasis.len() + template.expressions.len());
    let quasi_values: Vec<String> = template
        .quasis
        .iter()
        .map(|q| q.value.cooked.as_ref().map(|s| s.to_string()).unwrap_or_default())
        .collect();
    let quasis_array = ctx.ast.expression_array(
        SPAN,
        quasi_values
            .into_iter()
            .map(|s| {
                oxc::ast::ast::ArrayExpressionElement::from(
                    ctx.ast.expression_string_literal(SPAN, ctx.ast.atom(&s), None),
                )
            })
            .collect_into(ctx.ast.vec()),
        None,
    );
    arguments.push(Argument::from(quasis_array));
    for expr in ctx.ast.move_vec(&mut template.expressions) {
        arguments.push(Argument::from(expr));
    }

    let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_template");
    *node = ctx.ast.expression_call(SPAN, callee, NONE, arguments, false);
}

/// Loop rewrites (spec §4.2 `transform_loops`):
/// - `for (x of it) body` → `__safe_forOf(it, (x) => body)`
/// - `for (init; test; update) body` → `__safe_for(() => init, () => test, () => update, () => body)`
/// - `while (test) body` → `__safe_while(() => test, () => body)`
/// - `do body while (test)` → `__safe_doWhile(() => test, () => body)`
fn rewrite_loop<'a>(node: &mut Statement<'a>, ctx: &mut TraverseCtx<'a>) {
    match node {
        Statement::ForOfStatement(for_of) => {
            let ForOfLeft::VariableDeclaration(decl) = &mut for_of.left else {
                return;
            };
            let param = ctx.ast.move_vec(&mut decl.declarations);
            let iterable = ctx.ast.move_expression(&mut for_of.right);
            let body = ctx.ast.move_statement(&mut for_of.body);

            let param_fn = arrow_over_statement(body, ctx, Some(param));
            let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_forOf");
            let arguments = ctx.ast.vec_from_array([
                Argument::from(iterable),
                Argument::from(param_fn),
            ]);
            *node = Statement::ExpressionStatement(ctx.ast.alloc_expression_statement(
                SPAN,
                ctx.ast.expression_call(SPAN, callee, NONE, arguments, false),
            ));
        }
        Statement::ForStatement(for_stmt) => {
            rewrite_for_statement(for_stmt, ctx, node);
        }
        Statement::WhileStatement(while_stmt) => {
            let test = ctx.ast.move_expression(&mut while_stmt.test);
            let body = ctx.ast.move_statement(&mut while_stmt.body);
            let test_thunk = arrow_over_expression(test, ctx);
            let body_thunk = arrow_over_statement(body, ctx, None);

            let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_while");
            let arguments = ctx
                .ast
                .vec_from_array([Argument::from(test_thunk), Argument::from(body_thunk)]);
            *node = Statement::ExpressionStatement(ctx.ast.alloc_expression_statement(
                SPAN,
                ctx.ast.expression_call(SPAN, callee, NONE, arguments, false),
            ));
        }
        Statement::DoWhileStatement(do_while) => {
            let test = ctx.ast.move_expression(&mut do_while.test);
            let body = ctx.ast.move_statement(&mut do_while.body);
            let test_thunk = arrow_over_expression(test, ctx);
            let body_thunk = arrow_over_statement(body, ctx, None);

            let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_doWhile");
            let arguments = ctx
                .ast
                .vec_from_array([Argument::from(test_thunk), Argument::from(body_thunk)]);
            *node = Statement::ExpressionStatement(ctx.ast.alloc_expression_statement(
                SPAN,
                ctx.ast.expression_call(SPAN, callee, NONE, arguments, false),
            ));
        }
        _ => {}
    }
}

fn rewrite_for_statement<'a>(
    for_stmt: &mut oxc::allocator::Box<'a, ForStatement<'a>>,
    ctx: &mut TraverseCtx<'a>,
    node: &mut Statement<'a>,
) {
    let init_expr = match &mut for_stmt.init {
        Some(ForStatementInit::VariableDeclaration(_)) | None => {
            ctx.ast.expression_identifier_reference(SPAN, "undefined")
        }
        Some(init) => match init {
            ForStatementInit::VariableDeclaration(_) => unreachable!(),
            _ => {
                let expr = ForStatementInit::to_expression_mut(init);
                ctx.ast.move_expression(expr)
            }
        },
    };
    let test_expr = for_stmt
        .test
        .as_mut()
        .map(|t| ctx.ast.move_expression(t))
        .unwrap_or_else(|| ctx.ast.expression_boolean_literal(SPAN, true));
    let update_expr = for_stmt
        .update
        .as_mut()
        .map(|u| ctx.ast.move_expression(u))
        .unwrap_or_else(|| ctx.ast.expression_identifier_reference(SPAN, "undefined"));
    let body = ctx.ast.move_statement(&mut for_stmt.body);

    let init_thunk = arrow_over_expression(init_expr, ctx);
    let test_thunk = arrow_over_expression(test_expr, ctx);
    let update_thunk = arrow_over_expression(update_expr, ctx);
    let body_thunk = arrow_over_statement(body, ctx, None);

    let callee = ctx.ast.expression_identifier_reference(SPAN, "__safe_for");
    let arguments = ctx.ast.vec_from_array([
        Argument::from(init_thunk),
        Argument::from(test_thunk),
        Argument::from(update_thunk),
        Argument::from(body_thunk),
    ]);
    *node = Statement::ExpressionStatement(ctx.ast.alloc_expression_statement(
        SPAN,
        ctx.ast.expression_call(SPAN, callee, NONE, arguments, false),
    ));
}

/// Build `() => expr` (spec §4.2: loop clauses become zero-arg thunks).
fn arrow_over_expression<'a>(expr: Expression<'a>, ctx: &mut TraverseCtx<'a>) -> Expression<'a> {
    let body_stmt = Statement::ExpressionStatement(ctx.ast.alloc_expression_statement(SPAN, expr));
    let body = ctx.ast.alloc_function_body(
        SPAN,
        ctx.ast.vec(),
        ctx.ast.vec_from_array([body_stmt]),
    );
    ctx.ast.expression_arrow_function(
        SPAN,
        false,
        true,
        NONE,
        ctx.ast.formal_parameters(
            SPAN,
            oxc::ast::ast::FormalParameterKind::ArrowFormalParameters,
            ctx.ast.vec(),
            NONE,
        ),
        NONE,
        body,
    )
}

/// Build `(x) => body` or `() => body`, `body` being the original loop
/// body statement moved in whole (spec §4.2: `break`/`continue` inside it
/// are preserved via the return-sentinel contract the helpers implement,
/// not by this rewrite).
fn arrow_over_statement<'a>(
    mut body: Statement<'a>,
    ctx: &mut TraverseCtx<'a>,
    param: Option<ArenaVec<'a, oxc::ast::ast::VariableDeclarator<'a>>>,
) -> Expression<'a> {
    rewrite_break_continue(&mut body, 0, ctx);

    let params = match param {
        Some(mut decls) if !decls.is_empty() => {
            let decl = decls.first_mut().unwrap();
            let binding = ctx.ast.move_binding_pattern(&mut decl.id);
            let formal = ctx.ast.formal_parameter(
                SPAN,
                ctx.ast.vec(),
                binding,
                None,
                false,
                false,
            );
            ctx.ast.formal_parameters(
                SPAN,
                oxc::ast::ast::FormalParameterKind::ArrowFormalParameters,
                ctx.ast.vec_from_array([formal]),
                NONE,
            )
        }
        _ => ctx.ast.formal_parameters(
            SPAN,
            oxc::ast::ast::FormalParameterKind::ArrowFormalParameters,
            ctx.ast.vec(),
            NONE,
        ),
    };

    let block_body = match body {
        Statement::BlockStatement(block) => {
            ctx.ast.alloc_function_body(SPAN, ctx.ast.vec(), block.unbox().body)
        }
        other => ctx
            .ast
            .alloc_function_body(SPAN, ctx.ast.vec(), ctx.ast.vec_from_array([other])),
    };

    ctx.ast
        .expression_arrow_function(SPAN, false, false, NONE, params, NONE, block_body)
}

/// Rewrite bare (unlabeled) `break`/`continue` reachable from a loop body
/// without crossing into a nested function into `return __ag_loop_break` /
/// `return __ag_loop_continue` (spec §4.2). Runs in post-order traversal, so
/// any loop nested inside this body has already been turned into a
/// `__safe_*` call expression by the time its enclosing loop is processed —
/// a bare `break`/`continue` still standing here always targets *this* loop.
///
/// `switch_depth` tracks nesting inside a `switch`: an unlabeled `break`
/// inside a switch case targets the switch, not the loop, so it is left
/// alone; `continue` always targets the loop regardless of switch nesting.
fn rewrite_break_continue<'a>(stmt: &mut Statement<'a>, switch_depth: u32, ctx: &mut TraverseCtx<'a>) {
    match stmt {
        Statement::BreakStatement(b) if b.label.is_none() && switch_depth == 0 => {
            let sentinel = ctx
                .ast
                .expression_identifier_reference(SPAN, LOOP_BREAK_SENTINEL);
            *stmt = Statement::ReturnStatement(ctx.ast.alloc_return_statement(SPAN, Some(sentinel)));
        }
        Statement::ContinueStatement(c) if c.label.is_none() => {
            let sentinel = ctx
                .ast
                .expression_identifier_reference(SPAN, LOOP_CONTINUE_SENTINEL);
            *stmt = Statement::ReturnStatement(ctx.ast.alloc_return_statement(SPAN, Some(sentinel)));
        }
        Statement::BlockStatement(block) => {
            for s in block.body.iter_mut() {
                rewrite_break_continue(s, switch_depth, ctx);
            }
        }
        Statement::IfStatement(if_stmt) => {
            rewrite_break_continue(&mut if_stmt.consequent, switch_depth, ctx);
            if let Some(alt) = if_stmt.alternate.as_mut() {
                rewrite_break_continue(alt, switch_depth, ctx);
            }
        }
        Statement::TryStatement(try_stmt) => {
            for s in try_stmt.block.body.iter_mut() {
                rewrite_break_continue(s, switch_depth, ctx);
            }
            if let Some(handler) = try_stmt.handler.as_mut() {
                for s in handler.body.body.iter_mut() {
                    rewrite_break_continue(s, switch_depth, ctx);
                }
            }
            if let Some(finalizer) = try_stmt.finalizer.as_mut() {
                for s in finalizer.body.iter_mut() {
                    rewrite_break_continue(s, switch_depth, ctx);
                }
            }
        }
        Statement::SwitchStatement(switch_stmt) => {
            for case in switch_stmt.cases.iter_mut() {
                for s in case.consequent.iter_mut() {
                    rewrite_break_continue(s, switch_depth + 1, ctx);
                }
            }
        }
        Statement::LabeledStatement(labeled) => {
            rewrite_break_continue(&mut labeled.body, switch_depth, ctx);
        }
        _ => {}
    }
}
