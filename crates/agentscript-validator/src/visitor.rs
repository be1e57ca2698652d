//! AST visitor that runs the full rule set in a single pass over the
//! parsed program (spec §4.1).
//!
//! oxc's `Visit` trait plays the role `ast.walk()` / a TS-compiler
//! `visitEachChild` callback would in a host-language implementation: one
//! depth-first traversal, with each `visit_*` override both recording
//! issues and calling the default `walk_*` to keep descending.

use agentscript_core::{Issue, IssueCode, Location};
use oxc::ast::ast::{
    Argument, ArrayExpressionElement, BinaryOperator, CallExpression, DoWhileStatement,
    Expression, ForStatement, FunctionDeclaration, IdentifierReference, MemberExpression,
    NewExpression, ObjectPattern, PropertyKey, RegExpLiteral, ThisExpression, UnaryOperator,
    WhileStatement,
};
use oxc::ast::visit::Visit;
use oxc::ast::visit::walk;
use oxc::span::{GetSpan, Span};
use oxc_semantic::Scoping;

use agentscript_core::deny_list::{
    DEFAULT_ALLOWED_GLOBALS, FORBIDDEN_KEY_STRINGS, META_PROGRAMMING_PROPERTIES,
};
use crate::rules::ValidateOptions;

pub struct RuleVisitor<'a> {
    source_text: &'a str,
    options: &'a ValidateOptions,
    scoping: &'a Scoping,
    /// Depth of nesting inside a `function`/arrow body; `this` is only
    /// flagged by `NO_GLOBAL_ACCESS` at depth 0 (spec §4.1 `NO_GLOBAL_ACCESS`:
    /// "`this` as an expression at the top level of the entry function").
    function_depth: u32,
    pub issues: Vec<Issue>,
}

impl<'a> RuleVisitor<'a> {
    pub fn new(source_text: &'a str, options: &'a ValidateOptions, scoping: &'a Scoping) -> Self {
        Self {
            source_text,
            options,
            scoping,
            function_depth: 0,
            issues: Vec::new(),
        }
    }

    fn location(&self, span: Span) -> Option<Location> {
        let line = self.source_text[..(span.start as usize).min(self.source_text.len())]
            .matches('\n')
            .count() as u32
            + 1;
        Some(Location {
            start: span.start,
            end: span.end,
            line,
        })
    }

    fn push_error(&mut self, code: IssueCode, message: impl Into<String>, span: Span) {
        let location = self.location(span);
        self.issues.push(Issue::error(code, message, location));
    }

    fn is_known_global(&self, name: &str) -> bool {
        DEFAULT_ALLOWED_GLOBALS.contains(&name)
            || self.options.custom_globals.iter().any(|g| g == name)
    }

    /// True when `ident` resolves to nothing in scope — a const/let/param
    /// binding makes a reference "bound", not free, regardless of its name
    /// (spec §4.1 `UNKNOWN_GLOBAL` only targets genuinely free references).
    fn is_unresolved_reference(&self, ident: &IdentifierReference<'a>) -> bool {
        match ident.reference_id.get() {
            Some(reference_id) => self.scoping.get_reference(reference_id).symbol_id().is_none(),
            None => true,
        }
    }

    fn static_string_key(key: &PropertyKey) -> Option<&str> {
        match key {
            PropertyKey::StaticIdentifier(id) => Some(id.name.as_str()),
            PropertyKey::StringLiteral(lit) => Some(lit.value.as_str()),
            _ => None,
        }
    }

    /// Evaluate whether `expr` is a compile-time-truthy constant per the
    /// `INFINITE_LOOP` rule's definition (spec §4.1): numbers other than 0,
    /// non-empty strings, `true`, `!false`, `!!true`, `Infinity`, and object
    /// or array literals are truthy; `0`, `false`, `null`, `undefined`,
    /// `NaN`, and `!true` are never-executing. Returns `None` when `expr`
    /// isn't one of these recognized constant shapes.
    fn constant_truthiness(expr: &Expression) -> Option<bool> {
        match expr {
            Expression::BooleanLiteral(lit) => Some(lit.value),
            Expression::NumericLiteral(lit) => Some(lit.value != 0.0 && !lit.value.is_nan()),
            Expression::StringLiteral(lit) => Some(!lit.value.is_empty()),
            Expression::NullLiteral(_) => Some(false),
            Expression::Identifier(id) => match id.name.as_str() {
                "undefined" | "NaN" => Some(false),
                "Infinity" => Some(true),
                _ => None,
            },
            Expression::ObjectExpression(_) | Expression::ArrayExpression(_) => Some(true),
            Expression::UnaryExpression(unary) if unary.operator == UnaryOperator::LogicalNot => {
                Self::constant_truthiness(&unary.argument).map(|inner| !inner)
            }
            _ => None,
        }
    }

    fn check_infinite_loop(&mut self, test: Option<&Expression>, span: Span) {
        let truthy = match test {
            None => true, // `for (;;)` — missing test is always-true.
            Some(expr) => match Self::constant_truthiness(expr) {
                Some(t) => t,
                None => return, // not a recognized compile-time constant
            },
        };
        if truthy {
            self.push_error(
                IssueCode::InfiniteLoop,
                "loop condition is a compile-time-truthy constant with no bounded form",
                span,
            );
        }
    }

    /// `RESOURCE_EXHAUSTION` (spec §4.1): `Array(n).fill(...)`,
    /// `new Array(n).fill(...)`, and `"s".repeat(n)` where `n` is a numeric
    /// literal above the configured ceiling, or a non-constant expression
    /// (warn in permissive presets, error otherwise).
    fn check_resource_exhaustion_arg(&mut self, arg: Option<&Argument>, span: Span) {
        let Some(arg) = arg else { return };
        let Argument::Identifier(_)
        | Argument::NumericLiteral(_)
        | Argument::BinaryExpression(_)
        | Argument::CallExpression(_)
        | Argument::StaticMemberExpression(_) = arg
        else {
            return;
        };
        match arg {
            Argument::NumericLiteral(lit) => {
                if lit.value > self.options.resource_exhaustion_ceiling as f64 {
                    self.push_error(
                        IssueCode::ResourceExhaustion,
                        format!(
                            "literal size {} exceeds the resource-exhaustion ceiling of {}",
                            lit.value, self.options.resource_exhaustion_ceiling
                        ),
                        span,
                    );
                }
            }
            _ => {
                // Non-constant size expression.
                if self.options.permissive_resource_exhaustion {
                    self.issues.push(Issue::warning(
                        IssueCode::ResourceExhaustion,
                        "non-constant size passed to a resource-allocating call",
                        self.location(span),
                    ));
                } else {
                    self.push_error(
                        IssueCode::ResourceExhaustion,
                        "non-constant size passed to a resource-allocating call",
                        span,
                    );
                }
            }
        }
    }
}

impl<'a> Visit<'a> for RuleVisitor<'a> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let name = ident.name.as_str();
        if agentscript_core::deny_list::DISALLOWED_IDENTIFIERS.contains(&name) {
            self.push_error(
                IssueCode::DisallowedIdentifier,
                format!("identifier `{name}` is not allowed"),
                ident.span(),
            );
        } else if !self.is_known_global(name) && self.is_unresolved_reference(ident) {
            // A reference that resolves to a local const/let/param binding
            // is never an "unknown global" no matter what it's named; only
            // a free reference against a name outside the allow-list is.
            self.push_error(
                IssueCode::UnknownGlobal,
                format!("reference to unknown global `{name}`"),
                ident.span(),
            );
        }
        walk::walk_identifier_reference(self, ident);
    }

    fn visit_member_expression(&mut self, expr: &MemberExpression<'a>) {
        match expr {
            MemberExpression::StaticMemberExpression(member) => {
                let prop = member.property.name.as_str();
                if META_PROGRAMMING_PROPERTIES.contains(&prop) {
                    self.push_error(
                        IssueCode::NoMetaProgramming,
                        format!("meta-programming property `{prop}` is not allowed"),
                        member.span(),
                    );
                }
                if FORBIDDEN_KEY_STRINGS.contains(&prop) {
                    self.push_error(
                        IssueCode::SecurityViolation,
                        format!("access to `{prop}` is not allowed"),
                        member.span(),
                    );
                }
            }
            MemberExpression::ComputedMemberExpression(member) => {
                if let Some(value) = static_eval_string(&member.expression) {
                    if FORBIDDEN_KEY_STRINGS.contains(&value.as_str()) {
                        self.push_error(
                            IssueCode::NoComputedConstructor,
                            format!("computed access to `{value}` is not allowed"),
                            member.span(),
                        );
                    }
                }
            }
            _ => {}
        }
        walk::walk_member_expression(self, expr);
    }

    fn visit_object_pattern(&mut self, pattern: &ObjectPattern<'a>) {
        for prop in &pattern.properties {
            if let Some(key) = Self::static_string_key(&prop.key) {
                if FORBIDDEN_KEY_STRINGS.contains(&key) {
                    self.push_error(
                        IssueCode::NoComputedDestructuring,
                        format!("destructuring `{key}` is not allowed"),
                        prop.span(),
                    );
                }
            }
        }
        walk::walk_object_pattern(self, pattern);
    }

    fn visit_function_declaration(&mut self, decl: &FunctionDeclaration<'a>) {
        if !self.options.allow_function_declarations {
            self.push_error(
                IssueCode::NoFunctionDecl,
                "top-level `function` declarations are not allowed; use an arrow function or const binding",
                decl.span(),
            );
        }
        self.function_depth += 1;
        walk::walk_function(self, decl, oxc::ast::ast::FunctionScopeKind::Declaration);
        self.function_depth -= 1;
    }

    fn visit_reg_exp_literal(&mut self, literal: &RegExpLiteral<'a>) {
        if !self.options.allow_regex {
            self.push_error(
                IssueCode::NoRegexLiteral,
                "regular expression literals are not allowed",
                literal.span(),
            );
        }
        walk::walk_reg_exp_literal(self, literal);
    }

    fn visit_function_expression(&mut self, func: &FunctionDeclaration<'a>) {
        if !self.options.allow_function_declarations {
            self.push_error(
                IssueCode::NoFunctionDecl,
                "function expressions are not allowed; use an arrow function",
                func.span(),
            );
        }
        self.function_depth += 1;
        walk::walk_function(self, func, oxc::ast::ast::FunctionScopeKind::Expression);
        self.function_depth -= 1;
    }

    fn visit_this_expression(&mut self, expr: &ThisExpression) {
        if self.function_depth == 0 {
            self.push_error(
                IssueCode::NoGlobalAccess,
                "`this` at the top level of the entry function is not allowed",
                expr.span(),
            );
        }
    }

    fn visit_while_statement(&mut self, stmt: &WhileStatement<'a>) {
        self.check_infinite_loop(Some(&stmt.test), stmt.span());
        walk::walk_while_statement(self, stmt);
    }

    fn visit_do_while_statement(&mut self, stmt: &DoWhileStatement<'a>) {
        self.check_infinite_loop(Some(&stmt.test), stmt.span());
        walk::walk_do_while_statement(self, stmt);
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.check_infinite_loop(stmt.test.as_ref(), stmt.span());
        walk::walk_for_statement(self, stmt);
    }

    fn visit_new_expression(&mut self, expr: &NewExpression<'a>) {
        if let Expression::Identifier(callee) = &expr.callee {
            if callee.name.as_str() == "Array" {
                self.check_resource_exhaustion_arg(expr.arguments.first(), expr.span());
            }
        }
        walk::walk_new_expression(self, expr);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if is_json_call_with_callback(call) {
            self.push_error(
                IssueCode::JsonCallbackNotAllowed,
                "a reviver/replacer callback passed to JSON.parse/JSON.stringify is not allowed",
                call.span(),
            );
        }
        self.check_resource_exhaustion_call(call);
        walk::walk_call_expression(self, call);
    }
}

impl<'a> RuleVisitor<'a> {
    /// `Array(n).fill(...)` and `"literal".repeat(n)` shapes of
    /// `RESOURCE_EXHAUSTION` (spec §4.1); the `new Array(n).fill(...)` shape
    /// is handled in `visit_new_expression` since that callee is a
    /// `NewExpression`, not a plain call.
    fn check_resource_exhaustion_call(&mut self, call: &CallExpression<'a>) {
        let Expression::StaticMemberExpression(member) = &call.callee else {
            return;
        };
        match member.property.name.as_str() {
            "fill" => {
                if let Expression::CallExpression(inner) = &member.object {
                    if let Expression::Identifier(id) = &inner.callee {
                        if id.name.as_str() == "Array" {
                            self.check_resource_exhaustion_arg(inner.arguments.first(), call.span());
                        }
                    }
                }
            }
            "repeat" => {
                self.check_resource_exhaustion_arg(call.arguments.first(), call.span());
            }
            _ => {}
        }
    }
}

/// Fold a string-building expression to its compile-time value, the same
/// way the spec's `NO_COMPUTED_CONSTRUCTOR` rule is required to see through
/// `"con" + "structor"`, `` `con${"structor"}` ``, `["c","o","n"].join("")`
/// and `String.fromCharCode(...)` obfuscation of a forbidden key (spec §4.1,
/// §9 "the runtime proxy is the backstop for keys only knowable at
/// runtime" — this is the static half of that split). Hex/unicode escapes
/// need no special handling here: oxc already decodes a string literal's
/// escapes into `StringLiteral::value` at parse time.
fn static_eval_string(expr: &Expression) -> Option<String> {
    match expr {
        Expression::StringLiteral(lit) => Some(lit.value.as_str().to_string()),
        Expression::TemplateLiteral(tpl) => {
            let mut out = String::new();
            for (i, quasi) in tpl.quasis.iter().enumerate() {
                out.push_str(quasi.value.cooked.as_deref().unwrap_or_default());
                if let Some(expr) = tpl.expressions.get(i) {
                    out.push_str(&static_eval_string(expr)?);
                }
            }
            Some(out)
        }
        Expression::BinaryExpression(bin) if bin.operator == BinaryOperator::Addition => {
            let mut left = static_eval_string(&bin.left)?;
            left.push_str(&static_eval_string(&bin.right)?);
            Some(left)
        }
        Expression::CallExpression(call) => static_eval_call(call),
        _ => None,
    }
}

fn static_eval_call(call: &CallExpression<'_>) -> Option<String> {
    let Expression::StaticMemberExpression(member) = &call.callee else {
        return None;
    };
    match member.property.name.as_str() {
        "join" => {
            let Expression::ArrayExpression(array) = &member.object else {
                return None;
            };
            let separator = match call.arguments.first() {
                Some(Argument::StringLiteral(lit)) => lit.value.as_str().to_string(),
                None => ",".to_string(),
                _ => return None,
            };
            let mut parts = Vec::with_capacity(array.elements.len());
            for element in &array.elements {
                let ArrayExpressionElement::StringLiteral(lit) = element else {
                    return None;
                };
                parts.push(lit.value.as_str());
            }
            Some(parts.join(&separator))
        }
        "fromCharCode" | "fromCodePoint" => {
            let Expression::Identifier(obj) = &member.object else {
                return None;
            };
            if obj.name.as_str() != "String" {
                return None;
            }
            let mut out = String::new();
            for arg in &call.arguments {
                let Argument::NumericLiteral(lit) = arg else {
                    return None;
                };
                out.push(char::from_u32(lit.value as u32)?);
            }
            Some(out)
        }
        _ => None,
    }
}

/// `JSON_CALLBACK_NOT_ALLOWED` (spec §4.1): `JSON.parse` with any second
/// argument at all, or `JSON.stringify` with a second argument that isn't
/// `null`/`undefined` or an array literal of string literals. Optional
/// chaining (`JSON?.stringify(...)`) reaches this function unchanged —
/// oxc wraps the whole chain in a `ChainExpression`, not each member/call
/// link, so `call.callee` still shapes up as a plain `StaticMemberExpression`.
fn is_json_call_with_callback(call: &CallExpression<'_>) -> bool {
    let Expression::StaticMemberExpression(member) = &call.callee else {
        return false;
    };
    let Expression::Identifier(obj) = &member.object else {
        return false;
    };
    if obj.name.as_str() != "JSON" {
        return false;
    }
    match member.property.name.as_str() {
        "parse" => call.arguments.len() >= 2,
        "stringify" => call
            .arguments
            .get(1)
            .map(|arg| !is_allowed_stringify_replacer(arg))
            .unwrap_or(false),
        _ => false,
    }
}

/// The only second arguments `JSON.stringify` may take without tripping
/// `JSON_CALLBACK_NOT_ALLOWED`: `null`, the identifier `undefined`, or an
/// array literal made entirely of string literals (a property allow-list,
/// not a function/replacer).
fn is_allowed_stringify_replacer(arg: &Argument<'_>) -> bool {
    match arg {
        Argument::NullLiteral(_) => true,
        Argument::Identifier(id) => id.name.as_str() == "undefined",
        Argument::ArrayExpression(array) => array
            .elements
            .iter()
            .all(|el| matches!(el, ArrayExpressionElement::StringLiteral(_))),
        _ => false,
    }
}
