//! Stage one of the sandbox pipeline: static validation of untrusted
//! AgentScript source against the fixed rule set (spec §4.1).
//!
//! Parses with oxc, then runs [`visitor::RuleVisitor`] over the program.
//! Never panics on malformed input — a parse failure becomes
//! `ValidationResult::from_parse_error`, matching
//! `skilllite-sandbox::security::scanner::ScriptScanner::scan_content`'s
//! contract of returning a result rather than propagating a parse error.

pub mod rules;
pub mod visitor;

pub use rules::{Rule, ValidateOptions};

use agentscript_core::ValidationResult;
use oxc::allocator::Allocator;
use oxc::parser::{Parser, ParserOptions};
use oxc::span::SourceType;
use oxc_semantic::SemanticBuilder;

/// Validate `source` against the fixed AgentScript rule set (spec §6.1).
///
/// Source is conventionally a sequence of top-level statements destined to
/// become the body of the `__ag_main` entry function (spec §6.1), so a
/// top-level `return` (as every §8.3 scenario uses) is not a syntax error
/// here even though it would be in a standalone script — `__ag_main`'s
/// wrapping happens one stage later, in the transformer.
pub fn validate(source: &str, options: &ValidateOptions) -> ValidationResult {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(false);
    let parser_options = ParserOptions {
        allow_return_outside_function: true,
        ..ParserOptions::default()
    };
    let parsed = Parser::new(&allocator, source, source_type)
        .with_options(parser_options)
        .parse();

    if !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        tracing::debug!(%message, "agentscript source failed to parse");
        return ValidationResult::from_parse_error(message);
    }

    // Binds `reference_id`/`symbol_id` into the parsed AST's own cells, so
    // `RuleVisitor` can tell a bound local apart from a genuinely free
    // reference while it walks the same tree (spec §4.1 `UNKNOWN_GLOBAL`:
    // flag only names that resolve to nothing and aren't an allowed global).
    let scoping = SemanticBuilder::new().build(&parsed.program).semantic.into_scoping();

    let mut visitor = visitor::RuleVisitor::new(source, options, &scoping);
    {
        use oxc::ast::visit::Visit;
        visitor.visit_program(&parsed.program);
    }

    ValidationResult::from_issues(visitor.issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_arithmetic() {
        let result = validate("const x = 1 + 2; x;", &ValidateOptions::default());
        assert!(result.valid, "{:?}", result.issues);
    }

    #[test]
    fn rejects_disallowed_identifier() {
        let result = validate("eval('1')", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::DisallowedIdentifier));
    }

    #[test]
    fn rejects_computed_constructor_access() {
        let result = validate("const o = {}; o['constructor'];", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::NoComputedConstructor));
    }

    #[test]
    fn rejects_regex_literal() {
        let result = validate("const r = /abc/;", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::NoRegexLiteral));
    }

    #[test]
    fn rejects_top_level_function_declaration() {
        let result = validate("function f() { return 1; }", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::NoFunctionDecl));
    }

    #[test]
    fn local_binding_is_not_an_unknown_global() {
        let result = validate("const x = 1; return x + 1;", &ValidateOptions::default());
        assert!(result.valid, "{:?}", result.issues);
    }

    #[test]
    fn function_parameter_is_not_an_unknown_global() {
        let result = validate(
            "const add = (a, b) => a + b; add(1, 2);",
            &ValidateOptions::default(),
        );
        assert!(!result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::UnknownGlobal));
    }

    #[test]
    fn free_reference_to_unallowed_name_is_still_unknown_global() {
        let result = validate("return someUndeclaredThing;", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::UnknownGlobal));
    }

    #[test]
    fn rejects_concatenated_constructor_access() {
        let result = validate(
            r#"const k = "con" + "structor"; Array[k];"#,
            &ValidateOptions::default(),
        );
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::NoComputedConstructor));
    }

    #[test]
    fn rejects_joined_constructor_access() {
        let result = validate(
            r#"const k = ["c","o","n","s","t","r","u","c","t","o","r"].join(""); Array[k];"#,
            &ValidateOptions::default(),
        );
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::NoComputedConstructor));
    }

    #[test]
    fn rejects_json_parse_with_reviver() {
        let result = validate(
            "JSON.parse(s, someReviver);",
            &ValidateOptions {
                custom_globals: vec!["s".into(), "someReviver".into()],
                ..Default::default()
            },
        );
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::JsonCallbackNotAllowed));
    }

    #[test]
    fn allows_json_stringify_with_string_array_allowlist() {
        let result = validate(
            r#"JSON.stringify(v, ["a", "b"]);"#,
            &ValidateOptions {
                custom_globals: vec!["v".into()],
                ..Default::default()
            },
        );
        assert!(!result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::JsonCallbackNotAllowed));
    }

    #[test]
    fn rejects_json_stringify_through_optional_chaining() {
        let result = validate(
            "JSON?.stringify(v, replacerFn);",
            &ValidateOptions {
                custom_globals: vec!["v".into(), "replacerFn".into()],
                ..Default::default()
            },
        );
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::JsonCallbackNotAllowed));
    }

    #[test]
    fn custom_globals_suppress_unknown_global() {
        let options = ValidateOptions {
            custom_globals: vec!["myTool".into()],
            ..Default::default()
        };
        let result = validate("myTool();", &options);
        assert!(!result
            .issues
            .iter()
            .any(|i| i.code == agentscript_core::IssueCode::UnknownGlobal));
    }

    #[test]
    fn malformed_source_yields_parse_error_not_panic() {
        let result = validate("const = = =;", &ValidateOptions::default());
        assert!(!result.valid);
        assert!(result.parse_error.is_some());
    }
}
