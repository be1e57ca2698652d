//! Stage two of the sandbox pipeline: rewriting a validated AgentScript AST
//! into the instrumented forms the executor's safe runtime helpers target
//! (spec §4.2).
//!
//! The public entry point mirrors the shape of `agentscript_validator::validate`:
//! parse once with oxc, apply the entry-wrap pre-pass, run the rewrite
//! traversal (see [`passes`]), optionally run the large-string extraction
//! traversal (see [`large_strings`]), then hand the final AST to
//! `oxc_codegen` to render source text back out (spec §3.3: "Accepted AST is
//! transformed, then code-generated back to text").

pub mod error;
pub mod large_strings;
pub mod options;
pub mod passes;

pub use error::TransformError;
pub use options::{LargeStringHandle, TransformOptions, TransformOutput};

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    FormalParameterKind, Function, FunctionType, Program, Statement, TSThisParameter,
    TSTypeAnnotation, TSTypeParameterDeclaration,
};
use oxc::ast::NONE;
use oxc::parser::{Parser, ParserOptions};
use oxc::span::{SourceType, SPAN};
use oxc_codegen::Codegen;
use oxc_semantic::SemanticBuilder;
use oxc_traverse::traverse_mut;

use large_strings::LargeStringExtractor;
use passes::RewritePass;

/// The entry function name every executed program is wrapped into (spec
/// §6.1, glossary "Entry function").
pub const ENTRY_FUNCTION_NAME: &str = "__ag_main";

/// Run the full transform stage over already-validated `source` (spec
/// §4.2's `transform(source, options) -> source'`).
///
/// Callers are expected to have already rejected `source` with
/// `agentscript_validator::validate` — a parse failure here means the two
/// stages' grammars disagree, not that the input was malicious, hence
/// `TransformError::Parse` rather than a validation-shaped error.
pub fn transform(source: &str, options: &TransformOptions) -> Result<TransformOutput, TransformError> {
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
        return Err(TransformError::Parse(message));
    }
    let mut program = parsed.program;

    if options.wrap_in_main && !already_wrapped(&program) {
        wrap_in_entry(&mut program, &allocator);
    }

    let rewrite_scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let mut rewrite = RewritePass::new(options);
    traverse_mut(&mut rewrite, &allocator, &mut program, rewrite_scoping);

    let large_strings = if options.extract_large_strings {
        let extract_scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();
        let mut extractor = LargeStringExtractor::new(options.large_string_threshold_bytes);
        traverse_mut(&mut extractor, &allocator, &mut program, extract_scoping);
        extractor.handles
    } else {
        Vec::new()
    };

    let codegen = Codegen::new().build(&program);
    tracing::debug!(
        large_string_count = large_strings.len(),
        "agentscript source transformed"
    );

    Ok(TransformOutput {
        source: codegen.code,
        large_strings,
    })
}

/// Spec §4.2 `wrap_in_main`'s skip condition: "If the source already
/// contains a single top-level async function with exactly that name, skip."
fn already_wrapped(program: &Program) -> bool {
    let [Statement::FunctionDeclaration(func)] = program.body.as_slice() else {
        return false;
    };
    func.r#async
        && func
            .id
            .as_ref()
            .is_some_and(|id| id.name.as_str() == ENTRY_FUNCTION_NAME)
}

/// `async function __ag_main() { <user statements> }` (spec §4.2
/// `wrap_in_main`, §6.1 wire shape).
fn wrap_in_entry<'a>(program: &mut Program<'a>, allocator: &'a Allocator) {
    let ast = oxc::ast::AstBuilder::new(allocator);
    let body_statements = ast.vec_from_iter(program.body.drain(..));
    let function_body = ast.alloc_function_body(SPAN, ast.vec(), body_statements);
    let params = ast.formal_parameters(SPAN, FormalParameterKind::FormalParameter, ast.vec(), NONE);
    let id = ast.binding_identifier(SPAN, ENTRY_FUNCTION_NAME);

    let entry: Function<'a> = ast.function(
        SPAN,
        FunctionType::FunctionDeclaration,
        Some(id),
        false, // generator
        true,  // async
        false, // declare
        NONE::<TSTypeParameterDeclaration>,
        NONE::<TSThisParameter>,
        params,
        NONE::<TSTypeAnnotation>,
        Some(function_body),
    );
    program.body = ast.vec_from_array([Statement::FunctionDeclaration(ast.alloc(entry))]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_top_level_statements_in_entry_function() {
        let output = transform("const x = 1; x;", &TransformOptions::default()).unwrap();
        assert!(output.source.contains("async function __ag_main"));
    }

    #[test]
    fn skips_wrap_when_already_wrapped() {
        let options = TransformOptions {
            transform_loops: false,
            transform_call_tool: false,
            ..TransformOptions::default()
        };
        let source = "async function __ag_main() { return 1; }";
        let output = transform(source, &options).unwrap();
        assert_eq!(output.source.matches("__ag_main").count(), 1);
    }

    #[test]
    fn rewrites_call_tool_to_safe_variant() {
        let output = transform(
            "async function __ag_main() { await callTool('x', {}); }",
            &TransformOptions::default(),
        )
        .unwrap();
        assert!(output.source.contains("__safe_callTool"));
        assert!(!output.source.contains("await callTool"));
    }

    #[test]
    fn rewrites_for_of_loop_to_safe_helper() {
        let output = transform(
            "async function __ag_main() { for (const x of items) { console.log(x); } }",
            &TransformOptions::default(),
        )
        .unwrap();
        assert!(output.source.contains("__safe_forOf"));
    }

    #[test]
    fn extracts_large_string_literals() {
        let huge = "x".repeat(5000);
        let source = format!("async function __ag_main() {{ const s = \"{huge}\"; }}");
        let options = TransformOptions {
            extract_large_strings: true,
            large_string_threshold_bytes: 4096,
            ..TransformOptions::default()
        };
        let output = transform(&source, &options).unwrap();
        assert_eq!(output.large_strings.len(), 1);
        assert!(output.source.contains("__ref("));
    }

    #[test]
    fn parse_error_surfaces_as_transform_error() {
        let err = transform("const = = =;", &TransformOptions::default()).unwrap_err();
        assert!(matches!(err, TransformError::Parse(_)));
    }
}
