//! `extract_large_strings` (spec §4.2 last bullet): string literals over a
//! threshold are pulled out to a sidecar handle table and replaced by a
//! `__ref(id)` call, so the transformed source itself stays small and the
//! executor can cap how deep a resolved reference is allowed to nest.

use oxc::ast::ast::{Argument, Expression, NumericLiteral};
use oxc::ast::NONE;
use oxc::span::SPAN;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::options::LargeStringHandle;

pub struct LargeStringExtractor<'o> {
    threshold_bytes: usize,
    next_id: u32,
    pub handles: Vec<LargeStringHandle>,
    _marker: std::marker::PhantomData<&'o ()>,
}

impl<'o> LargeStringExtractor<'o> {
    pub fn new(threshold_bytes: usize) -> Self {
        Self {
            threshold_bytes,
            next_id: 0,
            handles: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'a, 'o> Traverse<'a> for LargeStringExtractor<'o> {
    fn exit_expression(&mut self, node: &mut Expression<'a>, ctx: &mut TraverseCtx<'a>) {
        let Expression::StringLiteral(lit) = node else {
            return;
        };
        if lit.value.len() <= self.threshold_bytes {
            return;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.handles.push(LargeStringHandle {
            id,
            value: lit.value.to_string(),
        });

        let callee = ctx.ast.expression_identifier_reference(SPAN, "__ref");
        let id_arg = Expression::NumericLiteral(ctx.ast.alloc(NumericLiteral::new(
            SPAN,
            id as f64,
            None,
            oxc::ast::ast::NumberBase::Decimal,
        )));
        let arguments = ctx.ast.vec_from_array([Argument::from(id_arg)]);
        *node = ctx.ast.expression_call(SPAN, callee, NONE, arguments, false);
    }
}
