/// Per-call knobs for the transform stage (spec §4.2). All but
/// `wrap_in_main`, `transform_call_tool`, and `transform_loops` are
/// optional — mandatory rewrites (wrap/call-tool/loops) are always applied
/// to produce an executable program; concatenation, templates, and
/// large-string extraction are policy-driven hardening a caller can dial
/// up or down.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub wrap_in_main: bool,
    pub transform_call_tool: bool,
    pub transform_loops: bool,
    pub transform_concatenation: bool,
    pub transform_templates: bool,
    pub extract_large_strings: bool,
    /// Threshold above which `extract_large_strings` replaces a string
    /// literal with a sidecar handle (spec §4.2).
    pub large_string_threshold_bytes: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            wrap_in_main: true,
            transform_call_tool: true,
            transform_loops: true,
            transform_concatenation: false,
            transform_templates: false,
            extract_large_strings: false,
            large_string_threshold_bytes: 4096,
        }
    }
}

/// One extracted string, addressable by `__ref(id)` after
/// `extract_large_strings` runs (spec §4.2 last bullet).
#[derive(Debug, Clone)]
pub struct LargeStringHandle {
    pub id: u32,
    pub value: String,
}

/// The transformer's output: the rewritten source plus any sidecar handles
/// `extract_large_strings` produced.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub source: String,
    pub large_strings: Vec<LargeStringHandle>,
}
