//! WGSL sources for every program the compositor builds.
//!
//! Each program is the shared quad vertex stage followed by one fragment stage. Fragment
//! stages see the bindings declared by [`QUAD_VS`]: the `u` uniform (MVP and intensity),
//! the `t_input` texture and the `s_input` sampler, and must define `fs_main`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::GpuError;

/// Vertex stage shared by all programs. Positions are transformed by `u.mvp`.
pub(crate) const QUAD_VS: &str = r#"
struct QuadUniforms {
    mvp: mat4x4<f32>,
    intensity: f32,
};

@group(0) @binding(0) var<uniform> u: QuadUniforms;
@group(0) @binding(1) var t_input: texture_2d<f32>;
@group(0) @binding(2) var s_input: sampler;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = u.mvp * vec4<f32>(in.position, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}
"#;

/// Samples the texture unmodified. Used by content layers, transform layers and blits.
pub(crate) const PASSTHROUGH_FS: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_input, in.uv);
}
"#;

pub(crate) const GRAYSCALE_FS: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    let gray = dot(color.rgb, vec3<f32>(0.299, 0.587, 0.114));
    return mix(color, vec4<f32>(vec3<f32>(gray), color.a), u.intensity);
}
"#;

pub(crate) const SEPIA_FS: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    let sepia = vec3<f32>(
        dot(color.rgb, vec3<f32>(0.393, 0.769, 0.189)),
        dot(color.rgb, vec3<f32>(0.349, 0.686, 0.168)),
        dot(color.rgb, vec3<f32>(0.272, 0.534, 0.131)),
    );
    return mix(color, vec4<f32>(min(sepia, vec3<f32>(1.0)), color.a), u.intensity);
}
"#;

pub(crate) const INVERT_FS: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    return mix(color, vec4<f32>(vec3<f32>(1.0) - color.rgb, color.a), u.intensity);
}
"#;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern is valid"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^\n]*").expect("line comment pattern is valid"));
static FRAGMENT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@fragment\s+fn\s+fs_main\s*\(").expect("entry point pattern is valid")
});

/// Concatenates the shared vertex stage and a fragment stage into one WGSL module.
pub(crate) fn build_program_wgsl(fragment_source: &str) -> String {
    format!("{QUAD_VS}\n{fragment_source}")
}

/// Checks that user-provided filter WGSL declares the `fs_main` fragment entry point.
///
/// Comments are stripped first so an entry point that only appears commented out is not
/// accepted. Full validation happens when the backend compiles the module.
pub(crate) fn validate_custom_filter(label: &str, fragment_source: &str) -> Result<(), GpuError> {
    let without_blocks = BLOCK_COMMENT.replace_all(fragment_source, "");
    let stripped = LINE_COMMENT.replace_all(&without_blocks, "");

    if FRAGMENT_ENTRY.is_match(&stripped) {
        Ok(())
    } else {
        Err(GpuError::ShaderCompilation {
            label: label.to_string(),
            message: "custom filter must declare `@fragment fn fs_main(in: VertexOutput)`".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_fragments_pass_validation() {
        for source in [PASSTHROUGH_FS, GRAYSCALE_FS, SEPIA_FS, INVERT_FS] {
            assert!(validate_custom_filter("built_in", source).is_ok());
        }
    }

    #[test]
    fn commented_out_entry_point_is_rejected() {
        let source = r#"
            // @fragment fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
            /* @fragment
               fn fs_main(in: VertexOutput) */
            fn helper() {}
        "#;
        let error = validate_custom_filter("tint", source).unwrap_err();
        assert!(matches!(error, GpuError::ShaderCompilation { ref label, .. } if label == "tint"));
    }

    #[test]
    fn entry_point_tolerates_extra_whitespace() {
        let source = "@fragment\n fn   fs_main ( in: VertexOutput ) -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        assert!(validate_custom_filter("spaced", source).is_ok());
    }

    #[test]
    fn program_module_starts_with_vertex_stage() {
        let module = build_program_wgsl(GRAYSCALE_FS);
        let vertex_at = module.find("fn vs_main").unwrap();
        let fragment_at = module.find("fn fs_main").unwrap();
        assert!(vertex_at < fragment_at);
    }
}
