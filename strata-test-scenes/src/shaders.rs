/// Custom filter that pushes colors towards red. Scales green and blue by
/// `1 - intensity / 2`.
pub const RED_TINT_WGSL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    let tinted = vec4<f32>(color.r, color.g * 0.5, color.b * 0.5, color.a);
    return mix(color, tinted, u.intensity);
}
"#;

/// Declares no fragment entry point; building it must fail.
pub const MISSING_ENTRY_POINT_WGSL: &str = r#"
// @fragment fn fs_main(in: VertexOutput) -> @location(0) vec4<f32>
fn helper(color: vec4<f32>) -> vec4<f32> {
    return color;
}
"#;
