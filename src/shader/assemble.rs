//! Fragment shader assembly from a transition snippet.
//!
//! The snippet must define `vec4 transition(vec2 uv)`. It is spliced after a header that
//! declares everything the snippet may use and before a footer that calls it.
//! Nothing here touches the GPU; malformed snippets only fail once compiled.

/// GLSL prologue: version, varyings and the frame texture.
///
/// Bindings and the block layout must match [`crate::shader::UniformBindings`].
const PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 _uv;
layout(location = 0) out vec4 _fragColor;

layout(set = 0, binding = 0) uniform texture2D _to_texture;
layout(set = 0, binding = 1) uniform sampler _to_sampler;
";

/// Opening of the parameter block. The block has no instance name, so its members are
/// plain identifiers a snippet may shadow.
const PARAMS_BEGIN: &str = r"
layout(std140, set = 0, binding = 2) uniform TransitionParams {
    float progress;
    vec2 resolution;
";

const PARAMS_END: &str = "};\n";

const DEFINES: &str = r"
#define to sampler2D(_to_texture, _to_sampler)
#define texture2D texture
";

/// GLSL epilogue writing the transition colour to the output.
pub const FOOTER: &str = r"
void main() {
    _fragColor = transition(_uv);
}
";

/// Pass-through transition used when no snippet is configured.
pub const DEFAULT_TRANSITION: &str = r"vec4 transition(vec2 uv) {
    return texture2D(to, uv);
}
";

/// Vertex stage shared by every transition: maps the quad to `_uv` in `[0, 1]²`.
pub const VERTEX_SHADER: &str = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 0) out vec2 _uv;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    _uv = position * 0.5 + 0.5;
}
";

/// Names the header already declares; snippet redeclarations of these are dropped.
const RESERVED_UNIFORMS: &[&str] = &["to", "progress", "resolution"];

/// Uniform types a snippet may declare on its own. They move into the parameter block
/// and stay zero, since nothing writes them.
const LIFTABLE_TYPES: &[&str] = &[
    "float", "int", "uint", "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4", "uvec2", "uvec3", "uvec4",
];

const PRECISION_QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];

/// Builds the complete fragment shader for `snippet`, or for the default transition.
pub fn assemble(snippet: Option<&str>) -> String {
    let (body, params) = sanitize(snippet.unwrap_or(DEFAULT_TRANSITION));
    let mut source = String::with_capacity(PRELUDE.len() + body.len() + 512);
    source.push_str(PRELUDE);
    source.push_str(PARAMS_BEGIN);
    for param in &params {
        source.push_str("    ");
        source.push_str(param);
        source.push('\n');
    }
    source.push_str(PARAMS_END);
    source.push_str(DEFINES);
    source.push_str("\n#line 1\n");
    source.push_str(&body);
    source.push_str(FOOTER);
    source
}

enum Line {
    Keep,
    Drop,
    Lift(Vec<String>),
}

/// Strips `#version` lines and reserved uniform declarations, and pulls plain
/// uniforms out of the snippet. Returns the body and the lifted block members.
fn sanitize(snippet: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(snippet.len() + 1);
    let mut params = Vec::new();
    for line in snippet.lines() {
        let trimmed = line.trim_start();
        let kind = if trimmed.starts_with("#version") {
            Line::Drop
        } else {
            classify_uniform(trimmed)
        };
        match kind {
            Line::Keep => out.push_str(line),
            Line::Drop => {}
            Line::Lift(members) => params.extend(members),
        }
        // Removed lines stay as blanks so `#line 1` diagnostics still match the snippet.
        out.push('\n');
    }
    (out, params)
}

fn classify_uniform(line: &str) -> Line {
    let Some(decl) = line.strip_prefix("uniform ") else {
        return Line::Keep;
    };
    let decl = decl.split("//").next().unwrap_or_default();
    let Some(decl) = decl.trim_end().strip_suffix(';') else {
        return Line::Keep;
    };

    let mut words = decl
        .split_whitespace()
        .filter(|w| !PRECISION_QUALIFIERS.contains(w));
    let Some(ty) = words.next() else {
        return Line::Keep;
    };
    let rest: String = words.collect::<Vec<_>>().join(" ");
    let names: Vec<&str> = rest.split(',').map(str::trim).collect();

    let reserved = names.iter().filter(|n| RESERVED_UNIFORMS.contains(n)).count();
    if reserved == names.len() {
        return Line::Drop;
    }
    if !LIFTABLE_TYPES.contains(&ty) || !names.iter().all(|n| is_identifier(n)) {
        return Line::Keep;
    }
    Line::Lift(
        names
            .into_iter()
            .filter(|n| !RESERVED_UNIFORMS.contains(n))
            .map(|n| format!("{ty} {n};"))
            .collect(),
    )
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transition_is_used_without_snippet() {
        let source = assemble(None);
        assert!(source.starts_with("#version 450"));
        assert!(source.contains("return texture2D(to, uv);"));
        assert!(source.trim_end().ends_with('}'));
        assert!(source.contains("_fragColor = transition(_uv);"));
    }

    #[test]
    fn snippet_sits_between_header_and_main() {
        let snippet = "vec4 transition(vec2 uv) { return vec4(progress); }";
        let source = assemble(Some(snippet));
        let header_end = source.find("#line 1").unwrap();
        let snippet_at = source.find(snippet).unwrap();
        let main_at = source.find("void main()").unwrap();
        assert!(header_end < snippet_at && snippet_at < main_at);
        assert!(!source.contains(DEFAULT_TRANSITION));
    }

    #[test]
    fn parameters_are_not_macros() {
        let source = assemble(None);
        assert!(!source.contains("#define progress"));
        assert!(!source.contains("#define resolution"));
        assert!(source.contains("    float progress;\n    vec2 resolution;\n"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let snippet = Some("vec4 transition(vec2 uv) { return vec4(1.0); }");
        assert_eq!(assemble(snippet), assemble(snippet));
    }

    #[test]
    fn strips_colliding_declarations() {
        let snippet = "#version 330\nuniform sampler2D to;\nuniform float progress; // 0..1\nuniform vec2 resolution;\nvec4 transition(vec2 uv) { return texture2D(to, uv); }\n";
        let source = assemble(Some(snippet));
        assert!(!source.contains("#version 330"));
        assert!(!source.contains("uniform sampler2D to;"));
        assert!(!source.contains("uniform float progress;"));
        assert!(!source.contains("uniform vec2 resolution;"));
    }

    #[test]
    fn plain_uniforms_move_into_the_parameter_block() {
        let snippet = "uniform float strength; // 0..1\nuniform highp vec2 center, direction;\nvec4 transition(vec2 uv) { return texture2D(to, uv) * strength; }\n";
        let source = assemble(Some(snippet));
        assert!(!source.contains("uniform float strength;"));
        let block_end = source.find(PARAMS_END).unwrap();
        for member in ["float strength;", "vec2 center;", "vec2 direction;"] {
            let at = source.find(member).unwrap_or_else(|| panic!("{member} missing"));
            assert!(at < block_end, "{member} is outside the block");
        }
    }

    #[test]
    fn mixed_reserved_and_plain_names_keep_the_plain_ones() {
        let (_, params) = sanitize("uniform float progress, amount;\n");
        assert_eq!(params, vec!["float amount;".to_string()]);
    }

    #[test]
    fn opaque_and_initialized_uniforms_are_left_alone() {
        let snippet = "uniform sampler2D from;\nuniform float amount = 0.5;\nuniform float weights[4];\n";
        let (body, params) = sanitize(snippet);
        assert!(params.is_empty());
        assert_eq!(body, snippet);
    }

    #[test]
    fn sanitizing_keeps_line_numbers() {
        let snippet = "#version 330\nuniform float progress;\nuniform float strength;\nvec4 transition(vec2 uv) { return vec4(0.0); }\n";
        let (body, _) = sanitize(snippet);
        assert_eq!(body.lines().count(), snippet.lines().count());
    }

    #[test]
    fn malformed_snippet_is_not_rejected_here() {
        let source = assemble(Some("this is not glsl"));
        assert!(source.contains("this is not glsl"));
    }
}
