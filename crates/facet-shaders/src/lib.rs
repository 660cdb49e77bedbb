//! Runtime GLSL to SPIR-V compilation for the Facet renderer.
//!
//! Shaders are compiled from source on disk rather than at build time so the
//! same path serves both startup and hot reload: the watcher recompiles a
//! [`ShaderSet`] whenever one of its files changes.

use std::fs;
use std::path::{Path, PathBuf};

use shaderc::{CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, TargetEnv};
use thiserror::Error;

/// Shader compilation errors.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// Shader source could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// GLSL compilation failed.
    #[error("failed to compile {path}: {source}")]
    Compile {
        path: PathBuf,
        source: shaderc::Error,
    },

    /// The shaderc compiler could not be initialized.
    #[error("shader compiler unavailable: {0}")]
    Compiler(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, ShaderError>;

/// The vertex and fragment shader sources of one graphics pipeline.
#[derive(Clone, Debug)]
pub struct ShaderSet {
    vertex: PathBuf,
    fragment: PathBuf,
}

/// Compiled SPIR-V for both stages, ready for shader module creation.
pub struct CompiledShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    /// Create a shader set from the two source paths.
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// The paths a watcher should poll for this set.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        vec![self.vertex.clone(), self.fragment.clone()]
    }

    /// Compile both stages to SPIR-V.
    pub fn compile(&self) -> Result<CompiledShaders> {
        let compiler = Compiler::new()
            .ok_or_else(|| ShaderError::Compiler("failed to create shaderc compiler".into()))?;

        let mut options = CompileOptions::new()
            .ok_or_else(|| ShaderError::Compiler("failed to create compile options".into()))?;
        options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_0 as u32);
        options.set_optimization_level(OptimizationLevel::Performance);

        let vertex = compile_file(&compiler, &options, &self.vertex, ShaderKind::Vertex)?;
        let fragment = compile_file(&compiler, &options, &self.fragment, ShaderKind::Fragment)?;

        Ok(CompiledShaders { vertex, fragment })
    }
}

fn compile_file(
    compiler: &Compiler,
    options: &CompileOptions,
    path: &Path,
    kind: ShaderKind,
) -> Result<Vec<u32>> {
    let source = fs::read_to_string(path).map_err(|source| ShaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("shader");

    let artifact = compiler
        .compile_into_spirv(&source, kind, file_name, "main", Some(options))
        .map_err(|source| ShaderError::Compile {
            path: path.to_path_buf(),
            source,
        })?;

    if artifact.get_num_warnings() > 0 {
        tracing::warn!(
            "{} warning(s) compiling {}",
            artifact.get_num_warnings(),
            path.display()
        );
    }

    Ok(artifact.as_binary().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VERT_SRC: &str = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";
    const FRAG_SRC: &str =
        "#version 450\nlayout(location = 0) out vec4 color;\nvoid main() { color = vec4(1.0); }\n";

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn write_set(vert_src: &str, frag_src: &str) -> ShaderSet {
        let dir = std::env::temp_dir().join(format!(
            "facet-shaders-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();

        let vert = dir.join("test.vert");
        let frag = dir.join("test.frag");
        fs::write(&vert, vert_src).unwrap();
        fs::write(&frag, frag_src).unwrap();

        ShaderSet::new(vert, frag)
    }

    #[test]
    fn both_stages_compile_to_spirv() {
        let set = write_set(VERT_SRC, FRAG_SRC);
        let compiled = set.compile().unwrap();

        assert_eq!(compiled.vertex[0], 0x0723_0203, "Invalid SPIR-V magic number");
        assert_eq!(compiled.fragment[0], 0x0723_0203, "Invalid SPIR-V magic number");
    }

    #[test]
    fn invalid_source_is_a_compile_error() {
        let set = write_set(VERT_SRC, "#version 450\nthis is not glsl\n");

        let result = set.compile();

        assert!(matches!(result, Err(ShaderError::Compile { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let set = write_set(VERT_SRC, FRAG_SRC);
        let missing = ShaderSet::new(set.vertex.clone(), set.fragment.with_extension("gone"));

        let result = missing.compile();

        assert!(matches!(result, Err(ShaderError::Read { .. })));
    }

    #[test]
    fn watch_paths_cover_both_stages() {
        let set = write_set(VERT_SRC, FRAG_SRC);
        let paths = set.watch_paths();

        assert_eq!(paths, vec![set.vertex.clone(), set.fragment.clone()]);
    }
}
