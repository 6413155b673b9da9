use oitlab_gpu::shader::cache::CachedCompiler;
use oitlab_gpu::shader::preprocessor::GlslPreprocessor;
use oitlab_gpu::shader::{ShaderCompiler, ShaderError, ShaderRequest, ShaderStage, SyntheticCompiler};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("oitlab-gpu-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn set_mtime(path: &PathBuf, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

#[test]
fn preprocessor_injects_defines_after_version() {
    let dir = scratch_dir("preamble");
    fs::write(dir.join("common.h"), "const int BINDING = 0;\n").unwrap();
    fs::write(
        dir.join("opaque.frag.glsl"),
        "#version 450\n#include \"common.h\"\nvoid main() {}\n",
    )
    .unwrap();

    let mut compiler = GlslPreprocessor::new([&dir]);
    let request = ShaderRequest::new(ShaderStage::Fragment, "opaque.frag.glsl").define("OIT_MSAA", 4);
    let text = String::from_utf8(compiler.compile(&request).unwrap()).unwrap();

    assert_eq!(
        text,
        "#version 450\n#define OIT_MSAA 4\n#line 2\nconst int BINDING = 0;\nvoid main() {}\n"
    );
}

#[test]
fn preprocessor_reports_missing_sources() {
    let dir = scratch_dir("missing");
    let mut compiler = GlslPreprocessor::new([&dir]);
    let result = compiler.compile(&ShaderRequest::new(ShaderStage::Vertex, "nope.vert.glsl"));
    assert!(matches!(result, Err(ShaderError::NotFound { .. })));
}

#[test]
fn preprocessor_requires_version_directive() {
    let dir = scratch_dir("version");
    fs::write(dir.join("broken.frag.glsl"), "void main() {}\n").unwrap();
    let mut compiler = GlslPreprocessor::new([&dir]);
    let result = compiler.compile(&ShaderRequest::new(ShaderStage::Fragment, "broken.frag.glsl"));
    assert!(matches!(result, Err(ShaderError::Compilation { .. })));
}

#[test]
fn license_headers_may_precede_the_version() {
    let dir = scratch_dir("license");
    fs::write(
        dir.join("oitSimple.frag.glsl"),
        "/*\n * Copyright (c) 2019, all rights reserved.\n */\n\n// SPDX\n#version 460\nvoid main() {}\n",
    )
    .unwrap();

    let mut compiler = GlslPreprocessor::new([&dir]);
    let request = ShaderRequest::new(ShaderStage::Fragment, "oitSimple.frag.glsl").define("OIT_LAYERS", 8);
    let text = String::from_utf8(compiler.compile(&request).unwrap()).unwrap();

    assert_eq!(
        text,
        "/*\n * Copyright (c) 2019, all rights reserved.\n */\n\n// SPDX\n#version 460\n\
         #define OIT_LAYERS 8\n#line 7\nvoid main() {}\n"
    );
}

#[test]
fn code_before_the_version_is_rejected() {
    let dir = scratch_dir("late-version");
    fs::write(dir.join("late.frag.glsl"), "/* header */\nlayout(location = 0) out vec4 color;\n#version 450\n").unwrap();
    let mut compiler = GlslPreprocessor::new([&dir]);
    let result = compiler.compile(&ShaderRequest::new(ShaderStage::Fragment, "late.frag.glsl"));
    assert!(matches!(result, Err(ShaderError::Compilation { log, .. }) if log.starts_with("2:")));
}

#[test]
fn editing_an_include_invalidates_the_cache() {
    let sources = scratch_dir("include-src");
    let cache_dir = scratch_dir("include-cache");
    let common = sources.join("common.h");
    let shader = sources.join("oitLoop.frag.glsl");
    fs::write(&common, "#define X 1\n").unwrap();
    fs::write(&shader, "#version 450\n#include \"common.h\"\nvoid main() {}\n").unwrap();
    set_mtime(&common, 1_000);
    set_mtime(&shader, 1_000);

    let request = ShaderRequest::new(ShaderStage::Fragment, "oitLoop.frag.glsl");
    let mut compiler = CachedCompiler::open(GlslPreprocessor::new([&sources]), &cache_dir).unwrap();
    compiler.compile(&request).unwrap();

    fs::write(&common, "#define X 2\n").unwrap();
    set_mtime(&common, 2_000);
    let second = String::from_utf8(compiler.compile(&request).unwrap()).unwrap();
    assert!(second.contains("#define X 2"));
    assert_eq!((compiler.hits(), compiler.misses()), (0, 2));

    compiler.compile(&request).unwrap();
    assert_eq!(compiler.hits(), 1);
}

#[test]
fn cache_reuses_and_invalidates_on_modification() {
    let sources = scratch_dir("cache-src");
    let cache_dir = scratch_dir("cache-dir");
    let source = sources.join("object.vert.glsl");
    fs::write(&source, "#version 450\nvoid main() {}\n").unwrap();
    set_mtime(&source, 1_000);

    let request = ShaderRequest::new(ShaderStage::Vertex, "object.vert.glsl").define("OIT_LAYERS", 8);
    let mut compiler = CachedCompiler::open(GlslPreprocessor::new([&sources]), &cache_dir).unwrap();

    let first = compiler.compile(&request).unwrap();
    let second = compiler.compile(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!((compiler.hits(), compiler.misses()), (1, 1));

    // other defines are another entry
    compiler.compile(&request.clone().define("OIT_MSAA", 4)).unwrap();
    assert_eq!(compiler.misses(), 2);

    fs::write(&source, "#version 460\nvoid main() {}\n").unwrap();
    set_mtime(&source, 2_000);
    let third = compiler.compile(&request).unwrap();
    assert!(String::from_utf8(third).unwrap().starts_with("#version 460"));
    assert_eq!(compiler.misses(), 3);

    // the index survives reopening
    let mut reopened = CachedCompiler::open(GlslPreprocessor::new([&sources]), &cache_dir).unwrap();
    reopened.compile(&request).unwrap();
    assert_eq!((reopened.hits(), reopened.misses()), (1, 0));
}

#[test]
fn corrupt_index_is_discarded() {
    let cache_dir = scratch_dir("corrupt");
    fs::write(cache_dir.join("index.json"), "{ not json").unwrap();
    assert!(CachedCompiler::open(SyntheticCompiler::default(), &cache_dir).is_ok());
}

#[test]
fn compilers_without_sources_are_not_cached() {
    let cache_dir = scratch_dir("synthetic");
    let mut compiler = CachedCompiler::open(SyntheticCompiler::default(), &cache_dir).unwrap();
    let request = ShaderRequest::new(ShaderStage::Fragment, "oitWeighted.frag.glsl");
    compiler.compile(&request).unwrap();
    compiler.compile(&request).unwrap();
    assert_eq!(compiler.inner().requests().len(), 2);
    assert_eq!(compiler.hits(), 0);
}
