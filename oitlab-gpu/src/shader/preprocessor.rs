use crate::shader::{ShaderCompiler, ShaderError, ShaderRequest};
use log::debug;
use std::path::PathBuf;

const MAX_INCLUDE_DEPTH: usize = 16;

/// Front half of a GLSL compiler: finds the source in the search directories, expands
/// `#include "..."` directives and injects the request's defines after `#version`. The output is
/// the text a GLSL front end would consume, which is all the headless device needs as module code.
#[derive(Debug, Clone)]
pub struct GlslPreprocessor {
    search_dirs: Vec<PathBuf>,
}

impl GlslPreprocessor {
    pub fn new<I, P>(search_dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_dirs: search_dirs.into_iter().map(Into::into).collect(),
        }
    }

    fn find(&self, file: &str) -> Result<PathBuf, ShaderError> {
        self.resolve(file).ok_or_else(|| ShaderError::NotFound {
            file: file.to_string(),
            searched: self.search_dirs.clone(),
        })
    }

    fn include_target<'a>(file: &str, line_number: usize, line: &'a str) -> Result<Option<&'a str>, ShaderError> {
        let Some(rest) = line.trim_start().strip_prefix("#include") else {
            return Ok(None);
        };
        let included = rest.trim().trim_matches(|c| c == '"' || c == '<' || c == '>');
        if included.is_empty() {
            return Err(ShaderError::Compilation {
                file: file.to_string(),
                log: format!("{}: empty #include", line_number + 1),
            });
        }
        Ok(Some(included))
    }

    fn check_depth(file: &str, depth: usize) -> Result<(), ShaderError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ShaderError::Compilation {
                file: file.to_string(),
                log: format!("includes nested deeper than {MAX_INCLUDE_DEPTH} levels"),
            });
        }
        Ok(())
    }

    fn expand(&self, file: &str, depth: usize, out: &mut String) -> Result<(), ShaderError> {
        Self::check_depth(file, depth)?;
        let path = self.find(file)?;
        let source = std::fs::read_to_string(&path)?;
        for (line_number, line) in source.lines().enumerate() {
            match Self::include_target(file, line_number, line)? {
                Some(included) => self.expand(included, depth + 1, out)?,
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(())
    }

    /// `file` and everything it includes, each path once.
    fn collect_sources(&self, file: &str, depth: usize, out: &mut Vec<PathBuf>) -> Result<(), ShaderError> {
        Self::check_depth(file, depth)?;
        let path = self.find(file)?;
        if out.contains(&path) {
            return Ok(());
        }
        let source = std::fs::read_to_string(&path)?;
        out.push(path);
        for (line_number, line) in source.lines().enumerate() {
            if let Some(included) = Self::include_target(file, line_number, line)? {
                self.collect_sources(included, depth + 1, out)?;
            }
        }
        Ok(())
    }
}

/// Index of the `#version` line. Only blank lines and comments may precede it, like the license
/// headers on top of most shader sources.
fn version_line(file: &str, lines: &[&str]) -> Result<usize, ShaderError> {
    let mut in_block_comment = false;
    for (index, line) in lines.iter().enumerate() {
        let mut rest = line.trim();
        if in_block_comment {
            match rest.find("*/") {
                Some(end) => {
                    in_block_comment = false;
                    rest = rest[end + 2..].trim();
                }
                None => continue,
            }
        }

        if rest.is_empty() || rest.starts_with("//") {
            continue;
        }
        if let Some(comment) = rest.strip_prefix("/*") {
            in_block_comment = !comment.contains("*/");
            continue;
        }
        if rest.starts_with("#version") {
            return Ok(index);
        }

        return Err(ShaderError::Compilation {
            file: file.to_string(),
            log: format!("{}: #version has to come before any other directive or code", index + 1),
        });
    }

    Err(ShaderError::Compilation {
        file: file.to_string(),
        log: "missing #version directive".into(),
    })
}

impl ShaderCompiler for GlslPreprocessor {
    fn compile(&mut self, request: &ShaderRequest) -> Result<Vec<u8>, ShaderError> {
        let mut expanded = String::new();
        self.expand(&request.file, 0, &mut expanded)?;

        let lines = expanded.lines().collect::<Vec<_>>();
        let version = version_line(&request.file, &lines)?;

        let mut output = String::with_capacity(expanded.len() + 256);
        for line in &lines[..=version] {
            output.push_str(line);
            output.push('\n');
        }
        output.push_str(&request.preamble());
        // keeps the line numbers in diagnostics pointing into the original file.
        output.push_str(&format!("#line {}\n", version + 2));
        for line in &lines[version + 1..] {
            output.push_str(line);
            output.push('\n');
        }

        debug!("Preprocessed {}", request.label());
        Ok(output.into_bytes())
    }

    fn resolve(&self, file: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file())
    }

    fn sources(&self, file: &str) -> Option<Vec<PathBuf>> {
        let mut sources = Vec::new();
        self.collect_sources(file, 0, &mut sources).ok()?;
        Some(sources)
    }
}
