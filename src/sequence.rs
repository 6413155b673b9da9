//! Scripted runs through many configurations in one process.
//!
//! ```text
//! # comments start with a hash
//! SEQUENCE "interlock_unordered"
//! --algorithm interlock --interlock-is-ordered 0
//! SEQUENCE "opaque"
//! --percent-transparent 0
//! ```
//!
//! Every sequence starts from the state configured on the command line and applies its own
//! flags on top.

use crate::rendering::state::{Algorithm, AntialiasingMode};
use crate::settings::StateOverrides;
use clap::Parser;
use itertools::Itertools;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Line {line}: expected SEQUENCE \"name\"")]
    MissingName { line: usize },

    #[error("Line {line}: flags before the first SEQUENCE")]
    FlagsOutsideSequence { line: usize },

    #[error("Invalid flags in sequence \"{name}\": {source}")]
    InvalidFlags {
        name: String,
        #[source]
        source: clap::Error,
    },

    #[error("The script contains no sequences")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub overrides: StateOverrides,
}

impl Sequence {
    fn named(name: impl Into<String>) -> Self {
        Sequence {
            name: name.into(),
            overrides: StateOverrides::default(),
        }
    }
}

fn parse_name(rest: &str, line: usize) -> Result<String, SequenceError> {
    let rest = rest.trim();
    rest.strip_prefix('"')
        .and_then(|quoted| quoted.strip_suffix('"'))
        .filter(|name| !name.is_empty() && !name.contains('"'))
        .map(str::to_string)
        .ok_or(SequenceError::MissingName { line })
}

fn parse_overrides(name: &str, flags: &[&str]) -> Result<StateOverrides, SequenceError> {
    StateOverrides::try_parse_from(std::iter::once("sequence").chain(flags.iter().copied())).map_err(|source| {
        SequenceError::InvalidFlags {
            name: name.to_string(),
            source,
        }
    })
}

/// Cuts `line` at the first `#` that isn't inside a quoted name.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..index],
            _ => {}
        }
    }
    line
}

pub fn parse(script: &str) -> Result<Vec<Sequence>, SequenceError> {
    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();

    for (index, line) in script.lines().enumerate() {
        let line_number = index + 1;
        let content = strip_comment(line).trim();
        if content.is_empty() {
            continue;
        }

        if let Some(rest) = content.strip_prefix("SEQUENCE") {
            blocks.push((parse_name(rest, line_number)?, Vec::new()));
            continue;
        }

        match blocks.last_mut() {
            Some((_, flags)) => flags.extend(content.split_whitespace()),
            None => return Err(SequenceError::FlagsOutsideSequence { line: line_number }),
        }
    }

    if blocks.is_empty() {
        return Err(SequenceError::Empty);
    }

    blocks
        .into_iter()
        .map(|(name, flags)| {
            let overrides = parse_overrides(&name, &flags)?;
            Ok(Sequence { name, overrides })
        })
        .collect()
}

fn tail_name(tail_blend: bool) -> &'static str {
    if tail_blend { "tail" } else { "notail" }
}

/// The smoke test matrix: a few special cases, then every algorithm with and without tail
/// blending in every antialiasing mode.
pub fn default_matrix() -> Vec<Sequence> {
    let mut sequences = vec![Sequence::named("init")];

    let mut special = |name: &str, apply: fn(&mut StateOverrides)| {
        let mut sequence = Sequence::named(name);
        apply(&mut sequence.overrides);
        sequences.push(sequence);
    };
    special("interlock_unordered", |o| {
        o.algorithm = Some(Algorithm::Interlock);
        o.interlock_is_ordered = Some(false);
    });
    special("opaque", |o| o.percent_transparent = Some(0));
    special("opaque_msaa4", |o| {
        o.percent_transparent = Some(0);
        o.aa_type = Some(AntialiasingMode::Msaa4x);
    });
    special("opaque_ssaa4", |o| {
        o.percent_transparent = Some(0);
        o.aa_type = Some(AntialiasingMode::Ssaa4x);
    });
    special("3objects", |o| o.num_objects = Some(3));
    special("lowsubdiv", |o| o.subdiv = Some(2));
    special("scaleMin", |o| o.scale_min = Some(1.0));
    special("scaleWidth", |o| o.scale_width = Some(10.0));

    let matrix = Algorithm::ALL
        .into_iter()
        .cartesian_product([false, true])
        .cartesian_product(AntialiasingMode::ALL)
        .map(|((algorithm, tail_blend), aa_type)| Sequence {
            name: format!("{algorithm}_{}_{aa_type}", tail_name(tail_blend)),
            overrides: StateOverrides {
                algorithm: Some(algorithm),
                tail_blend: Some(tail_blend),
                aa_type: Some(aa_type),
                ..Default::default()
            },
        });
    sequences.extend(matrix);
    sequences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn parses_blocks_and_comments() {
        let script = r#"
            # leading comment
            SEQUENCE "init"
            SEQUENCE "interlock_unordered"
            --algorithm 5 --interlock-is-ordered 0 # trailing comment
            SEQUENCE "msaa"
            --aa-type msaa4x
            --num-objects 3
        "#;
        let sequences = parse(script).unwrap();
        assert_eq!(sequences.iter().map(|s| s.name.as_str()).collect_vec(), [
            "init",
            "interlock_unordered",
            "msaa"
        ]);
        assert_eq!(sequences[0].overrides, StateOverrides::default());
        assert_eq!(sequences[1].overrides.algorithm, Some(Algorithm::Interlock));
        assert_eq!(sequences[1].overrides.interlock_is_ordered, Some(false));
        assert_eq!(sequences[2].overrides.aa_type, Some(AntialiasingMode::Msaa4x));
        assert_eq!(sequences[2].overrides.num_objects, Some(3));
    }

    #[test]
    pub fn hashes_inside_names_are_not_comments() {
        let sequences = parse("SEQUENCE \"a#b\" # the name keeps its hash\n--subdiv 4 # low\n").unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].name, "a#b");
        assert_eq!(sequences[0].overrides.subdiv, Some(4));
    }

    #[test]
    pub fn rejects_malformed_scripts() {
        assert!(matches!(
            parse("--algorithm 1"),
            Err(SequenceError::FlagsOutsideSequence { line: 1 })
        ));
        assert!(matches!(
            parse("SEQUENCE unquoted"),
            Err(SequenceError::MissingName { line: 1 })
        ));
        assert!(matches!(parse("# nothing\n"), Err(SequenceError::Empty)));
        assert!(matches!(
            parse("SEQUENCE \"bad\"\n--algorithm nope"),
            Err(SequenceError::InvalidFlags { .. })
        ));
    }

    #[test]
    pub fn default_matrix_covers_every_combination() {
        let matrix = default_matrix();
        assert_eq!(matrix.len(), 9 + 7 * 2 * 6);
        assert!(matrix.iter().map(|s| &s.name).all_unique());
        assert!(matrix.iter().any(|s| s.name == "weighted_notail_ssaa8x"));
    }
}
