use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::core::init::RewriteTerm;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read lexicon file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid lexicon line: {0}")]
    InvalidLine(String),
}

/// Loads `source:target` rewrite terms from a file. Blank lines and `#`
/// comments are skipped; surrounding quotes on either side are stripped.
/// Returns `None` when the file holds no terms.
pub fn load(path: &Path) -> Result<Option<Vec<RewriteTerm>>, LexiconError> {
    let contents = fs::read_to_string(path).map_err(|source| LexiconError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&contents)
}

fn parse(contents: &str) -> Result<Option<Vec<RewriteTerm>>, LexiconError> {
    let mut terms = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(separator) = trimmed.find(':').filter(|idx| *idx > 0) else {
            return Err(LexiconError::InvalidLine(line.to_string()));
        };
        let source = trimmed[..separator].trim().trim_matches('"');
        let target = trimmed[separator + 1..].trim().trim_matches('"');
        if source.is_empty() || target.is_empty() {
            return Err(LexiconError::InvalidLine(line.to_string()));
        }
        terms.push(RewriteTerm {
            source: source.to_string(),
            target: target.to_string(),
        });
    }
    Ok(if terms.is_empty() { None } else { Some(terms) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terms_and_skips_comments() {
        let terms = parse("# preset\nfoo:bar\n\n\"spaced term\" : \"replacement\"\n")
            .expect("parse")
            .expect("terms");
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].source, "foo");
        assert_eq!(terms[0].target, "bar");
        assert_eq!(terms[1].source, "spaced term");
        assert_eq!(terms[1].target, "replacement");
    }

    #[test]
    fn empty_input_yields_no_lexicon() {
        assert!(parse("# only a comment\n").expect("parse").is_none());
    }

    #[test]
    fn missing_separator_is_rejected() {
        let err = parse("no separator here\n").expect_err("must fail");
        assert!(matches!(err, LexiconError::InvalidLine(_)));
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = parse("foo:\n").expect_err("must fail");
        assert!(matches!(err, LexiconError::InvalidLine(_)));
    }
}
