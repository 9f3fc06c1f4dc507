//! Heuristic comment removal for practice snippets.
//!
//! The strategy for a file is looked up in two small tables, by extension
//! first and then by the language folder it lives in. Adding a language is a
//! single table row.
use std::path::Path;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

const C_BLOCK: (&str, &str) = ("/*", "*/");
const PY_DOUBLE: (&str, &str) = ("\"\"\"", "\"\"\"");
const PY_SINGLE: (&str, &str) = ("'''", "'''");

/// Single-line literals; an unclosed one runs to the end of the line.
const DOUBLE_QUOTED: &str = r#""(?:\\.|[^"\\\n])*"?"#;
const SINGLE_QUOTED: &str = r#"'(?:\\.|[^'\\\n])*'?"#;
/// Template strings and Go raw strings, which may span lines.
const BACKTICK: &str = r"`(?:\\[\s\S]|[^`\\])*`";
const RUST_STRING: &str = r#"b?"(?:\\[\s\S]|[^"\\])*""#;
const RUST_RAW_STRING: &str = r##"b?r#"[\s\S]*?"#|b?r"[^"]*""##;
/// Exactly one character or escape between the quotes, so lifetimes never match.
const RUST_CHAR: &str = r"b?'(?:\\(?:u\{[0-9A-Fa-f]{1,6}\}|x[0-9A-Fa-f]{2}|.)|[^'\\\n])'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StripStrategy {
    /// `/* ... */` blocks and `//` line comments.
    CLike,
    /// [`StripStrategy::CLike`] plus backtick strings (JavaScript, TypeScript, Go).
    CLikeBacktick,
    /// [`StripStrategy::CLike`] with Rust string, raw string and char literals.
    RustLike,
    /// Triple-quoted blocks, then `#` line comments.
    PythonLike,
    /// Everything from the prefix to the end of the line.
    LinePrefix(&'static str),
    /// Everything between the two delimiters, across lines.
    BlockDelimited(&'static str, &'static str),
    /// C-style stripping followed by `#` line comments.
    Fallback,
}

const EXTENSIONS: &[(&str, StripStrategy)] = &[
    ("c", StripStrategy::CLike),
    ("h", StripStrategy::CLike),
    ("hpp", StripStrategy::CLike),
    ("cpp", StripStrategy::CLike),
    ("cc", StripStrategy::CLike),
    ("java", StripStrategy::CLike),
    ("js", StripStrategy::CLikeBacktick),
    ("ts", StripStrategy::CLikeBacktick),
    ("go", StripStrategy::CLikeBacktick),
    ("rs", StripStrategy::RustLike),
    ("py", StripStrategy::PythonLike),
    ("vhd", StripStrategy::LinePrefix("--")),
    ("vhdl", StripStrategy::LinePrefix("--")),
    ("html", StripStrategy::BlockDelimited("<!--", "-->")),
    ("htm", StripStrategy::BlockDelimited("<!--", "-->")),
];

const LANGUAGES: &[(&str, StripStrategy)] = &[
    ("c", StripStrategy::CLike),
    ("cpp", StripStrategy::CLike),
    ("c++", StripStrategy::CLike),
    ("java", StripStrategy::CLike),
    ("javascript", StripStrategy::CLikeBacktick),
    ("typescript", StripStrategy::CLikeBacktick),
    ("go", StripStrategy::CLikeBacktick),
    ("rust", StripStrategy::RustLike),
    ("python", StripStrategy::PythonLike),
    ("vhdl", StripStrategy::LinePrefix("--")),
    ("html", StripStrategy::BlockDelimited("<!--", "-->")),
];

#[derive(Debug, Error)]
pub enum StripError {
    #[error("unterminated '{open}' comment starting on line {line}")]
    UnterminatedBlock { open: &'static str, line: usize },

    #[error("invalid comment pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One `replace_all`-style sweep over the text.
///
/// Literals, comments and unmatched block openers are alternatives of a
/// single regex, so whichever starts first wins: comment markers inside a
/// literal are never seen, and an opener without its closer is an error.
struct Pass {
    literals: Vec<&'static str>,
    blocks: Vec<(&'static str, &'static str)>,
    line: Option<&'static str>,
}

impl Pass {
    fn regex(&self) -> Result<Regex, regex::Error> {
        let mut comments: Vec<String> = self
            .blocks
            .iter()
            .map(|(open, close)| {
                format!(r"{}[\s\S]*?{}", regex::escape(open), regex::escape(close))
            })
            .collect();
        if let Some(prefix) = self.line {
            comments.push(format!(r"{}[^\n]*", regex::escape(prefix)));
        }

        let mut alternatives = Vec::new();
        if !self.literals.is_empty() {
            alternatives.push(format!("(?P<literal>{})", self.literals.join("|")));
        }
        alternatives.push(format!("(?P<comment>{})", comments.join("|")));
        if !self.blocks.is_empty() {
            let opens: Vec<String> = self.blocks.iter().map(|(o, _)| regex::escape(o)).collect();
            alternatives.push(format!("(?P<open>{})", opens.join("|")));
        }

        Regex::new(&alternatives.join("|"))
    }

    fn apply(&self, text: &str) -> Result<String, StripError> {
        let re = self.regex()?;

        if let Some(open) = re.captures_iter(text).find_map(|caps| caps.name("open")) {
            return Err(StripError::UnterminatedBlock {
                open: self.opener(open.as_str()),
                line: text[..open.start()].matches('\n').count() + 1,
            });
        }

        let stripped = re.replace_all(text, |caps: &Captures| {
            if caps.name("comment").is_some() {
                String::new()
            } else {
                caps[0].to_string()
            }
        });
        Ok(stripped.into_owned())
    }

    fn opener(&self, matched: &str) -> &'static str {
        self.blocks
            .iter()
            .map(|&(open, _)| open)
            .find(|open| *open == matched)
            .unwrap_or(C_BLOCK.0)
    }
}

impl StripStrategy {
    fn passes(self) -> Vec<Pass> {
        let c_like = |literals: Vec<&'static str>| Pass {
            literals,
            blocks: vec![C_BLOCK],
            line: Some("//"),
        };
        let hash = || Pass {
            literals: vec![DOUBLE_QUOTED, SINGLE_QUOTED],
            blocks: vec![],
            line: Some("#"),
        };

        match self {
            StripStrategy::CLike => vec![c_like(vec![DOUBLE_QUOTED, SINGLE_QUOTED])],
            StripStrategy::CLikeBacktick => {
                vec![c_like(vec![BACKTICK, DOUBLE_QUOTED, SINGLE_QUOTED])]
            }
            StripStrategy::RustLike => {
                vec![c_like(vec![RUST_RAW_STRING, RUST_STRING, RUST_CHAR])]
            }
            StripStrategy::PythonLike => vec![
                Pass {
                    literals: vec![],
                    blocks: vec![PY_DOUBLE, PY_SINGLE],
                    line: None,
                },
                hash(),
            ],
            // VHDL uses ' for attributes (clk'event), so only " opens a literal
            StripStrategy::LinePrefix(prefix) => vec![Pass {
                literals: vec![DOUBLE_QUOTED],
                blocks: vec![],
                line: Some(prefix),
            }],
            StripStrategy::BlockDelimited(open, close) => vec![Pass {
                literals: vec![],
                blocks: vec![(open, close)],
                line: None,
            }],
            StripStrategy::Fallback => {
                vec![c_like(vec![DOUBLE_QUOTED, SINGLE_QUOTED]), hash()]
            }
        }
    }
}

/// Picks the strategy for a file: extension first, then the language tag.
pub fn strategy_for(language_hint: &str, file_name: &str) -> StripStrategy {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let by_extension = extension
        .as_deref()
        .and_then(|ext| lookup(EXTENSIONS, ext));

    by_extension
        .or_else(|| lookup(LANGUAGES, &language_hint.trim().to_ascii_lowercase()))
        .unwrap_or(StripStrategy::Fallback)
}

/// Strips comments, reporting why it could not.
///
/// Removing a comment can join its neighbours into a new one
/// (`<!<!-- x -->-- y -->`), so the passes repeat until the text settles.
pub fn try_strip_comments(
    language_hint: &str,
    file_name: &str,
    text: &str,
) -> Result<String, StripError> {
    let strategy = strategy_for(language_hint, file_name);
    debug!(%strategy, file_name, "stripping comments");

    let passes = strategy.passes();
    let mut current = text.to_string();
    loop {
        let mut next = current.clone();
        for pass in &passes {
            next = pass.apply(&next)?;
        }
        let next = trim_line_ends(&next);
        // passes only ever remove text, so this terminates
        if next == current {
            return Ok(next);
        }
        current = next;
    }
}

/// Strips comments, handing back the original text if anything goes wrong.
pub fn strip_comments(language_hint: &str, file_name: &str, text: &str) -> String {
    try_strip_comments(language_hint, file_name, text).unwrap_or_else(|e| {
        warn!("Leaving {language_hint}/{file_name} unstripped: {e}");
        text.to_string()
    })
}

fn lookup(table: &[(&str, StripStrategy)], key: &str) -> Option<StripStrategy> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|&(_, strategy)| strategy)
}

fn trim_line_ends(text: &str) -> String {
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
