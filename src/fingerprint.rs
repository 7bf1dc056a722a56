//! A lightweight reference encoder for SMILES strings.
//!
//! [`TokenFingerprinter`] tokenizes a SMILES string, checks that the token
//! sequence is structurally well formed and folds hashed token n-grams into a
//! fixed-width count vector. It performs no chemical perception (valence,
//! aromaticity, stereo); it only guarantees that the same string always maps to
//! the same vector and that obviously malformed strings are rejected.
//!
//! # Example
//!
//! ```
//! use molprint::encoder::Encoder;
//! use molprint::fingerprint::TokenFingerprinter;
//!
//! let fp = TokenFingerprinter::new(512);
//! assert_eq!(fp.encode("CCO").unwrap().len(), 512);
//! assert!(fp.encode("INVALID").is_err());
//! assert!(!fp.is_valid("1"));
//! ```

use crate::encoder::{EncodeError, Encoder, FixedVector};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Default fingerprint width.
pub const DEFAULT_LENGTH: usize = 2048;

/// Default longest n-gram, in tokens (atom-bond-atom-bond-atom).
pub const DEFAULT_MAX_NGRAM: usize = 5;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\[\]]+\]|Br|Cl|[BCNOPSFI]|[bcnops]|\*|%[0-9]{2}|[0-9]|[-=#$:/\\~.()]")
        .expect("token pattern compiles")
});

static BRACKET_ATOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[0-9]*(?:[A-Z][a-z]?|[a-z]{1,2}|\*)[^\[\]]*\]$")
        .expect("bracket atom pattern compiles")
});

/// One lexical unit of a SMILES string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Atom(&'a str),
    Bond(&'a str),
    Ring(&'a str),
    BranchOpen,
    BranchClose,
    Dot,
}

/// Split `smiles` into tokens and check that they form a well-shaped string.
///
/// # Errors
/// Returns [`EncodeError::Parse`] for unknown characters, misplaced bonds,
/// unbalanced branches, unpaired ring closures or an atom-free string.
pub fn tokenize(smiles: &str) -> Result<Vec<Token<'_>>, EncodeError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    for m in TOKEN.find_iter(smiles) {
        if m.start() != pos {
            return Err(unexpected(smiles, pos));
        }
        pos = m.end();
        let text = m.as_str();
        let token = match text {
            "(" => Token::BranchOpen,
            ")" => Token::BranchClose,
            "." => Token::Dot,
            "-" | "=" | "#" | "$" | ":" | "/" | "\\" | "~" => Token::Bond(text),
            t if t.starts_with('%') || t.as_bytes()[0].is_ascii_digit() => Token::Ring(text),
            t if t.starts_with('[') => {
                if !BRACKET_ATOM.is_match(t) {
                    return Err(EncodeError::Parse(format!("bad bracket atom {t} in {smiles:?}")));
                }
                Token::Atom(text)
            }
            _ => Token::Atom(text),
        };
        tokens.push(token);
    }
    if pos != smiles.len() {
        return Err(unexpected(smiles, pos));
    }
    check_structure(smiles, &tokens)?;
    Ok(tokens)
}

fn unexpected(smiles: &str, pos: usize) -> EncodeError {
    EncodeError::Parse(format!("unexpected character at offset {pos} in {smiles:?}"))
}

fn check_structure(smiles: &str, tokens: &[Token<'_>]) -> Result<(), EncodeError> {
    let fail = |what: &str| Err(EncodeError::Parse(format!("{what} in {smiles:?}")));

    let mut depth = 0usize;
    let mut open_rings: HashSet<&str> = HashSet::new();
    let mut atoms = 0usize;
    let mut prev: Option<Token<'_>> = None;

    for &token in tokens {
        let ok = match token {
            Token::Atom(_) => {
                atoms += 1;
                true
            }
            Token::Bond(_) => matches!(
                prev,
                Some(Token::Atom(_) | Token::Ring(_) | Token::BranchOpen | Token::BranchClose)
            ),
            Token::Ring(label) => {
                if !open_rings.remove(label) {
                    open_rings.insert(label);
                }
                matches!(prev, Some(Token::Atom(_) | Token::Ring(_) | Token::Bond(_)))
            }
            Token::BranchOpen => {
                depth += 1;
                matches!(prev, Some(Token::Atom(_) | Token::Ring(_) | Token::BranchClose))
            }
            Token::BranchClose => {
                if depth == 0 {
                    return fail("unbalanced ')'");
                }
                depth -= 1;
                matches!(prev, Some(Token::Atom(_) | Token::Ring(_) | Token::BranchClose))
            }
            Token::Dot => {
                matches!(prev, Some(Token::Atom(_) | Token::Ring(_) | Token::BranchClose))
            }
        };
        if !ok {
            return fail("misplaced token");
        }
        prev = Some(token);
    }

    if atoms == 0 {
        return fail("no atoms");
    }
    if depth != 0 {
        return fail("unclosed branch");
    }
    if !open_rings.is_empty() {
        return fail("unclosed ring bond");
    }
    if !matches!(prev, Some(Token::Atom(_) | Token::Ring(_) | Token::BranchClose)) {
        return fail("dangling token at end");
    }
    Ok(())
}

/// Hashed SMILES-token n-gram fingerprint.
#[derive(Debug, Clone)]
pub struct TokenFingerprinter {
    length: usize,
    max_ngram: usize,
}

impl Default for TokenFingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl TokenFingerprinter {
    /// Create a fingerprinter producing vectors of `length` (at least 1).
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
            max_ngram: DEFAULT_MAX_NGRAM,
        }
    }

    /// Set the longest token n-gram folded into the vector (at least 1).
    #[must_use]
    pub fn with_max_ngram(mut self, max_ngram: usize) -> Self {
        self.max_ngram = max_ngram.max(1);
        self
    }

    fn bucket(&self, gram: &[&str]) -> usize {
        let mut hasher = Sha256::new();
        for part in gram {
            hasher.update(part.as_bytes());
            hasher.update([0x1f_u8]);
        }
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(word) % self.length as u64) as usize
    }
}

impl Encoder for TokenFingerprinter {
    fn len(&self) -> usize {
        self.length
    }

    fn encode(&self, descriptor: &str) -> Result<FixedVector, EncodeError> {
        let tokens = tokenize(descriptor)?;
        let mut counts = vec![0i8; self.length];

        // n-grams never span a '.' fragment boundary
        let mut fragment: Vec<&str> = Vec::new();
        let mut fragments: Vec<Vec<&str>> = Vec::new();
        for token in tokens {
            match token {
                Token::Atom(t) | Token::Bond(t) => fragment.push(t),
                Token::Dot => fragments.push(std::mem::take(&mut fragment)),
                Token::Ring(_) | Token::BranchOpen | Token::BranchClose => {}
            }
        }
        fragments.push(fragment);

        for seq in &fragments {
            for n in 1..=self.max_ngram.min(seq.len()) {
                for gram in seq.windows(n) {
                    let slot = &mut counts[self.bucket(gram)];
                    *slot = slot.saturating_add(1);
                }
            }
        }
        Ok(counts)
    }

    fn is_valid(&self, descriptor: &str) -> bool {
        tokenize(descriptor).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_smiles() {
        for smi in [
            "CCO",
            "CCN",
            "c1ccccc1",
            "CC(=O)Oc1ccccc1C(=O)O",
            "[Na+].[Cl-]",
            "C1CC2CCC1C2",
            "F/C=C/F",
            "C%10CCCCC%10",
            "[13CH4]",
        ] {
            assert!(tokenize(smi).is_ok(), "{smi} should tokenize");
        }
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in [
            "", "1", "id", "smiles", "INVALID", "C(", "C)", "C()", "=C", "C=", "C1CC", ".C",
            "C..C", "[]", "C C",
        ] {
            assert!(tokenize(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn encoding_is_deterministic_and_fixed_width() {
        let fp = TokenFingerprinter::new(256);
        let a = fp.encode("CC(=O)O").unwrap();
        let b = fp.encode("CC(=O)O").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        assert!(a.iter().any(|&c| c > 0));
        assert_ne!(a, fp.encode("CCN").unwrap());
    }

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        let fp = TokenFingerprinter::new(1).with_max_ngram(1);
        let long = "C".repeat(300);
        let v = fp.encode(&long).unwrap();
        assert_eq!(v, vec![i8::MAX]);
    }
}
