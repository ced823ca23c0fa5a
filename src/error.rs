//! Validation errors shared by the predictor and the optimizer.
//!
//! All of these are detected before any algorithmic work starts; the core
//! never returns partial results alongside an error.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The sequence contains a symbol outside the A/C/G/T/N alphabet.
    InvalidAlphabet { position: usize, symbol: u8 },
    /// A threshold or parameter is outside its valid domain.
    InvalidParameter(String),
    /// `candidates` and `scores` disagree in length.
    LengthMismatch { candidates: usize, scores: usize },
    /// A structure violates the segment ordering/nesting invariants.
    MalformedStructure(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidAlphabet { position, symbol } => write!(
                f,
                "Unsupported symbol {:?} at position {}; expected A, C, G, T or N",
                *symbol as char, position
            ),
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::LengthMismatch { candidates, scores } => write!(
                f,
                "Candidates/scores length mismatch: {} candidates vs {} scores",
                candidates, scores
            ),
            Error::MalformedStructure(msg) => write!(f, "Malformed structure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
