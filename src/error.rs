use thiserror::Error;

/// Error returned when an attack cannot be set up or must be aborted.
///
/// Protocol outcomes (no key consistent with the test vectors, key proven
/// correct, ...) are not errors, see [`AttackOutcome`][crate::attack::AttackOutcome].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttackError {
    /// The expected key does not cover every bit of the key port.
    #[error("given key has {given} bits, but the design has {expected} key bits")]
    KeyLength { given: usize, expected: usize },

    /// No input of the design belongs to the key port.
    #[error("could not find key port {0}")]
    MissingKeyPort(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The solver ran out of time; unlike UNSAT, this says nothing about the keys.
    #[error("timeout during the {query} after {limit:?} s")]
    Timeout { query: &'static str, limit: Option<f64> },

    #[error("solver failure during the {query}: {message}")]
    Solver { query: &'static str, message: String },

    /// The expected key does not reproduce its own oracle outputs.
    #[error("the expected key does not pass test vector {vector}: the design model is broken")]
    OracleMismatch { vector: usize },

    /// The proven key fails the accumulated test vectors.
    #[error("found key does not pass the test vectors")]
    Revalidation,

    /// The clause translation disagrees with simulation.
    #[error("SAT translation differs from simulation at variable x{var}")]
    TranslationMismatch { var: usize },

    /// The clause translation has no model for pinned inputs and key.
    #[error("SAT translation is unsatisfiable for the given inputs and key")]
    TranslationUnsat,

    #[error("<{0}> is not a proper hexadecimal character")]
    Hex(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = AttackError::KeyLength { given: 3, expected: 8 };
        assert_eq!(e.to_string(), "given key has 3 bits, but the design has 8 key bits");

        let e = AttackError::Timeout {
            query: "DI query",
            limit: Some(2.0),
        };
        assert_eq!(e.to_string(), "timeout during the DI query after Some(2.0) s");

        assert_eq!(
            AttackError::TranslationUnsat.to_string(),
            "SAT translation is unsatisfiable for the given inputs and key"
        );
        assert_ne!(AttackError::TranslationUnsat, AttackError::TranslationMismatch { var: 0 });

        assert_eq!(
            AttackError::Hex('g').to_string(),
            "<g> is not a proper hexadecimal character"
        );
    }
}
