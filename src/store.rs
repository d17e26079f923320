//! Test vectors accumulated by the attack.

use log::debug;

use crate::cnf::{Cnf, SatLit};
use crate::design::LockedDesign;

/// An input assignment and the oracle's response to it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TestVector {
    pub inputs: Vec<bool>,
    pub outputs: Vec<bool>,
}

fn const_lits(bits: &[bool]) -> Vec<SatLit> {
    bits.iter().map(|&b| SatLit::from(b)).collect()
}

/// Append-only collection of test vectors.
#[derive(Debug, Clone, Default)]
pub struct ConstraintStore {
    vectors: Vec<TestVector>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[TestVector] {
        &self.vectors
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    pub fn push(&mut self, vector: TestVector) {
        self.vectors.push(vector);
    }

    /// Queries the oracle on `inputs` and stores the result.
    pub fn add_queried(&mut self, design: &LockedDesign, inputs: Vec<bool>) {
        assert_eq!(inputs.len(), design.nb_inputs(), "Wrong number of inputs");
        let outputs = design.call_oracle(&inputs);
        self.vectors.push(TestVector { inputs, outputs });
    }

    /// Index of the first vector that `key` fails, if any.
    pub fn first_failing(&self, design: &LockedDesign, key: &[bool]) -> Option<usize> {
        assert_eq!(key.len(), design.nb_key_bits(), "Wrong number of key bits");
        self.vectors
            .iter()
            .position(|tv| design.call_design(&tv.inputs, key) != tv.outputs)
    }

    pub fn key_passes_tests(&self, design: &LockedDesign, key: &[bool]) -> bool {
        self.first_failing(design, key).is_none()
    }

    /// Constrains `key_lits` to reproduce every stored vector.
    ///
    /// The whole circuit is encoded again for each vector, with the inputs
    /// pinned to constants and only the key left symbolic.
    pub fn force_key_correct(&self, design: &LockedDesign, cnf: &mut Cnf, key_lits: &[SatLit]) {
        let clauses_before = cnf.num_clauses();
        for tv in self.vectors.iter() {
            let input_lits = const_lits(&tv.inputs);
            let expected = const_lits(&tv.outputs);
            let outputs = design.encode_outputs(cnf, &input_lits, key_lits);
            cnf.assume_eq(&outputs, &expected);
        }
        debug!(
            "force_key_correct: {} vectors, {} new clauses",
            self.vectors.len(),
            cnf.num_clauses() - clauses_before
        );
    }
}
