//! SAT attack controller.
//!
//! Both protocols share the same building blocks:
//!
//! - **Init** ([`SatAttack::run_prologue`]): draw random test vectors from the
//!   oracle, check that the correct key passes them, and find a first
//!   candidate key.
//! - **Search** ([`SatAttack::find_new_valid_key`]): find any key consistent
//!   with every stored test vector.
//! - **Refine**: query the oracle on a distinguishing input and store the
//!   result.
//!
//! They differ in the distinguishing-input query and in when they stop:
//!
//! - The exact attack ([`SatAttack::run_sat`]) asks for an input on which some
//!   consistent key disagrees with the current best key
//!   ([`SatAttack::find_di_from_best_key`]). Once none exists, the best key is
//!   provably functionally correct.
//! - AppSAT ([`SatAttack::run_app_sat`]) asks for an input on which two
//!   consistent keys disagree ([`SatAttack::find_di`]), and periodically
//!   measures the error rate of its best key on random inputs. It stops once
//!   the error stays below a threshold for a number of consecutive
//!   measurements.
//!
//! Every query builds a fresh [`Cnf`] and solver; the only state carried from
//! one round to the next is the [`ConstraintStore`] and the best key.
//!
//! Randomness is always passed in by the caller, so a run is reproducible from
//! its seed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::{debug, error, info, warn};
use rand::Rng;

use crate::cnf::{Cnf, Model, SatLit, SolveError, Solution};
use crate::config::{AppSatParams, AttackConfig, AttackMode};
use crate::design::LockedDesign;
use crate::error::AttackError;
use crate::store::{ConstraintStore, TestVector};
use crate::utils::{key_space, key_to_hex};

const KEY_SEARCH: &str = "key search";
const DI_QUERY: &str = "DI query";

/// How an attack run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttackOutcome {
    /// The key is proven functionally equivalent to the correct one.
    Unlocked { key: Vec<bool> },
    /// The key's measured error stayed below the threshold.
    ApproximatelyUnlocked { key: Vec<bool>, error: f64 },
    /// No key is consistent with the test vectors.
    NoValidKey,
}

impl AttackOutcome {
    pub fn key(&self) -> Option<&[bool]> {
        match self {
            AttackOutcome::Unlocked { key } => Some(key),
            AttackOutcome::ApproximatelyUnlocked { key, .. } => Some(key),
            AttackOutcome::NoValidKey => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.key().is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttackStats {
    /// Distinguishing inputs found.
    pub di_rounds: usize,
    /// Error measurements (AppSAT only).
    pub measurements: usize,
    pub solver_calls: usize,
    /// Test vectors added by error measurements.
    pub random_constraints: usize,
    pub last_error: Option<f64>,
}

/// A distinguishing input against a fixed reference key.
#[derive(Debug, Clone, PartialEq)]
pub struct Dip {
    pub inputs: Vec<bool>,
    pub key: Vec<bool>,
}

/// A distinguishing input between two consistent keys.
#[derive(Debug, Clone, PartialEq)]
pub struct DipPair {
    pub inputs: Vec<bool>,
    pub key1: Vec<bool>,
    pub key2: Vec<bool>,
}

pub struct SatAttack<'a> {
    design: &'a LockedDesign,
    store: ConstraintStore,
    best_key: Option<Vec<bool>>,
    time_limit: Option<f64>,
    cnf_file: Option<PathBuf>,
    stats: AttackStats,
}

impl<'a> SatAttack<'a> {
    pub fn new(design: &'a LockedDesign) -> Self {
        Self {
            design,
            store: ConstraintStore::new(),
            best_key: None,
            time_limit: None,
            cnf_file: None,
            stats: AttackStats::default(),
        }
    }

    /// Per-query solver time limit, in seconds.
    pub fn set_time_limit(&mut self, time_limit: Option<f64>) {
        self.time_limit = time_limit;
    }

    /// Dumps every key-search CNF to this file (overwritten on each query).
    pub fn set_cnf_file(&mut self, path: Option<PathBuf>) {
        self.cnf_file = path;
    }

    pub fn design(&self) -> &LockedDesign {
        self.design
    }

    pub fn store(&self) -> &ConstraintStore {
        &self.store
    }

    pub fn best_key(&self) -> Option<&[bool]> {
        self.best_key.as_deref()
    }

    pub fn stats(&self) -> &AttackStats {
        &self.stats
    }

    pub fn nb_inputs(&self) -> usize {
        self.design.nb_inputs()
    }

    pub fn nb_key_bits(&self) -> usize {
        self.design.nb_key_bits()
    }

    pub fn nb_outputs(&self) -> usize {
        self.design.nb_outputs()
    }

    pub fn nb_test_vectors(&self) -> usize {
        self.store.len()
    }

    /// Runs the protocol selected by `config`.
    pub fn run(&mut self, config: &AttackConfig, rng: &mut impl Rng) -> Result<AttackOutcome, AttackError> {
        config.validate()?;
        self.set_time_limit(config.time_limit);
        self.set_cnf_file(config.cnf_file.clone());
        match config.mode() {
            AttackMode::Exact => self.run_sat(config.nb_initial_vectors, rng),
            AttackMode::Approximate(params) => self.run_app_sat(&params, config.nb_initial_vectors, rng),
        }
    }
}

// Oracle access
impl SatAttack<'_> {
    fn gen_input_vector(&self, rng: &mut impl Rng) -> Vec<bool> {
        (0..self.nb_inputs()).map(|_| rng.gen()).collect()
    }

    /// Removes every test vector and resets the best key.
    pub fn reset(&mut self) {
        self.store.clear();
        self.best_key = None;
        self.stats = AttackStats::default();
    }

    /// Adds a test vector built from `inputs` and the oracle's response.
    pub fn add_test_vector(&mut self, inputs: Vec<bool>) {
        self.store.add_queried(self.design, inputs);
    }
}

// Protocols
impl SatAttack<'_> {
    /// Exact SAT attack.
    pub fn run_sat(&mut self, nb_initial_vectors: usize, rng: &mut impl Rng) -> Result<AttackOutcome, AttackError> {
        info!(
            "Starting SAT attack with {} inputs, {} outputs and {} key bits ({} keys)",
            self.nb_inputs(),
            self.nb_outputs(),
            self.nb_key_bits(),
            key_space(self.nb_key_bits())
        );
        let Some(mut best_key) = self.run_prologue(nb_initial_vectors, rng)? else {
            return Ok(AttackOutcome::NoValidKey);
        };

        loop {
            let Some(dip) = self.find_di_from_best_key(&best_key)? else {
                info!(
                    "Found a key that unlocks the design after {} iterations: {}",
                    self.stats.di_rounds,
                    key_to_hex(&best_key)
                );
                break;
            };
            self.stats.di_rounds += 1;
            info!(
                "Found a differentiating input with key {}",
                key_to_hex(&dip.key)
            );
            self.add_test_vector(dip.inputs);

            let Some(key) = self.find_new_valid_key()? else {
                self.best_key = None;
                warn!("No valid key found with the new test vector, couldn't prove which key unlocks the design");
                return Ok(AttackOutcome::NoValidKey);
            };
            self.best_key = Some(key.clone());
            best_key = key;
        }

        if !self.store.key_passes_tests(self.design, &best_key) {
            error!("Found key does not pass the test vectors");
            return Err(AttackError::Revalidation);
        }
        Ok(AttackOutcome::Unlocked { key: best_key })
    }

    /// Approximate SAT attack.
    pub fn run_app_sat(
        &mut self,
        params: &AppSatParams,
        nb_initial_vectors: usize,
        rng: &mut impl Rng,
    ) -> Result<AttackOutcome, AttackError> {
        params.validate()?;
        info!(
            "Starting approximate SAT attack with {} inputs, {} outputs and {} key bits",
            self.nb_inputs(),
            self.nb_outputs(),
            self.nb_key_bits()
        );
        if self.run_prologue(nb_initial_vectors, rng)?.is_none() {
            return Ok(AttackOutcome::NoValidKey);
        }

        let mut settle = Settle::default();
        loop {
            let Some(dip) = self.find_di()? else {
                // The last DIP may have ruled out the best key; any consistent key is now exact.
                let Some(key) = self.find_new_valid_key()? else {
                    return Ok(AttackOutcome::NoValidKey);
                };
                self.best_key = Some(key.clone());
                info!(
                    "Found a key that unlocks the design after {} iterations: {}",
                    self.stats.di_rounds,
                    key_to_hex(&key)
                );
                return Ok(AttackOutcome::Unlocked { key });
            };
            info!(
                "Found a differentiating input between two keys: {} and {}",
                key_to_hex(&dip.key1),
                key_to_hex(&dip.key2)
            );
            self.best_key = Some(dip.key1);
            self.add_test_vector(dip.inputs);
            self.stats.di_rounds += 1;
            if self.stats.di_rounds % params.nb_di_queries != 0 {
                continue;
            }

            // By default, at most double the number of constraints
            let max_constraints = params.max_constraints.unwrap_or(self.nb_test_vectors());
            let error = self.measure_error_and_constrain(params.nb_random_vectors, max_constraints, rng);
            if settle.record(error, params) {
                let key = self.best_key.clone().unwrap_or_default();
                info!(
                    "Found a key that approximately unlocks the design after {} iterations, {:.1}% error on {} test vectors: {}",
                    self.stats.di_rounds,
                    100.0 * error,
                    params.nb_random_vectors,
                    key_to_hex(&key)
                );
                return Ok(AttackOutcome::ApproximatelyUnlocked { key, error });
            }
        }
    }

    /// Generates the initial test vectors, checks them against the correct key
    /// and finds a first candidate key.
    ///
    /// Returns `None` if no key is consistent with the initial vectors.
    pub fn run_prologue(
        &mut self,
        nb_initial_vectors: usize,
        rng: &mut impl Rng,
    ) -> Result<Option<Vec<bool>>, AttackError> {
        self.reset();
        for _ in 0..nb_initial_vectors {
            let inputs = self.gen_input_vector(rng);
            self.add_test_vector(inputs);
        }
        if let Some(vector) = self.store.first_failing(self.design, self.design.expected_key()) {
            error!("The expected locking key does not pass the random test vectors: there must be a bug");
            return Err(AttackError::OracleMismatch { vector });
        }

        let key = self.find_new_valid_key()?;
        match &key {
            Some(key) => info!(
                "Found a candidate key for the {} initial test vectors: {}",
                nb_initial_vectors,
                key_to_hex(key)
            ),
            None => info!("No valid key found for the {} initial test vectors", nb_initial_vectors),
        }
        self.best_key = key.clone();
        Ok(key)
    }

    /// Measures the error rate of the best key on fresh random inputs; failing
    /// inputs are added as test vectors, at most `max_constraints` of them.
    pub fn measure_error_and_constrain(
        &mut self,
        nb_random_vectors: usize,
        max_constraints: usize,
        rng: &mut impl Rng,
    ) -> f64 {
        let Some(best_key) = self.best_key.clone() else {
            warn!("No candidate key to measure");
            return 1.0;
        };
        let mut nb_errors = 0;
        for _ in 0..nb_random_vectors {
            let inputs = self.gen_input_vector(rng);
            let expected = self.design.call_oracle(&inputs);
            let outputs = self.design.call_design(&inputs, &best_key);
            if outputs != expected {
                nb_errors += 1;
                if nb_errors <= max_constraints {
                    self.store.push(TestVector {
                        inputs,
                        outputs: expected,
                    });
                    self.stats.random_constraints += 1;
                }
            }
        }
        let error = if nb_random_vectors == 0 {
            0.0
        } else {
            nb_errors as f64 / nb_random_vectors as f64
        };
        self.stats.measurements += 1;
        self.stats.last_error = Some(error);
        info!(
            "Measured error {:.3}%: {} out of {} test vectors",
            100.0 * error,
            nb_errors,
            nb_random_vectors
        );
        error
    }

    /// Tries every key against the stored test vectors; keeps the last one that passes.
    pub fn run_brute_force(&mut self) -> Result<Option<Vec<bool>>, AttackError> {
        let n = self.nb_key_bits();
        if n >= 32 {
            return Err(AttackError::InvalidConfig(format!(
                "cannot run brute force attack on {} key bits",
                n
            )));
        }
        let mut found = None;
        for i in 0..(1u64 << n) {
            let key: Vec<bool> = (0..n).map(|j| (i >> j) & 1 != 0).collect();
            if self.store.key_passes_tests(self.design, &key) {
                found = Some(key);
            }
        }
        if found.is_some() {
            self.best_key = found.clone();
        }
        Ok(found)
    }
}

/// Consecutive error measurements below the AppSAT threshold.
#[derive(Debug, Default)]
struct Settle {
    count: usize,
}

impl Settle {
    /// Records one measurement; true once enough good ones came in a row.
    fn record(&mut self, error: f64, params: &AppSatParams) -> bool {
        if error < params.error_threshold {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= params.settle_threshold
    }
}

// Queries
impl SatAttack<'_> {
    fn solve(&mut self, cnf: &Cnf, query: &'static str) -> Result<Option<Model>, AttackError> {
        self.stats.solver_calls += 1;
        match cnf.solve(self.time_limit) {
            Ok(Solution::Sat(model)) => Ok(Some(model)),
            Ok(Solution::Unsat) => Ok(None),
            Err(SolveError::Timeout) => {
                error!("Timeout while solving the {}", query);
                Err(AttackError::Timeout {
                    query,
                    limit: self.time_limit,
                })
            }
            Err(SolveError::Solver(message)) => Err(AttackError::Solver { query, message }),
        }
    }

    fn dump_cnf(&self, cnf: &Cnf) {
        let Some(path) = &self.cnf_file else {
            return;
        };
        let result = File::create(path).and_then(|file| {
            let mut w = BufWriter::new(file);
            cnf.write_dimacs(&mut w)?;
            w.flush()
        });
        if let Err(e) = result {
            warn!("Could not write CNF to {}: {}", path.display(), e);
        }
    }

    /// Finds a key consistent with every stored test vector.
    pub fn find_new_valid_key(&mut self) -> Result<Option<Vec<bool>>, AttackError> {
        let mut cnf = Cnf::new();
        let key_lits = cnf.new_vars(self.nb_key_bits());
        self.store.force_key_correct(self.design, &mut cnf, &key_lits);
        self.dump_cnf(&cnf);

        let model = self.solve(&cnf, KEY_SEARCH)?;
        Ok(model.map(|m| m.values(&key_lits)))
    }

    /// Finds inputs and a consistent key whose outputs differ from `best_key`'s.
    pub fn find_di_from_best_key(&mut self, best_key: &[bool]) -> Result<Option<Dip>, AttackError> {
        assert_eq!(best_key.len(), self.nb_key_bits(), "Wrong number of key bits");
        let mut cnf = Cnf::new();
        let key_lits = cnf.new_vars(self.nb_key_bits());
        let input_lits = cnf.new_vars(self.nb_inputs());
        let best_key_lits: Vec<SatLit> = best_key.iter().map(|&b| SatLit::from(b)).collect();

        self.store.force_key_correct(self.design, &mut cnf, &key_lits);

        let output1 = self.design.encode_outputs(&mut cnf, &input_lits, &key_lits);
        let output2 = self.design.encode_outputs(&mut cnf, &input_lits, &best_key_lits);
        cnf.assume_ne(&output1, &output2);

        let model = self.solve(&cnf, DI_QUERY)?;
        Ok(model.map(|m| Dip {
            inputs: m.values(&input_lits),
            key: m.values(&key_lits),
        }))
    }

    /// Finds inputs and two consistent keys whose outputs differ.
    pub fn find_di(&mut self) -> Result<Option<DipPair>, AttackError> {
        let mut cnf = Cnf::new();
        let key_lits1 = cnf.new_vars(self.nb_key_bits());
        let key_lits2 = cnf.new_vars(self.nb_key_bits());
        let input_lits = cnf.new_vars(self.nb_inputs());

        self.store.force_key_correct(self.design, &mut cnf, &key_lits1);
        self.store.force_key_correct(self.design, &mut cnf, &key_lits2);

        let output1 = self.design.encode_outputs(&mut cnf, &input_lits, &key_lits1);
        let output2 = self.design.encode_outputs(&mut cnf, &input_lits, &key_lits2);
        cnf.assume_ne(&output1, &output2);

        let model = self.solve(&cnf, DI_QUERY)?;
        Ok(model.map(|m| DipPair {
            inputs: m.values(&input_lits),
            key1: m.values(&key_lits1),
            key2: m.values(&key_lits2),
        }))
    }

    /// Checks that the clause translation reproduces simulation on concrete inputs and key.
    pub fn check_sat_translation(&mut self, inputs: &[bool], key: &[bool]) -> Result<(), AttackError> {
        let design = self.design;
        let aig_inputs = design.wiring().interleave(inputs, key);

        let mut cnf = Cnf::new();
        let input_lits = cnf.new_vars(inputs.len());
        let key_lits = cnf.new_vars(key.len());
        for (&lit, &b) in input_lits.iter().zip(inputs).chain(key_lits.iter().zip(key)) {
            cnf.assume(if b { lit } else { !lit });
        }
        let node_lits = design.encode(&mut cnf, &input_lits, &key_lits);

        let Some(model) = self.solve(&cnf, "translation check")? else {
            error!("SAT translation has no model for the pinned inputs and key");
            return Err(AttackError::TranslationUnsat);
        };
        let words: Vec<u64> = aig_inputs.iter().map(|&b| if b { u64::MAX } else { 0 }).collect();
        let state = design.aig().simulate_state(&words);
        for (var, &lit) in node_lits.iter().enumerate() {
            let expected = state[var] & 1 != 0;
            if model.value(lit) != expected {
                error!("SAT result different from expected at x{}", var);
                return Err(AttackError::TranslationMismatch { var });
            }
        }
        debug!("SAT translation matches simulation on {} variables", node_lits.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use crate::aig::Aig;
    use crate::design::{InputBit, Wiring};

    /// `out0 = (a & b) ^ k0`, `out1 = c ^ k1`.
    fn toy(key: Vec<bool>) -> LockedDesign {
        let mut aig = Aig::new(5);
        let (a, b, c, k0, k1) = (aig.input(0), aig.input(1), aig.input(2), aig.input(3), aig.input(4));
        let ab = aig.add_and(a, b);
        let o0 = aig.add_xor(ab, k0);
        let buf = aig.add_buffer(c);
        let o1 = aig.add_xor(buf, k1);
        aig.add_output(o0);
        aig.add_output(o1);
        let wiring = Wiring::new(vec![
            InputBit::Primary,
            InputBit::Primary,
            InputBit::Primary,
            InputBit::Key(0),
            InputBit::Key(1),
        ])
        .unwrap();
        LockedDesign::new(aig, wiring, key).unwrap()
    }

    #[test]
    fn test_exact_attack_on_toy() {
        let design = toy(vec![true, false]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut attack = SatAttack::new(&design);
        let outcome = attack.run_sat(1, &mut rng).unwrap();
        assert_eq!(outcome, AttackOutcome::Unlocked { key: vec![true, false] });
        assert!(attack.stats().di_rounds <= 4);
        assert!(attack.find_di_from_best_key(&[true, false]).unwrap().is_none());
    }

    #[test]
    fn test_zero_initial_vectors() {
        let design = toy(vec![false, true]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut attack = SatAttack::new(&design);
        let key = attack.run_prologue(0, &mut rng).unwrap();
        assert!(key.is_some());
        let key = key.unwrap();
        let dip = attack.find_di_from_best_key(&key).unwrap().unwrap();
        assert_ne!(design.call_design(&dip.inputs, &dip.key), design.call_design(&dip.inputs, &key));
    }

    #[test]
    fn test_di_pair_disagrees() {
        let design = toy(vec![true, true]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut attack = SatAttack::new(&design);
        attack.run_prologue(0, &mut rng).unwrap();
        let pair = attack.find_di().unwrap().unwrap();
        assert_ne!(
            design.call_design(&pair.inputs, &pair.key1),
            design.call_design(&pair.inputs, &pair.key2)
        );
    }

    #[test]
    fn test_brute_force_agrees_with_sat() {
        let design = toy(vec![false, false]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut attack = SatAttack::new(&design);
        let outcome = attack.run_sat(2, &mut rng).unwrap();
        let brute = attack.run_brute_force().unwrap();
        assert_eq!(outcome.key(), brute.as_deref());
    }

    #[test]
    fn test_translation_check() {
        let design = toy(vec![true, false]);
        let mut attack = SatAttack::new(&design);
        for x in 0..32u32 {
            let inputs = [x & 1 != 0, x & 2 != 0, x & 4 != 0];
            let key = [x & 8 != 0, x & 16 != 0];
            attack.check_sat_translation(&inputs, &key).unwrap();
        }
    }

    #[test]
    fn test_measure_error_caps_constraints() {
        let design = toy(vec![true, true]);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut attack = SatAttack::new(&design);
        attack.reset();
        attack.best_key = Some(vec![false, false]);
        // Key bit 1 is wrong, so out1 is always wrong: every vector fails.
        let error = attack.measure_error_and_constrain(50, 7, &mut rng);
        assert_eq!(error, 1.0);
        assert_eq!(attack.nb_test_vectors(), 7);
        assert_eq!(attack.stats().last_error, Some(1.0));
    }

    #[test]
    fn test_run_rejects_bad_config() {
        let design = toy(vec![true, true]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut attack = SatAttack::new(&design);
        let config = AttackConfig {
            error_threshold: 0.1,
            nb_di_queries: 0,
            ..Default::default()
        };
        assert!(matches!(
            attack.run(&config, &mut rng),
            Err(AttackError::InvalidConfig(_))
        ));
        assert_eq!(attack.nb_test_vectors(), 0);
    }

    #[test]
    fn test_settle_resets_on_a_bad_measurement() {
        let params = AppSatParams {
            error_threshold: 0.1,
            nb_di_queries: 1,
            nb_random_vectors: 100,
            settle_threshold: 3,
            max_constraints: None,
        };
        let mut settle = Settle::default();
        let errors = [0.0, 0.05, 0.1, 0.02, 0.0];
        let settled: Vec<bool> = errors.iter().map(|&e| settle.record(e, &params)).collect();
        // An error equal to the threshold is not below it.
        assert_eq!(settled, vec![false, false, false, false, false]);
        assert!(settle.record(0.09, &params));
        assert!(!settle.record(0.5, &params));
        assert_eq!(settle.count, 0);
    }

    #[test]
    fn test_app_sat_rejects_bad_params() {
        let design = toy(vec![true, true]);
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut attack = SatAttack::new(&design);
        let params = AppSatParams {
            error_threshold: 0.1,
            nb_di_queries: 1,
            nb_random_vectors: 0,
            settle_threshold: 1,
            max_constraints: None,
        };
        // Without random vectors every measurement would read as zero error.
        assert!(matches!(
            attack.run_app_sat(&params, 4, &mut rng),
            Err(AttackError::InvalidConfig(_))
        ));
        assert_eq!(attack.stats().measurements, 0);
        assert_eq!(attack.nb_test_vectors(), 0);
    }
}
