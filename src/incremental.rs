//! Incremental "what-if" simulation of single toggles.
//!
//! The simulator keeps a baseline state (one word per variable). Toggling a
//! variable only re-evaluates its transitive fanout, visited through a worklist
//! ordered by ascending variable index. Since fanins always have smaller
//! indices than their consumers, every touched node is recomputed at most once
//! per probe and always after all of its fanins.
//!
//! ```
//! use locksmith::aig::Aig;
//! use locksmith::incremental::IncrementalSim;
//!
//! let mut aig = Aig::new(2);
//! let f = aig.add_and(aig.input(0), aig.input(1));
//! aig.add_output(f);
//!
//! let mut sim = IncrementalSim::new(&aig);
//! sim.load(&[u64::MAX, 0]);
//! assert_eq!(sim.output_values(), vec![0]);
//! // Flip the second input: the AND now sees 1 & 1.
//! assert_eq!(sim.simulate_incremental(aig.input(1)), vec![u64::MAX]);
//! // The baseline is untouched.
//! assert_eq!(sim.output_values(), vec![0]);
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::debug;

use crate::aig::{lit_value, Aig};
use crate::lit::Lit;

pub struct IncrementalSim<'a> {
    aig: &'a Aig,
    /// For each variable, the AND nodes reading it.
    fanouts: Vec<Vec<u32>>,
    state: Vec<u64>,
    saved: Vec<u64>,
    toggled: Vec<bool>,
    queued: Vec<bool>,
    is_touched: Vec<bool>,
    touched: Vec<u32>,
    worklist: BinaryHeap<Reverse<u32>>,
}

impl<'a> IncrementalSim<'a> {
    /// Builds the fanout lists of `aig`.
    pub fn new(aig: &'a Aig) -> Self {
        // Baseline is the all-zero input assignment until `load` is called
        let state = aig.simulate_state(&vec![0; aig.num_inputs()]);
        let mut sim = Self {
            aig,
            fanouts: Vec::new(),
            saved: state.clone(),
            state,
            toggled: vec![false; aig.num_vars()],
            queued: vec![false; aig.num_vars()],
            is_touched: vec![false; aig.num_vars()],
            touched: Vec::new(),
            worklist: BinaryHeap::new(),
        };
        sim.setup_incremental();
        sim
    }

    /// (Re)computes the fanout lists.
    pub fn setup_incremental(&mut self) {
        let mut fanouts = vec![Vec::new(); self.aig.num_vars()];
        let first = self.aig.first_node_var();
        for (i, node) in self.aig.nodes().iter().enumerate() {
            let var = (first + i) as u32;
            fanouts[node.a.index()].push(var);
            if node.b.var() != node.a.var() {
                fanouts[node.b.index()].push(var);
            }
        }
        debug!(
            "setup_incremental: {} fanout edges over {} variables",
            fanouts.iter().map(Vec::len).sum::<usize>(),
            fanouts.len()
        );
        self.fanouts = fanouts;
    }

    pub fn fanouts(&self, var: usize) -> &[u32] {
        &self.fanouts[var]
    }

    /// Runs a full simulation and makes it the baseline.
    pub fn load(&mut self, inputs: &[u64]) {
        self.state = self.aig.simulate_state(inputs);
        self.copy_incremental_state();
    }

    /// Snapshots the current state as the baseline that probes return to.
    pub fn copy_incremental_state(&mut self) {
        assert!(self.touched.is_empty(), "Cannot snapshot in the middle of a probe");
        self.saved.clone_from(&self.state);
    }

    /// Inverts `lit`'s variable for the current probe and propagates the change.
    ///
    /// # Panics
    ///
    /// Panics on a constant, or on a variable already toggled in this probe.
    pub fn toggle(&mut self, lit: Lit) {
        assert!(!lit.is_const(), "Cannot toggle a constant");
        let var = lit.index();
        assert!(!self.toggled[var], "Variable x{} toggled twice", var);
        self.toggled[var] = true;
        self.state[var] ^= u64::MAX;
        self.touch(var);
        self.enqueue_fanouts(var);
        self.propagate();
    }

    fn touch(&mut self, var: usize) {
        if !self.is_touched[var] {
            self.is_touched[var] = true;
            self.touched.push(var as u32);
        }
    }

    fn enqueue_fanouts(&mut self, var: usize) {
        for i in 0..self.fanouts[var].len() {
            let out = self.fanouts[var][i];
            if !self.queued[out as usize] {
                self.queued[out as usize] = true;
                self.worklist.push(Reverse(out));
            }
        }
    }

    fn propagate(&mut self) {
        while let Some(Reverse(var)) = self.worklist.pop() {
            let var = var as usize;
            self.queued[var] = false;
            let node = self.aig.fanins(var);
            let mut value = lit_value(&self.state, node.a) & lit_value(&self.state, node.b);
            if self.toggled[var] {
                value = !value;
            }
            if value != self.state[var] {
                self.state[var] = value;
                self.touch(var);
                self.enqueue_fanouts(var);
            }
        }
    }

    pub fn value(&self, lit: Lit) -> u64 {
        lit_value(&self.state, lit)
    }

    /// Changes an input in the baseline so that `lit` reads `word`, and
    /// propagates the change to its fanout.
    pub fn set_value(&mut self, lit: Lit, word: u64) {
        assert!(self.aig.is_input_var(lit.index()), "Only inputs can be set, got {}", lit);
        assert!(self.touched.is_empty(), "Cannot set a value in the middle of a probe");
        let var = lit.index();
        self.state[var] = word ^ lit.mask();
        self.touch(var);
        self.enqueue_fanouts(var);
        self.propagate();
        for &var in self.touched.iter() {
            let var = var as usize;
            self.saved[var] = self.state[var];
            self.is_touched[var] = false;
        }
        self.touched.clear();
    }

    pub fn state(&self) -> &[u64] {
        &self.state
    }

    pub fn output_values(&self) -> Vec<u64> {
        self.aig.output_values(&self.state)
    }

    /// Number of variables whose value differs from the baseline in this probe.
    pub fn num_touched(&self) -> usize {
        self.touched.len()
    }

    /// Restores every touched variable from the baseline and clears the toggles.
    pub fn reset_incremental_state(&mut self) {
        for &var in self.touched.iter() {
            let var = var as usize;
            self.state[var] = self.saved[var];
            self.toggled[var] = false;
            self.is_touched[var] = false;
        }
        self.touched.clear();
    }

    /// Single "what-if" probe: toggle `lit`, read the outputs, restore the baseline.
    pub fn simulate_incremental(&mut self, lit: Lit) -> Vec<u64> {
        self.toggle(lit);
        let outputs = self.output_values();
        self.reset_incremental_state();
        outputs
    }
}
