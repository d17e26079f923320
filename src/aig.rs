//! And-Inverter Graph used as the structural model of a locked circuit.
//!
//! The graph is a dense, append-only arena of two-input AND nodes.
//! Inversions live on the edges, as the polarity bit of a [`Lit`].
//!
//! # Variable layout
//!
//! ```text
//! 0                      constant (Lit::zero() / Lit::one())
//! 1 ..= num_inputs       inputs
//! num_inputs + 1 ..      AND nodes, in creation order
//! ```
//!
//! A node may only reference variables with a strictly smaller index,
//! so the arena is always topologically sorted and simulation is a single
//! forward sweep.
//!
//! # Simulation
//!
//! Simulation is word-parallel: every variable carries a `u64`, so 64
//! independent input assignments ("lanes") are evaluated at once.
//!
//! ```
//! use locksmith::aig::Aig;
//!
//! let mut aig = Aig::new(2);
//! let a = aig.input(0);
//! let b = aig.input(1);
//! let f = aig.add_xor(a, b);
//! aig.add_output(f);
//!
//! let out = aig.simulate(&[0b0011, 0b0101]);
//! assert_eq!(out[0] & 0b1111, 0b0110);
//! ```

use log::debug;

use crate::lit::Lit;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AndNode {
    pub a: Lit,
    pub b: Lit,
}

#[derive(Debug, Clone, Default)]
pub struct Aig {
    num_inputs: usize,
    nodes: Vec<AndNode>,
    outputs: Vec<Lit>,
}

impl Aig {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            num_inputs,
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

// Getters
impl Aig {
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Total number of variables, including the constant.
    pub fn num_vars(&self) -> usize {
        1 + self.num_inputs + self.nodes.len()
    }

    pub fn input(&self, index: usize) -> Lit {
        assert!(index < self.num_inputs, "Input {} out of range", index);
        Lit::from_var((index + 1) as u32)
    }

    pub fn nodes(&self) -> &[AndNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> AndNode {
        self.nodes[index]
    }

    pub fn outputs(&self) -> &[Lit] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Lit {
        self.outputs[index]
    }

    /// Variable index of the first AND node.
    pub fn first_node_var(&self) -> usize {
        self.num_inputs + 1
    }

    pub fn is_input_var(&self, var: usize) -> bool {
        var >= 1 && var <= self.num_inputs
    }

    pub fn is_node_var(&self, var: usize) -> bool {
        var >= self.first_node_var() && var < self.num_vars()
    }

    /// Fanins of the AND node with variable index `var`.
    pub fn fanins(&self, var: usize) -> AndNode {
        assert!(self.is_node_var(var), "Variable {} is not an AND node", var);
        self.nodes[var - self.first_node_var()]
    }
}

// Construction
impl Aig {
    /// Creates a new AND node and returns its (positive) output literal.
    pub fn add_and(&mut self, a: Lit, b: Lit) -> Lit {
        let var = self.num_vars();
        assert!(
            a.index() < var && b.index() < var,
            "Fanins {} and {} must precede node x{}",
            a,
            b,
            var
        );
        self.nodes.push(AndNode { a, b });
        Lit::from_var(var as u32)
    }

    pub fn add_nand(&mut self, a: Lit, b: Lit) -> Lit {
        !self.add_and(a, b)
    }

    pub fn add_nor(&mut self, a: Lit, b: Lit) -> Lit {
        self.add_and(!a, !b)
    }

    pub fn add_or(&mut self, a: Lit, b: Lit) -> Lit {
        !self.add_nor(a, b)
    }

    pub fn add_xor(&mut self, a: Lit, b: Lit) -> Lit {
        let x = self.add_and(a, !b);
        let y = self.add_and(!a, b);
        self.add_or(x, y)
    }

    pub fn add_xnor(&mut self, a: Lit, b: Lit) -> Lit {
        !self.add_xor(a, b)
    }

    /// `s ? b : a`
    pub fn add_mux(&mut self, s: Lit, a: Lit, b: Lit) -> Lit {
        let x = self.add_and(!s, a);
        let y = self.add_and(s, b);
        self.add_or(x, y)
    }

    /// Non-synonymous buffer: a fresh node carrying the value of `a`.
    pub fn add_buffer(&mut self, a: Lit) -> Lit {
        self.add_and(a, a)
    }

    /// Non-synonymous inverter: a fresh node carrying the value of `!a`.
    pub fn add_not(&mut self, a: Lit) -> Lit {
        !self.add_and(a, a)
    }

    pub fn add_output(&mut self, lit: Lit) {
        assert!(
            lit.index() < self.num_vars(),
            "Output {} references an unknown variable",
            lit
        );
        self.outputs.push(lit);
    }

    /// Asserts the structural invariants: every fanin and every output
    /// references an existing variable created before its consumer.
    pub fn check(&self) {
        for (i, node) in self.nodes.iter().enumerate() {
            let var = self.first_node_var() + i;
            assert!(node.a.index() < var, "Node x{} has a forward fanin {}", var, node.a);
            assert!(node.b.index() < var, "Node x{} has a forward fanin {}", var, node.b);
        }
        for &out in self.outputs.iter() {
            assert!(out.index() < self.num_vars(), "Dangling output {}", out);
        }
    }
}

/// Value of a literal in a per-variable simulation state.
pub fn lit_value(state: &[u64], lit: Lit) -> u64 {
    state[lit.index()] ^ lit.mask()
}

// Simulation
impl Aig {
    /// Simulates 64 lanes at once and returns the whole per-variable state.
    pub fn simulate_state(&self, inputs: &[u64]) -> Vec<u64> {
        assert_eq!(inputs.len(), self.num_inputs, "Wrong number of input words");
        let mut state = Vec::with_capacity(self.num_vars());
        state.push(0);
        state.extend_from_slice(inputs);
        for node in self.nodes.iter() {
            let value = lit_value(&state, node.a) & lit_value(&state, node.b);
            state.push(value);
        }
        state
    }

    /// Simulates 64 lanes at once and returns one word per output.
    pub fn simulate(&self, inputs: &[u64]) -> Vec<u64> {
        let state = self.simulate_state(inputs);
        self.output_values(&state)
    }

    /// Simulation with some variables inverted, as a key gate would do.
    ///
    /// # Panics
    ///
    /// Panics if a toggled literal is a constant, or if the same variable is toggled twice.
    pub fn simulate_with_toggling(&self, inputs: &[u64], toggling: &[Lit]) -> Vec<u64> {
        assert_eq!(inputs.len(), self.num_inputs, "Wrong number of input words");
        let mut toggles = vec![0u64; self.num_vars()];
        for &t in toggling {
            assert!(!t.is_const(), "Cannot toggle a constant");
            assert_eq!(toggles[t.index()], 0, "Variable x{} toggled twice", t.var());
            toggles[t.index()] = u64::MAX;
        }
        debug!("simulate_with_toggling: {} toggled variables", toggling.len());

        let mut state = Vec::with_capacity(self.num_vars());
        state.push(0);
        for (i, &word) in inputs.iter().enumerate() {
            state.push(word ^ toggles[i + 1]);
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let var = self.first_node_var() + i;
            let value = lit_value(&state, node.a) & lit_value(&state, node.b);
            state.push(value ^ toggles[var]);
        }
        self.output_values(&state)
    }

    pub fn output_values(&self, state: &[u64]) -> Vec<u64> {
        self.outputs.iter().map(|&out| lit_value(state, out)).collect()
    }

    /// Evaluates a single input assignment.
    pub fn evaluate(&self, inputs: &[bool]) -> Vec<bool> {
        let words: Vec<u64> = inputs.iter().map(|&b| if b { u64::MAX } else { 0 }).collect();
        self.simulate(&words).into_iter().map(|w| w & 1 != 0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn full_adder() -> Aig {
        let mut aig = Aig::new(3);
        let a = aig.input(0);
        let b = aig.input(1);
        let c = aig.input(2);
        let ab = aig.add_xor(a, b);
        let sum = aig.add_xor(ab, c);
        let g = aig.add_and(a, b);
        let p = aig.add_and(ab, c);
        let carry = aig.add_or(g, p);
        aig.add_output(sum);
        aig.add_output(carry);
        aig
    }

    #[test]
    fn test_layout() {
        let mut aig = Aig::new(2);
        assert_eq!(aig.num_vars(), 3);
        assert_eq!(aig.input(0), Lit::from_var(1));
        assert_eq!(aig.input(1), Lit::from_var(2));
        let f = aig.add_and(aig.input(0), aig.input(1));
        assert_eq!(f, Lit::from_var(3));
        assert!(aig.is_input_var(2));
        assert!(aig.is_node_var(3));
        assert!(!aig.is_node_var(4));
        assert_eq!(aig.fanins(3), AndNode { a: aig.input(0), b: aig.input(1) });
        aig.check();
    }

    #[test]
    #[should_panic(expected = "must precede")]
    fn test_forward_fanin_panics() {
        let mut aig = Aig::new(1);
        aig.add_and(aig.input(0), Lit::from_var(5));
    }

    #[test]
    fn test_full_adder_truth_table() {
        let aig = full_adder();
        for x in 0..8u32 {
            let bits = [x & 1 != 0, x & 2 != 0, x & 4 != 0];
            let total = bits.iter().filter(|&&b| b).count();
            let out = aig.evaluate(&bits);
            assert_eq!(out, vec![total % 2 == 1, total >= 2], "inputs {:?}", bits);
        }
    }

    #[test]
    fn test_gates() {
        let mut aig = Aig::new(3);
        let (a, b, s) = (aig.input(0), aig.input(1), aig.input(2));
        let gates = [
            aig.add_nand(a, b),
            aig.add_or(a, b),
            aig.add_nor(a, b),
            aig.add_xnor(a, b),
            aig.add_mux(s, a, b),
            aig.add_buffer(a),
            aig.add_not(a),
        ];
        for g in gates {
            aig.add_output(g);
        }
        aig.add_output(Lit::one());

        for x in 0..8u32 {
            let (va, vb, vs) = (x & 1 != 0, x & 2 != 0, x & 4 != 0);
            let out = aig.evaluate(&[va, vb, vs]);
            let expected = vec![
                !(va && vb),
                va || vb,
                !(va || vb),
                va == vb,
                if vs { vb } else { va },
                va,
                !va,
                true,
            ];
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_lanes_are_independent() {
        let aig = full_adder();
        let inputs = [0xF0F0_1234_5678_9ABC, 0x0FF0_FFFF_0000_1111, 0xAAAA_5555_CCCC_3333];
        let words = aig.simulate(&inputs);
        for lane in 0..64 {
            let bits: Vec<bool> = inputs.iter().map(|w| (w >> lane) & 1 != 0).collect();
            let out = aig.evaluate(&bits);
            for (o, &word) in out.iter().zip(words.iter()) {
                assert_eq!(*o, (word >> lane) & 1 != 0);
            }
        }
    }

    #[test]
    fn test_toggling_matches_manual_xor() {
        // Toggling a node is equivalent to inserting an XOR key gate with key=1.
        let aig = full_adder();
        let inputs = [0b1010_1010, 0b1100_1100, 0b1111_0000];
        let toggled = aig.simulate_with_toggling(&inputs, &[Lit::from_var(6)]);

        let mut locked = Aig::new(4);
        let a = locked.input(0);
        let b = locked.input(1);
        let c = locked.input(2);
        let k = locked.input(3);
        let ab = locked.add_xor(a, b);
        let ab = locked.add_xor(ab, k);
        let sum = locked.add_xor(ab, c);
        let g = locked.add_and(a, b);
        let p = locked.add_and(ab, c);
        let carry = locked.add_or(g, p);
        locked.add_output(sum);
        locked.add_output(carry);

        let expected = locked.simulate(&[inputs[0], inputs[1], inputs[2], u64::MAX]);
        assert_eq!(toggled, expected);
    }

    #[test]
    fn test_toggling_nothing_is_plain_simulation() {
        let aig = full_adder();
        let inputs = [1, 2, 3];
        assert_eq!(aig.simulate_with_toggling(&inputs, &[]), aig.simulate(&inputs));
    }

    #[test]
    #[should_panic(expected = "toggled twice")]
    fn test_toggle_twice_panics() {
        let aig = full_adder();
        let x = Lit::from_var(4);
        aig.simulate_with_toggling(&[0, 0, 0], &[x, !x]);
    }

    #[test]
    #[should_panic(expected = "Cannot toggle a constant")]
    fn test_toggle_constant_panics() {
        let aig = full_adder();
        aig.simulate_with_toggling(&[0, 0, 0], &[Lit::one()]);
    }
}
