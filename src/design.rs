//! Oracle and locked-design adapter.
//!
//! The attack reasons about two vectors: the primary inputs and the key. The
//! [`Aig`] only knows one flat list of inputs, where key bits sit at whatever
//! positions the key port was mapped to. [`Wiring`] records that mapping once
//! and interleaves both vectors back into AIG order, for concrete booleans as
//! well as for solver literals.
//!
//! [`LockedDesign`] is the only place holding the correct key.

use log::warn;

use crate::aig::Aig;
use crate::cnf::{Cnf, SatLit};
use crate::encode::{encode, extract_outputs};
use crate::error::AttackError;

/// Role of one AIG input.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InputBit {
    Primary,
    /// Bit `offset` of the key port.
    Key(usize),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Wiring {
    slots: Vec<InputBit>,
    nb_inputs: usize,
    nb_key_bits: usize,
}

impl Wiring {
    /// Builds the wiring from the role of each AIG input, in AIG order.
    ///
    /// Key offsets must cover `0..nb_key_bits` exactly once.
    pub fn new(slots: Vec<InputBit>) -> Result<Self, AttackError> {
        let nb_key_bits = slots.iter().filter(|s| matches!(s, InputBit::Key(_))).count();
        let mut seen = vec![false; nb_key_bits];
        for slot in slots.iter() {
            if let InputBit::Key(offset) = *slot {
                if offset >= nb_key_bits || seen[offset] {
                    return Err(AttackError::InvalidConfig(format!(
                        "key port bit {} is duplicated or out of range for a {}-bit key",
                        offset, nb_key_bits
                    )));
                }
                seen[offset] = true;
            }
        }
        let nb_inputs = slots.len() - nb_key_bits;
        Ok(Self {
            slots,
            nb_inputs,
            nb_key_bits,
        })
    }

    /// Builds the wiring from input names: `port[i]` (or `port` alone) is key bit `i`.
    pub fn from_names<S: AsRef<str>>(names: &[Option<S>], port_name: &str) -> Result<Self, AttackError> {
        let slots: Vec<InputBit> = names
            .iter()
            .map(|name| match name {
                Some(name) => key_offset(name.as_ref(), port_name).map_or(InputBit::Primary, InputBit::Key),
                None => InputBit::Primary,
            })
            .collect();
        if !slots.iter().any(|s| matches!(s, InputBit::Key(_))) {
            return Err(AttackError::MissingKeyPort(port_name.to_string()));
        }
        Self::new(slots)
    }

    pub fn slots(&self) -> &[InputBit] {
        &self.slots
    }

    pub fn nb_inputs(&self) -> usize {
        self.nb_inputs
    }

    pub fn nb_key_bits(&self) -> usize {
        self.nb_key_bits
    }

    /// Concatenates and reorders inputs and key into AIG input order.
    pub fn interleave<T: Copy>(&self, inputs: &[T], key: &[T]) -> Vec<T> {
        assert_eq!(inputs.len(), self.nb_inputs, "Wrong number of inputs");
        assert_eq!(key.len(), self.nb_key_bits, "Wrong number of key bits");
        let mut next_input = 0;
        self.slots
            .iter()
            .map(|slot| match *slot {
                InputBit::Key(offset) => key[offset],
                InputBit::Primary => {
                    next_input += 1;
                    inputs[next_input - 1]
                }
            })
            .collect()
    }
}

fn key_offset(name: &str, port_name: &str) -> Option<usize> {
    let rest = name.strip_prefix(port_name)?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix('[')?.strip_suffix(']')?.parse().ok()
}

#[derive(Debug, Clone)]
pub struct LockedDesign {
    aig: Aig,
    wiring: Wiring,
    expected_key: Vec<bool>,
}

impl LockedDesign {
    /// Wraps a locked circuit and its correct key.
    ///
    /// A key longer than the key port is truncated; a shorter one is rejected.
    pub fn new(aig: Aig, wiring: Wiring, mut expected_key: Vec<bool>) -> Result<Self, AttackError> {
        assert_eq!(
            aig.num_inputs(),
            wiring.slots().len(),
            "Wiring does not match the AIG inputs"
        );
        aig.check();
        let nb_key_bits = wiring.nb_key_bits();
        if expected_key.len() < nb_key_bits {
            return Err(AttackError::KeyLength {
                given: expected_key.len(),
                expected: nb_key_bits,
            });
        }
        if expected_key.len() >= nb_key_bits + 4 {
            warn!(
                "Given key has {} bits, but the design has only {} key bits",
                expected_key.len(),
                nb_key_bits
            );
        }
        expected_key.truncate(nb_key_bits);
        Ok(Self {
            aig,
            wiring,
            expected_key,
        })
    }

    pub fn aig(&self) -> &Aig {
        &self.aig
    }

    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    pub fn nb_inputs(&self) -> usize {
        self.wiring.nb_inputs()
    }

    pub fn nb_key_bits(&self) -> usize {
        self.wiring.nb_key_bits()
    }

    pub fn nb_outputs(&self) -> usize {
        self.aig.num_outputs()
    }

    pub(crate) fn expected_key(&self) -> &[bool] {
        &self.expected_key
    }

    /// Runs the correctly keyed circuit.
    pub fn call_oracle(&self, inputs: &[bool]) -> Vec<bool> {
        self.call_design(inputs, &self.expected_key)
    }

    /// Runs the locked circuit with an arbitrary key.
    pub fn call_design(&self, inputs: &[bool], key: &[bool]) -> Vec<bool> {
        self.aig.evaluate(&self.wiring.interleave(inputs, key))
    }

    /// Encodes the circuit with the given input and key literals; returns one literal per AIG variable.
    pub fn encode(&self, cnf: &mut Cnf, input_lits: &[SatLit], key_lits: &[SatLit]) -> Vec<SatLit> {
        encode(cnf, &self.aig, &self.wiring.interleave(input_lits, key_lits))
    }

    pub fn extract_outputs(&self, node_lits: &[SatLit]) -> Vec<SatLit> {
        extract_outputs(&self.aig, node_lits)
    }

    /// Encodes the circuit and returns its output literals.
    pub fn encode_outputs(&self, cnf: &mut Cnf, input_lits: &[SatLit], key_lits: &[SatLit]) -> Vec<SatLit> {
        let node_lits = self.encode(cnf, input_lits, key_lits);
        self.extract_outputs(&node_lits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    /// `out0 = (a & b) ^ k1`, `out1 = c ^ k0`, with the key bits in the middle of the inputs.
    fn toy() -> (Aig, Wiring) {
        let mut aig = Aig::new(5);
        let a = aig.input(0);
        let k1 = aig.input(1);
        let b = aig.input(2);
        let k0 = aig.input(3);
        let c = aig.input(4);
        let ab = aig.add_and(a, b);
        let o0 = aig.add_xor(ab, k1);
        let o1 = aig.add_xor(c, k0);
        aig.add_output(o0);
        aig.add_output(o1);
        let wiring = Wiring::new(vec![
            InputBit::Primary,
            InputBit::Key(1),
            InputBit::Primary,
            InputBit::Key(0),
            InputBit::Primary,
        ])
        .unwrap();
        (aig, wiring)
    }

    #[test]
    fn test_interleave() {
        let (_, wiring) = toy();
        assert_eq!(wiring.nb_inputs(), 3);
        assert_eq!(wiring.nb_key_bits(), 2);
        assert_eq!(wiring.interleave(&[10, 20, 30], &[0, 1]), vec![10, 1, 20, 0, 30]);
    }

    #[test]
    fn test_wiring_rejects_bad_offsets() {
        let dup = Wiring::new(vec![InputBit::Key(0), InputBit::Key(0)]);
        assert!(matches!(dup, Err(AttackError::InvalidConfig(_))));
        let gap = Wiring::new(vec![InputBit::Key(0), InputBit::Key(2)]);
        assert!(matches!(gap, Err(AttackError::InvalidConfig(_))));
    }

    #[test]
    fn test_wiring_from_names() {
        let names = vec![
            Some("a"),
            Some("moosic_key[1]"),
            None,
            Some("moosic_key[0]"),
            Some("moosic_keyboard"),
        ];
        let wiring = Wiring::from_names(&names, "moosic_key").unwrap();
        assert_eq!(
            wiring.slots(),
            &[
                InputBit::Primary,
                InputBit::Key(1),
                InputBit::Primary,
                InputBit::Key(0),
                InputBit::Primary
            ]
        );

        let single = Wiring::from_names(&[Some("k"), Some("x")], "k").unwrap();
        assert_eq!(single.slots(), &[InputBit::Key(0), InputBit::Primary]);

        let missing = Wiring::from_names(&[Some("a"), None], "moosic_key");
        assert_eq!(missing, Err(AttackError::MissingKeyPort("moosic_key".to_string())));
    }

    #[test]
    fn test_call_design() {
        let (aig, wiring) = toy();
        let design = LockedDesign::new(aig, wiring, vec![true, false]).unwrap();
        assert_eq!(design.nb_outputs(), 2);
        // k0 = 1, k1 = 0: out0 = a & b, out1 = !c
        assert_eq!(design.call_oracle(&[true, true, false]), vec![true, true]);
        assert_eq!(design.call_oracle(&[true, false, true]), vec![false, false]);
        // Wrong key inverts both outputs.
        assert_eq!(design.call_design(&[true, true, false], &[false, true]), vec![false, false]);
    }

    #[test]
    fn test_call_design_is_pure() {
        let (aig, wiring) = toy();
        let design = LockedDesign::new(aig, wiring, vec![true, false]).unwrap();
        for x in 0..32u32 {
            let inputs = [x & 1 != 0, x & 2 != 0, x & 4 != 0];
            let key = [x & 8 != 0, x & 16 != 0];
            let first = design.call_design(&inputs, &key);
            let second = design.call_design(&inputs, &key);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_key_length() {
        let (aig, wiring) = toy();
        let short = LockedDesign::new(aig.clone(), wiring.clone(), vec![true]);
        assert_eq!(
            short.unwrap_err(),
            AttackError::KeyLength { given: 1, expected: 2 }
        );

        let long = LockedDesign::new(aig, wiring, vec![true, false, true, true, true, true]).unwrap();
        assert_eq!(long.expected_key(), &[true, false]);
    }
}
