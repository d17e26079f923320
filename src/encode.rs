//! Translation of the [`Aig`] into clauses.
//!
//! Nodes are visited in index order, so every fanin literal is available when
//! its consumer is encoded. The returned vector is indexed by AIG variable:
//! entry 0 is the constant, then the inputs, then one literal per AND node.

use log::debug;

use crate::aig::Aig;
use crate::cnf::{Cnf, SatLit};
use crate::lit::Lit;

fn sat_lit(node_lits: &[SatLit], lit: Lit) -> SatLit {
    let s = node_lits[lit.index()];
    if lit.is_negated() {
        !s
    } else {
        s
    }
}

/// Encodes every AND node of `aig`, given one solver literal per AIG input.
pub fn encode(cnf: &mut Cnf, aig: &Aig, input_lits: &[SatLit]) -> Vec<SatLit> {
    assert_eq!(input_lits.len(), aig.num_inputs(), "Wrong number of input literals");
    let clauses_before = cnf.num_clauses();

    let mut node_lits = Vec::with_capacity(aig.num_vars());
    node_lits.push(SatLit::FALSE);
    node_lits.extend_from_slice(input_lits);
    for node in aig.nodes() {
        let a = sat_lit(&node_lits, node.a);
        let b = sat_lit(&node_lits, node.b);
        let y = cnf.and(a, b);
        node_lits.push(y);
    }

    debug!(
        "encode: {} nodes, {} new clauses",
        aig.num_nodes(),
        cnf.num_clauses() - clauses_before
    );
    node_lits
}

/// Maps every declared output of `aig` onto its solver literal.
pub fn extract_outputs(aig: &Aig, node_lits: &[SatLit]) -> Vec<SatLit> {
    assert_eq!(node_lits.len(), aig.num_vars(), "Node literals do not match the AIG");
    aig.outputs().iter().map(|&out| sat_lit(node_lits, out)).collect()
}
