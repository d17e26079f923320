//! Loading combinational circuits from ASCII AIGER files (`.aag`).
//!
//! Parsing is done by the [`aiger`][::aiger] crate. This module turns its
//! records into an [`Aig`]: AND gates may appear in any order in the file, so
//! they are sorted topologically to respect the ordering invariant of the
//! arena. Input symbols are kept so that the key port can be found by name.

use std::collections::HashMap;
use std::io::Read;

use ::aiger::{Aiger, Literal, Reader, Symbol};
use log::debug;
use thiserror::Error;

use crate::aig::Aig;
use crate::lit::Lit;

#[derive(Debug, Error)]
pub enum AigerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected by the parser (bad header, bad literal, bad symbol, ...).
    #[error("malformed AIGER file: {0:?}")]
    Format(::aiger::AigerError),

    #[error("header announces {expected} {kind}, but the file has {found}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("sequential circuits are not supported ({0} latches)")]
    Latches(usize),

    #[error("literal {0} is used but never defined")]
    Undefined(usize),

    #[error("literal {0} is defined twice")]
    Redefined(usize),

    #[error("combinational cycle through literal {0}")]
    Cycle(usize),
}

impl From<::aiger::AigerError> for AigerError {
    fn from(e: ::aiger::AigerError) -> Self {
        AigerError::Format(e)
    }
}

fn check_count(kind: &'static str, expected: usize, found: usize) -> Result<(), AigerError> {
    if expected != found {
        return Err(AigerError::Truncated { kind, expected, found });
    }
    Ok(())
}

/// Reads a combinational AIGER file into an [`Aig`] and the names of its inputs.
///
/// Blank lines are skipped. Nothing is reserved from the header counts before
/// the records backing them have been read.
pub fn read_aig(mut reader: impl Read) -> Result<(Aig, Vec<Option<String>>), AigerError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let text: String = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| [line.trim_end(), "\n"])
        .collect();

    let reader = Reader::from_reader(text.as_bytes())?;
    let header = reader.header();
    if header.l > 0 {
        return Err(AigerError::Latches(header.l));
    }

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut gates: HashMap<usize, [Literal; 2]> = HashMap::new();
    let mut symbols = Vec::new();
    for record in reader.records() {
        match record? {
            Aiger::Input(lit) => inputs.push(lit),
            Aiger::Latch { .. } => return Err(AigerError::Latches(header.l.max(1))),
            Aiger::Output(lit) => outputs.push(lit),
            Aiger::AndGate { output, inputs: fanins } => {
                if gates.insert(output.variable(), fanins).is_some() {
                    return Err(AigerError::Redefined(output.0));
                }
            }
            Aiger::Symbol {
                type_spec: Symbol::Input,
                position,
                symbol,
            } => symbols.push((position, symbol)),
            Aiger::Symbol { .. } => {}
        }
    }
    check_count("inputs", header.i, inputs.len())?;
    check_count("outputs", header.o, outputs.len())?;
    check_count("AND gates", header.a, gates.len())?;

    let mut names = vec![None; inputs.len()];
    for (position, symbol) in symbols {
        if position < names.len() {
            names[position] = Some(symbol);
        }
    }

    let mut aig = Aig::new(inputs.len());
    let mut map: HashMap<usize, Lit> = HashMap::new();
    map.insert(0, Lit::zero());
    for (k, lit) in inputs.iter().enumerate() {
        if map.insert(lit.variable(), aig.input(k)).is_some() {
            return Err(AigerError::Redefined(lit.0));
        }
    }

    // Iterative DFS over the gate definitions, outputs first
    let mut roots: Vec<usize> = gates.keys().copied().collect();
    roots.sort_unstable();
    let mut visiting = Vec::new();
    for root in outputs.iter().map(|lit| lit.variable()).chain(roots) {
        if map.contains_key(&root) {
            continue;
        }
        visiting.push((root, false));
        while let Some((var, expanded)) = visiting.pop() {
            if map.contains_key(&var) {
                continue;
            }
            let [l, r] = *gates.get(&var).ok_or(AigerError::Undefined(2 * var))?;
            if expanded {
                let a = map_lit(&map, l)?;
                let b = map_lit(&map, r)?;
                map.insert(var, aig.add_and(a, b));
                continue;
            }
            visiting.push((var, true));
            for fanin in [l, r] {
                if map.contains_key(&fanin.variable()) {
                    continue;
                }
                if visiting.iter().any(|&(v, e)| v == fanin.variable() && e) {
                    return Err(AigerError::Cycle(fanin.0));
                }
                visiting.push((fanin.variable(), false));
            }
        }
    }

    for &lit in outputs.iter() {
        let out = map_lit(&map, lit)?;
        aig.add_output(out);
    }
    debug!(
        "Read AIGER file with {} inputs, {} gates and {} outputs",
        aig.num_inputs(),
        aig.num_nodes(),
        aig.num_outputs()
    );
    Ok((aig, names))
}

fn map_lit(map: &HashMap<usize, Lit>, lit: Literal) -> Result<Lit, AigerError> {
    let base = *map.get(&lit.variable()).ok_or(AigerError::Undefined(lit.0))?;
    Ok(if lit.is_inverted() { !base } else { base })
}
