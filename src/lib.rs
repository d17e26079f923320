//! # locksmith: SAT attacks on logic-locked circuits
//!
//! **`locksmith`** recovers the key of a *logic-locked* combinational circuit:
//! a circuit with extra key inputs that only computes the intended function
//! when the key is right. The attacker has the locked netlist and black-box
//! access to a correctly keyed copy (the *oracle*).
//!
//! ## How the attack works
//!
//! A *distinguishing input* (DI) is an input on which two keys that agree with
//! every oracle observation so far still disagree with each other. Querying
//! the oracle on it rules out at least one of them. When no DI remains, every
//! key consistent with the observations computes the same function as the
//! correct key.
//!
//! - The **exact attack** stops exactly there and returns a provably correct key.
//! - **AppSAT** also samples random inputs every few rounds and stops early once
//!   its best key is wrong on a small enough fraction of them.
//!
//! ## Basic Usage
//!
//! ```rust
//! use locksmith::aig::Aig;
//! use locksmith::attack::{AttackOutcome, SatAttack};
//! use locksmith::design::{InputBit, LockedDesign, Wiring};
//! use rand::SeedableRng;
//!
//! // out = a ^ k0
//! let mut aig = Aig::new(2);
//! let out = aig.add_xor(aig.input(0), aig.input(1));
//! aig.add_output(out);
//!
//! let wiring = Wiring::new(vec![InputBit::Primary, InputBit::Key(0)]).unwrap();
//! let design = LockedDesign::new(aig, wiring, vec![true]).unwrap();
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
//! let mut attack = SatAttack::new(&design);
//! let outcome = attack.run_sat(4, &mut rng).unwrap();
//! assert_eq!(outcome, AttackOutcome::Unlocked { key: vec![true] });
//! ```
//!
//! ## Core Components
//!
//! - **[`aig`]**: And-inverter graphs, gate builders and 64-lane simulation.
//! - **[`incremental`]**: Re-simulation of the fanout cone of toggled signals.
//! - **[`cnf`]** and **[`encode`]**: Clause construction, circuit encoding and solving.
//! - **[`design`]**: The locked design and its oracle.
//! - **[`attack`]**: The exact attack and AppSAT.

pub mod aig;
pub mod aiger;
pub mod attack;
pub mod cnf;
pub mod config;
pub mod design;
pub mod encode;
pub mod error;
pub mod incremental;
pub mod lit;
pub mod store;
pub mod utils;
