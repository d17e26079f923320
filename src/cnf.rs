//! Clause system handed to the SAT solver.
//!
//! [`Cnf`] allocates solver variables and collects clauses. It knows the two
//! boolean constants, so gates fed by constants fold away instead of producing
//! clauses: encoding a circuit with concrete inputs only creates variables for
//! the part that still depends on symbolic literals.
//!
//! Solving hands the clauses to a fresh [`splr`] instance with a time budget.
//! Nothing survives between two calls to [`Cnf::solve`].

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::ops::Not;

use log::debug;
use splr::{Certificate, Config, SolveIF, Solver, SolverError};

/// A solver literal.
///
/// Same layout as [`Lit`][crate::lit::Lit]: variable 0 is reserved for the
/// constants, other variables map to DIMACS variables.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SatLit(u32);

impl SatLit {
    pub const FALSE: SatLit = SatLit(0);
    pub const TRUE: SatLit = SatLit(1);

    pub const fn var(self) -> u32 {
        self.0 >> 1
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn is_const(self) -> bool {
        self.var() == 0
    }

    pub fn to_dimacs(self) -> i32 {
        assert!(!self.is_const(), "Constants have no DIMACS representation");
        let var = self.var() as i32;
        if self.is_negated() {
            -var
        } else {
            var
        }
    }
}

impl From<bool> for SatLit {
    fn from(b: bool) -> Self {
        if b {
            SatLit::TRUE
        } else {
            SatLit::FALSE
        }
    }
}

impl Not for SatLit {
    type Output = Self;

    fn not(self) -> Self::Output {
        SatLit(self.0 ^ 1)
    }
}

impl Display for SatLit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_const() {
            write!(f, "{}", self.is_negated())
        } else {
            write!(f, "{}", self.to_dimacs())
        }
    }
}

/// Assignment returned by a satisfiable query.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    pub fn value(&self, lit: SatLit) -> bool {
        let v = if lit.is_const() {
            false
        } else {
            self.values[lit.var() as usize]
        };
        v ^ lit.is_negated()
    }

    pub fn values(&self, lits: &[SatLit]) -> Vec<bool> {
        lits.iter().map(|&lit| self.value(lit)).collect()
    }
}

#[derive(Debug, Clone)]
pub enum Solution {
    Sat(Model),
    Unsat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    Timeout,
    Solver(String),
}

#[derive(Debug, Clone, Default)]
pub struct Cnf {
    num_vars: u32,
    clauses: Vec<Vec<i32>>,
    /// Set once an empty clause has been asserted.
    conflict: bool,
}

impl Cnf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars as usize
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len() + self.conflict as usize
    }

    pub fn clauses(&self) -> &[Vec<i32>] {
        &self.clauses
    }

    pub fn is_trivially_unsat(&self) -> bool {
        self.conflict
    }

    pub fn new_var(&mut self) -> SatLit {
        self.num_vars += 1;
        SatLit(self.num_vars << 1)
    }

    pub fn new_vars(&mut self, n: usize) -> Vec<SatLit> {
        (0..n).map(|_| self.new_var()).collect()
    }

    /// Adds a clause, dropping false literals and skipping satisfied clauses.
    pub fn add_clause(&mut self, lits: &[SatLit]) {
        if lits.contains(&SatLit::TRUE) {
            return;
        }
        let mut clause: Vec<i32> = Vec::with_capacity(lits.len());
        for &lit in lits {
            if lit == SatLit::FALSE {
                continue;
            }
            let d = lit.to_dimacs();
            if clause.contains(&-d) {
                return;
            }
            if !clause.contains(&d) {
                clause.push(d);
            }
        }
        if clause.is_empty() {
            self.conflict = true;
        } else {
            self.clauses.push(clause);
        }
    }

    /// Forces `lit` to hold in every model.
    pub fn assume(&mut self, lit: SatLit) {
        self.add_clause(&[lit]);
    }
}

// Gates
impl Cnf {
    pub fn and(&mut self, a: SatLit, b: SatLit) -> SatLit {
        if a == SatLit::FALSE || b == SatLit::FALSE || a == !b {
            return SatLit::FALSE;
        }
        if a == SatLit::TRUE || a == b {
            return b;
        }
        if b == SatLit::TRUE {
            return a;
        }
        let y = self.new_var();
        self.add_clause(&[!y, a]);
        self.add_clause(&[!y, b]);
        self.add_clause(&[y, !a, !b]);
        y
    }

    pub fn or(&mut self, a: SatLit, b: SatLit) -> SatLit {
        !self.and(!a, !b)
    }

    pub fn xor(&mut self, a: SatLit, b: SatLit) -> SatLit {
        if a.is_const() {
            return if a == SatLit::TRUE { !b } else { b };
        }
        if b.is_const() {
            return if b == SatLit::TRUE { !a } else { a };
        }
        if a == b {
            return SatLit::FALSE;
        }
        if a == !b {
            return SatLit::TRUE;
        }
        let y = self.new_var();
        self.add_clause(&[!y, a, b]);
        self.add_clause(&[!y, !a, !b]);
        self.add_clause(&[y, !a, b]);
        self.add_clause(&[y, a, !b]);
        y
    }

    pub fn xnor(&mut self, a: SatLit, b: SatLit) -> SatLit {
        !self.xor(a, b)
    }

    /// Literal that holds iff both vectors are equal.
    pub fn vec_eq(&mut self, a: &[SatLit], b: &[SatLit]) -> SatLit {
        assert_eq!(a.len(), b.len());
        let mut res = SatLit::TRUE;
        for (&x, &y) in a.iter().zip(b.iter()) {
            let eq = self.xnor(x, y);
            res = self.and(res, eq);
        }
        res
    }

    /// Literal that holds iff the vectors differ in at least one position.
    pub fn vec_ne(&mut self, a: &[SatLit], b: &[SatLit]) -> SatLit {
        !self.vec_eq(a, b)
    }

    /// Constrains both vectors to be equal, position by position.
    pub fn assume_eq(&mut self, a: &[SatLit], b: &[SatLit]) {
        assert_eq!(a.len(), b.len());
        for (&x, &y) in a.iter().zip(b.iter()) {
            self.add_clause(&[!x, y]);
            self.add_clause(&[x, !y]);
        }
    }

    /// Constrains the vectors to differ in at least one position.
    pub fn assume_ne(&mut self, a: &[SatLit], b: &[SatLit]) {
        assert_eq!(a.len(), b.len());
        let diffs: Vec<SatLit> = a.iter().zip(b.iter()).map(|(&x, &y)| self.xor(x, y)).collect();
        self.add_clause(&diffs);
    }
}

// Output
impl Cnf {
    /// Writes the clauses in DIMACS format.
    pub fn write_dimacs(&self, mut w: impl Write) -> std::io::Result<()> {
        writeln!(w, "p cnf {} {}", self.num_vars, self.num_clauses())?;
        for clause in self.clauses.iter() {
            for lit in clause.iter() {
                write!(w, "{} ", lit)?;
            }
            writeln!(w, "0")?;
        }
        if self.conflict {
            writeln!(w, "0")?;
        }
        Ok(())
    }
}

// Solving
impl Cnf {
    /// Solves the clauses on a fresh solver instance.
    ///
    /// `time_limit` is in seconds; `None` keeps the solver's own default budget.
    pub fn solve(&self, time_limit: Option<f64>) -> Result<Solution, SolveError> {
        debug!(
            "solve: {} variables, {} clauses, time limit {:?}",
            self.num_vars,
            self.num_clauses(),
            time_limit
        );
        if self.conflict {
            return Ok(Solution::Unsat);
        }
        if self.clauses.is_empty() {
            return Ok(Solution::Sat(self.model_from(&[])));
        }

        let mut config = Config::default();
        config.quiet_mode = true;
        if let Some(limit) = time_limit {
            config.c_timeout = limit;
        }

        let mut solver = match Solver::try_from((config, self.clauses.as_slice())) {
            Ok(solver) => solver,
            Err(Ok(Certificate::UNSAT)) => return Ok(Solution::Unsat),
            Err(Ok(Certificate::SAT(assignment))) => {
                return Ok(Solution::Sat(self.model_from(&assignment)));
            }
            Err(Err(e)) => return Err(Self::solver_error(e)),
        };
        match solver.solve() {
            Ok(Certificate::SAT(assignment)) => Ok(Solution::Sat(self.model_from(&assignment))),
            Ok(Certificate::UNSAT) => Ok(Solution::Unsat),
            Err(e) => Err(Self::solver_error(e)),
        }
    }

    fn solver_error(e: SolverError) -> SolveError {
        match e {
            SolverError::TimeOut => SolveError::Timeout,
            e => SolveError::Solver(format!("{:?}", e)),
        }
    }

    /// Variables absent from the assignment are unconstrained and read as false.
    fn model_from(&self, assignment: &[i32]) -> Model {
        let mut values = vec![false; self.num_vars as usize + 1];
        for &lit in assignment {
            let var = lit.unsigned_abs() as usize;
            if lit > 0 && var < values.len() {
                values[var] = true;
            }
        }
        Model { values }
    }
}
