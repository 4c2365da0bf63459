//! Mode expressions
//!
//! A mode expression is compiled once into a [`ModeSpec`] and then applied to
//! every entry of the run:
//!
//! ```text
//!   "ug+rwX,a-w"  ──compile──▶  ModeSpec::Symbolic([Adjust, Adjust])
//!                                      │
//!   (current mode, entry type) ──apply─┴──▶ new mode
//! ```
//!
//! Grammar (comma separated clauses, applied left to right):
//!
//! ```text
//!   expr    := octal | clause ("," clause)*
//!   octal   := [0-7]{1,4}
//!   clause  := target+ ("+" | "-") perm+
//!            | target+ "=" target
//!   target  := "u" | "g" | "a"        ("o" is accepted for "a")
//!   perm    := "r" | "w" | "x" | "X"
//! ```
//!
//! Note that `a` is the *other* class here, not "all", and a clause must name
//! at least one target.

mod apply;
pub mod bits;
mod parse;

pub use bits::{Class, ModeBits, Rwx};
pub use parse::compile;

use bitflags::bitflags;

bitflags! {
    /// Set of classes a clause writes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Targets: u8 {
        const USER = 0b001;
        const GROUP = 0b010;
        const OTHER = 0b100;
    }
}

bitflags! {
    /// Set of permissions an adjust clause adds or removes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perms: u8 {
        const READ = 0b0001;
        const WRITE = 0b0010;
        const EXECUTE = 0b0100;
        /// `X`: execute only for directories or already-executable files
        const COND_EXECUTE = 0b1000;
    }
}

impl Targets {
    /// The named classes in u, g, o order
    pub fn classes(self) -> impl Iterator<Item = Class> {
        Class::ALL
            .into_iter()
            .filter(move |class| self.contains(Targets::from(*class)))
    }
}

impl From<Class> for Targets {
    fn from(class: Class) -> Self {
        match class {
            Class::User => Targets::USER,
            Class::Group => Targets::GROUP,
            Class::Other => Targets::OTHER,
        }
    }
}

/// Whether an adjust clause sets or clears bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
}

/// One comma-separated piece of a symbolic expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `ug+rx`, `a-w`
    Adjust { targets: Targets, op: Op, perms: Perms },
    /// `u=g`: copy the source class's r/w/x onto every target
    Assign { targets: Targets, source: Class },
}

impl Clause {
    pub fn targets(&self) -> Targets {
        match self {
            Clause::Adjust { targets, .. } | Clause::Assign { targets, .. } => *targets,
        }
    }
}

/// A compiled mode expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    /// Replace the whole 12-bit field
    Octal(ModeBits),
    /// Edit the current mode clause by clause
    Symbolic(Vec<Clause>),
}

impl ModeSpec {
    pub fn is_octal(&self) -> bool {
        matches!(self, ModeSpec::Octal(_))
    }

    /// Whether applying this spec leaves the owner with both read and execute.
    ///
    /// When it does, the walker may grant `u+rx` on directories it cannot
    /// descend into, since the final mode will carry those bits anyway.
    pub fn requires_owner_rx(&self) -> bool {
        match self {
            ModeSpec::Octal(bits) => bits.contains(ModeBits::USER_READ | ModeBits::USER_EXEC),
            ModeSpec::Symbolic(clauses) => {
                let mut read = false;
                let mut execute = false;

                for clause in clauses {
                    let Clause::Adjust { targets, op, perms } = clause else {
                        continue;
                    };
                    if !targets.contains(Targets::USER) {
                        continue;
                    }

                    let on = *op == Op::Add;
                    if perms.contains(Perms::READ) {
                        read = on;
                    }
                    if perms.intersects(Perms::EXECUTE | Perms::COND_EXECUTE) {
                        execute = on;
                    }
                }

                read && execute
            }
        }
    }
}

impl std::str::FromStr for ModeSpec {
    type Err = crate::error::ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        compile(s)
    }
}

/// `requires_owner_rx` for an optional spec; no spec never requires anything
pub fn requires_owner_rx(spec: Option<&ModeSpec>) -> bool {
    spec.is_some_and(ModeSpec::requires_owner_rx)
}
