//! Permission evaluation

use super::{Class, Clause, ModeBits, ModeSpec, Op, Perms};
use crate::catalog::EntryType;

impl ModeSpec {
    /// Compute the mode an entry should end up with.
    ///
    /// Octal specs ignore `current` entirely. Symbolic specs start from
    /// `current` and apply clauses left to right, each clause seeing the
    /// result of the ones before it.
    pub fn apply(&self, current: ModeBits, entry_type: EntryType) -> ModeBits {
        match self {
            ModeSpec::Octal(bits) => *bits,
            ModeSpec::Symbolic(clauses) => clauses.iter().fold(current, |mode, clause| {
                apply_clause(clause, mode, entry_type.is_dir())
            }),
        }
    }
}

fn apply_clause(clause: &Clause, mut mode: ModeBits, is_dir: bool) -> ModeBits {
    match *clause {
        Clause::Assign { targets, source } => {
            let rwx = mode.class_bits(source);
            for class in targets.classes() {
                mode.set_class_bits(class, rwx);
            }
        }
        Clause::Adjust {
            targets,
            op: Op::Add,
            perms,
        } => {
            for class in targets.classes() {
                mode |= plain_bits(class, perms);

                // u+X only ever fires on directories; g+X and a+X also fire
                // when the owner can already execute.
                if perms.contains(Perms::COND_EXECUTE) {
                    let owner_exec = class != Class::User && mode.contains(ModeBits::USER_EXEC);
                    if is_dir || owner_exec {
                        mode |= class.execute();
                    }
                }
            }
        }
        Clause::Adjust {
            targets,
            op: Op::Remove,
            perms,
        } => {
            for class in targets.classes() {
                mode -= plain_bits(class, perms);

                // Unlike +X, -X clears execute regardless of type
                if perms.contains(Perms::COND_EXECUTE) {
                    mode -= class.execute();
                }
            }
        }
    }
    mode
}

/// The r/w/x bits `perms` names for one class, ignoring `X`
fn plain_bits(class: Class, perms: Perms) -> ModeBits {
    let mut bits = ModeBits::empty();
    if perms.contains(Perms::READ) {
        bits |= class.read();
    }
    if perms.contains(Perms::WRITE) {
        bits |= class.write();
    }
    if perms.contains(Perms::EXECUTE) {
        bits |= class.execute();
    }
    bits
}
