//! Mode expression compiler

use super::{Class, Clause, ModeBits, ModeSpec, Op, Perms, Targets};
use crate::error::ModeError;
use std::iter::Peekable;
use std::str::Chars;

/// Longest string treated as an octal literal
const MAX_OCTAL_DIGITS: usize = 4;

/// Compile a mode expression.
///
/// Either the whole expression compiles or nothing does; a bad clause
/// anywhere discards the clauses before it.
pub fn compile(expr: &str) -> Result<ModeSpec, ModeError> {
    if expr.is_empty() {
        return Err(ModeError::Empty);
    }

    if expr.len() <= MAX_OCTAL_DIGITS && expr.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return compile_octal(expr);
    }

    let clauses = expr
        .split(',')
        .enumerate()
        .map(|(index, clause)| {
            if clause.is_empty() {
                Err(ModeError::EmptyClause {
                    expr: expr.to_string(),
                    index,
                })
            } else {
                parse_clause(clause)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ModeSpec::Symbolic(clauses))
}

fn compile_octal(literal: &str) -> Result<ModeSpec, ModeError> {
    let out_of_range = || ModeError::OctalOutOfRange {
        literal: literal.to_string(),
    };

    let value = u32::from_str_radix(literal, 8).map_err(|_| out_of_range())?;
    let bits = ModeBits::from_bits(value).ok_or_else(out_of_range)?;
    Ok(ModeSpec::Octal(bits))
}

fn target_class(c: char) -> Option<Class> {
    match c {
        'u' => Some(Class::User),
        'g' => Some(Class::Group),
        'a' | 'o' => Some(Class::Other),
        _ => None,
    }
}

fn perm_flag(c: char) -> Option<Perms> {
    match c {
        'r' => Some(Perms::READ),
        'w' => Some(Perms::WRITE),
        'x' => Some(Perms::EXECUTE),
        'X' => Some(Perms::COND_EXECUTE),
        _ => None,
    }
}

fn is_operator(c: char) -> bool {
    matches!(c, '+' | '-' | '=')
}

/// Consume the longest prefix of characters `classify` accepts, OR-ing results
fn take_while_set<T, F>(chars: &mut Peekable<Chars<'_>>, empty: T, classify: F) -> T
where
    T: std::ops::BitOr<Output = T> + Copy,
    F: Fn(char) -> Option<T>,
{
    let mut set = empty;
    while let Some(flag) = chars.peek().copied().and_then(&classify) {
        set = set | flag;
        chars.next();
    }
    set
}

fn parse_clause(clause: &str) -> Result<Clause, ModeError> {
    let unexpected = |found: char| ModeError::UnexpectedChar {
        clause: clause.to_string(),
        found,
    };

    let mut chars = clause.chars().peekable();

    let targets = take_while_set(&mut chars, Targets::empty(), |c| {
        target_class(c).map(Targets::from)
    });

    if targets.is_empty() {
        return Err(match chars.peek() {
            Some(&c) if !is_operator(c) => unexpected(c),
            _ => ModeError::MissingTarget {
                clause: clause.to_string(),
            },
        });
    }

    let op = match chars.next() {
        Some('+') => Op::Add,
        Some('-') => Op::Remove,
        Some('=') => {
            let source: String = chars.collect();
            let mut letters = source.chars();
            return match (letters.next().and_then(target_class), letters.next()) {
                (Some(source), None) => Ok(Clause::Assign { targets, source }),
                _ => Err(ModeError::InvalidSource {
                    clause: clause.to_string(),
                }),
            };
        }
        Some(c) if perm_flag(c).is_some() => {
            return Err(ModeError::MissingOperator {
                clause: clause.to_string(),
            })
        }
        Some(c) => return Err(unexpected(c)),
        None => {
            return Err(ModeError::MissingOperator {
                clause: clause.to_string(),
            })
        }
    };

    let perms = take_while_set(&mut chars, Perms::empty(), perm_flag);

    if let Some(c) = chars.next() {
        return Err(unexpected(c));
    }
    if perms.is_empty() {
        return Err(ModeError::MissingPerms {
            clause: clause.to_string(),
        });
    }

    Ok(Clause::Adjust { targets, op, perms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octal() {
        assert_eq!(compile("755").unwrap(), ModeSpec::Octal(ModeBits::from_mode(0o755)));
        assert_eq!(compile("0").unwrap(), ModeSpec::Octal(ModeBits::empty()));
        assert_eq!(
            compile("4750").unwrap(),
            ModeSpec::Octal(ModeBits::from_mode(0o4750))
        );
        assert_eq!(compile("7777").unwrap(), ModeSpec::Octal(ModeBits::all()));
    }

    #[test]
    fn test_octal_rejects_overlong_and_bad_digits() {
        assert!(compile("75555").is_err());
        assert!(compile("07555").is_err());
        assert!(compile("758").is_err());
        assert!(compile("9").is_err());
    }

    #[test]
    fn test_adjust_clauses() {
        let spec = compile("ug+rwx,o-x").unwrap();
        assert_eq!(
            spec,
            ModeSpec::Symbolic(vec![
                Clause::Adjust {
                    targets: Targets::USER | Targets::GROUP,
                    op: Op::Add,
                    perms: Perms::READ | Perms::WRITE | Perms::EXECUTE,
                },
                Clause::Adjust {
                    targets: Targets::OTHER,
                    op: Op::Remove,
                    perms: Perms::EXECUTE,
                },
            ])
        );
    }

    #[test]
    fn test_a_means_other() {
        assert_eq!(compile("a+r").unwrap(), compile("o+r").unwrap());
        let ModeSpec::Symbolic(clauses) = compile("a+r").unwrap() else {
            panic!("expected symbolic");
        };
        assert_eq!(clauses[0].targets(), Targets::OTHER);
    }

    #[test]
    fn test_conditional_execute() {
        assert_eq!(
            compile("g+X").unwrap(),
            ModeSpec::Symbolic(vec![Clause::Adjust {
                targets: Targets::GROUP,
                op: Op::Add,
                perms: Perms::COND_EXECUTE,
            }])
        );
    }

    #[test]
    fn test_assign() {
        assert_eq!(
            compile("ug=a").unwrap(),
            ModeSpec::Symbolic(vec![Clause::Assign {
                targets: Targets::USER | Targets::GROUP,
                source: Class::Other,
            }])
        );
    }

    #[test]
    fn test_missing_target() {
        assert!(matches!(
            compile("+x"),
            Err(ModeError::MissingTarget { .. })
        ));
        assert!(matches!(
            compile("=u"),
            Err(ModeError::MissingTarget { .. })
        ));
    }

    #[test]
    fn test_missing_operator() {
        assert!(matches!(
            compile("urw"),
            Err(ModeError::MissingOperator { .. })
        ));
        assert!(matches!(
            compile("ug"),
            Err(ModeError::MissingOperator { .. })
        ));
    }

    #[test]
    fn test_missing_perms() {
        assert!(matches!(compile("u+"), Err(ModeError::MissingPerms { .. })));
        assert!(matches!(compile("g-"), Err(ModeError::MissingPerms { .. })));
    }

    #[test]
    fn test_invalid_source() {
        assert!(matches!(compile("u="), Err(ModeError::InvalidSource { .. })));
        assert!(matches!(compile("u=gu"), Err(ModeError::InvalidSource { .. })));
        assert!(matches!(compile("u=r"), Err(ModeError::InvalidSource { .. })));
    }

    #[test]
    fn test_unexpected_chars() {
        assert!(matches!(
            compile("q+r"),
            Err(ModeError::UnexpectedChar { found: 'q', .. })
        ));
        assert!(matches!(
            compile("u+rz"),
            Err(ModeError::UnexpectedChar { found: 'z', .. })
        ));
        assert!(matches!(
            compile("u+r-w"),
            Err(ModeError::UnexpectedChar { found: '-', .. })
        ));
        assert!(matches!(
            compile("u*r"),
            Err(ModeError::UnexpectedChar { found: '*', .. })
        ));
    }

    #[test]
    fn test_one_bad_clause_fails_everything() {
        assert!(compile("u+r,g+w,bogus").is_err());
        assert!(matches!(
            compile("u+r,,g+w"),
            Err(ModeError::EmptyClause { index: 1, .. })
        ));
        assert!(compile("u+r,").is_err());
        assert!(matches!(compile(""), Err(ModeError::Empty)));
    }
}
