//! QBE sigils
//!
//! QBE prefixes every name with a sigil that marks its scope and nature:
//! `%` for function-scope temporaries, `@` for block labels, `$` for
//! globals. These wrappers keep the sigil with the name at the type level so
//! emission sites cannot mix them up.

use std::fmt;

/// A numbered function-scope temporary: `%.3`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncScopeTemp(pub usize);

impl fmt::Display for FuncScopeTemp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%.{}", self.0)
    }
}

/// A named function-scope temporary (for incoming parameters): `%a`
#[derive(Debug, Clone, Copy)]
pub struct NamedTemp<'a>(pub &'a str);

impl fmt::Display for NamedTemp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A compiler-generated block label, made unique by its number: `@then_2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLabel {
    name: &'static str,
    number: usize,
}

impl BlockLabel {
    pub fn new(name: &'static str, number: usize) -> Self {
        Self { name, number }
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}_{}", self.name, self.number)
    }
}

/// A user-defined block label, unique by its source name: `@done`
#[derive(Debug, Clone, Copy)]
pub struct UserLabel<'a>(pub &'a str);

impl fmt::Display for UserLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A global name: `$main`
#[derive(Debug, Clone, Copy)]
pub struct GlobalName<'a>(pub &'a str);

impl fmt::Display for GlobalName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}
