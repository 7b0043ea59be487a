//! Function items: the callable values of the data model.
//!
//! Three shapes cover every callable: a named reference (built-in or
//! user-defined, resolved at invocation time), an inline function closing
//! over the variable scope it was created in, and a partial application
//! holding a template argument vector with unbound `?` positions. A named
//! reference behaves exactly like a partial with every position unbound.

use std::fmt;
use std::sync::Arc;

use stilo_xdm::ExpandedName;

use crate::ast::{Expression, Param};
use crate::types::sequence::XdmValue;

#[derive(Clone, PartialEq)]
pub enum XdmFunction<N> {
    /// Reference to a function by expanded name and arity.
    Named { name: ExpandedName, arity: usize },
    /// Inline function item with its captured scope.
    Inline {
        params: Vec<Param>,
        body: Arc<Expression>,
        captured: Vec<(String, XdmValue<N>)>,
    },
    /// Partial application: `bound` has one slot per parameter of `base`,
    /// `None` marking a `?` placeholder.
    Partial {
        base: Box<XdmFunction<N>>,
        bound: Vec<Option<XdmValue<N>>>,
    },
}

impl<N: stilo_xdm::SourceNode> XdmFunction<N> {
    pub fn named(name: ExpandedName, arity: usize) -> Self {
        XdmFunction::Named { name, arity }
    }

    pub fn inline(
        params: Vec<Param>,
        body: Expression,
        captured: Vec<(String, XdmValue<N>)>,
    ) -> Self {
        XdmFunction::Inline {
            params,
            body: Arc::new(body),
            captured,
        }
    }

    /// Remaining arity: unbound positions for a partial, declared arity
    /// otherwise.
    pub fn arity(&self) -> usize {
        match self {
            XdmFunction::Named { arity, .. } => *arity,
            XdmFunction::Inline { params, .. } => params.len(),
            XdmFunction::Partial { bound, .. } => {
                bound.iter().filter(|slot| slot.is_none()).count()
            }
        }
    }

    pub fn name(&self) -> Option<&ExpandedName> {
        match self {
            XdmFunction::Named { name, .. } => Some(name),
            XdmFunction::Inline { .. } => None,
            XdmFunction::Partial { base, .. } => base.name(),
        }
    }
}

impl<N> fmt::Debug for XdmFunction<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmFunction::Named { name, arity } => write!(f, "{}#{}", name, arity),
            XdmFunction::Inline { params, .. } => {
                write!(f, "function({} params)", params.len())
            }
            XdmFunction::Partial { base, bound } => write!(
                f,
                "partial({:?}, {} bound)",
                base,
                bound.iter().filter(|slot| slot.is_some()).count()
            ),
        }
    }
}
