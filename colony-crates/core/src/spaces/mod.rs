//! Utility solution spaces and the algebra defined over them.
//!
//! A *space* maps combinations of variable-value assignments to utilities.
//! The dense representation is the [`Hypercube`]; [`ScalarSpace`] is the
//! zero-variable degenerate case and [`Space::Null`] the empty/infeasible
//! solution space. Operators either materialise their result eagerly or
//! return a lazy view ([`JoinView`], [`BlindProjectView`],
//! [`ExpectationView`]) that computes utilities on demand and can be
//! [`resolve`](UtilitySpace::resolve)d into a dense space when required.

pub(crate) mod best_first;
pub(crate) mod blind_project;
pub(crate) mod consensus;
pub(crate) mod expectation;
pub(crate) mod hypercube;
pub(crate) mod iter;
pub(crate) mod join;
pub(crate) mod project;
pub(crate) mod scalar;

use std::borrow::Cow;
use std::fmt::Debug;

pub use best_first::BestFirstIter;
pub use blind_project::BlindProjectView;
pub use expectation::ExpectationView;
pub use hypercube::Hypercube;
pub use iter::HypercubeIter;
pub use iter::SpaceIter;
pub use join::Combine;
pub use join::JoinView;
pub use scalar::ScalarIter;
pub use scalar::ScalarSpace;

use crate::containers::HashMap;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// A borrowed space behind the operator seam.
pub type SpaceRef<'a, V, U> = &'a dyn UtilitySpace<V, U>;

/// The probability distributions of random variables: for each random
/// variable, a one-variable space whose utilities are probability masses.
pub type Distributions<'a, V, U> = HashMap<String, &'a Hypercube<V, U>>;

/// Capabilities required of the per-assignment payload a space stores.
///
/// Utility spaces store [`UtilityValue`]s; the companion spaces produced by
/// projection store the argmax assignments themselves (`Vec<V>`).
pub trait Payload: Clone + PartialEq + Debug {}

impl<T: Clone + PartialEq + Debug> Payload for T {}

/// The query surface shared by dense spaces and lazy views.
///
/// Everything an operator needs from its operands goes through this trait:
/// variable and domain introspection, point lookups, iterator construction
/// and materialisation. The algebra itself lives in [`UtilitySpaceExt`],
/// which is implemented for every `UtilitySpace`.
pub trait UtilitySpace<V: DomainValue, U: UtilityValue>: Debug {
    /// This space, as a trait object.
    fn as_dyn(&self) -> &dyn UtilitySpace<V, U>;

    /// The variables of this space, in its internal order.
    fn variables(&self) -> &[String];

    /// The domains of the variables, aligned with [`variables`](Self::variables).
    fn domains(&self) -> &[Vec<V>];

    /// The domain of `var`, or `None` if the variable is not in this space.
    fn domain_of(&self, var: &str) -> Option<&[V]> {
        self.variables()
            .iter()
            .position(|name| name == var)
            .map(|index| self.domains()[index].as_slice())
    }

    /// The infeasible utility: `-∞` when maximising, `+∞` when minimising.
    fn infeasible(&self) -> U;

    /// The number of solutions, i.e. the product of the domain sizes.
    fn solution_count(&self) -> u64;

    /// Whether this is the empty/infeasible solution space.
    fn is_null(&self) -> bool {
        false
    }

    /// The utility of the assignment described by `names` and `values`.
    ///
    /// The input may mention variables this space does not contain, but it
    /// must assign a value to every variable of the space; otherwise `None`
    /// is returned. A value outside a variable's domain yields the
    /// infeasible utility.
    fn utility_named(&self, names: &[String], values: &[V]) -> Option<U>;

    /// An iterator over every solution, in this space's own variable order.
    fn iter<'s>(&'s self) -> Box<dyn SpaceIter<V, U> + 's>
    where
        V: 's,
    {
        self.iter_over(self.variables(), self.domains(), None)
    }

    /// An iterator that silently skips infeasible solutions.
    fn sparse_iter<'s>(&'s self) -> Box<dyn SpaceIter<V, U> + 's>
    where
        V: 's,
    {
        self.iter_over(self.variables(), self.domains(), Some(self.infeasible()))
    }

    /// An iterator over the given variables in the given order.
    ///
    /// `order` may be any permutation or superset of this space's
    /// variables; `doms` may restrict variables to sub-domains. Variables
    /// of the space missing from `order` are appended, and domains of
    /// shared variables are intersected. When `skip` is given, solutions
    /// with that utility are silently skipped.
    fn iter_over<'s>(
        &'s self,
        order: &[String],
        doms: &[Vec<V>],
        skip: Option<U>,
    ) -> Box<dyn SpaceIter<V, U> + 's>
    where
        V: 's;

    /// Materialises this space into an eager, dense representation.
    ///
    /// Lazy views compute their whole utility array here and relinquish
    /// their inputs; dense spaces return a clone.
    fn resolve(&self) -> Space<V, U>;

    /// Flattening hook for lazy joins: the inputs of this space if it is
    /// itself a lazy join combining with `combine`.
    fn flattened_join_inputs(&self, combine: Combine) -> Option<&[SpaceRef<'_, V, U>]> {
        let _ = combine;
        None
    }
}

/// The algebra over [`UtilitySpace`]s, blanket-implemented for all of them.
pub trait UtilitySpaceExt<V: DomainValue, U: UtilityValue>: UtilitySpace<V, U> {
    /// Joins this space with another, deferring computation to query time.
    ///
    /// The output variables are the union of the inputs' variables, the
    /// domain of each shared variable the intersection of the inputs'
    /// domains. `None` is the null space: some shared variable has
    /// disjoint domains (or an input was already null).
    fn join<'a>(
        &'a self,
        other: SpaceRef<'a, V, U>,
        combine: Combine,
    ) -> Option<JoinView<'a, V, U>> {
        join::lazy(self.as_dyn(), other, combine)
    }

    /// Joins this space with several others, deferring computation.
    fn join_many<'a>(
        &'a self,
        others: &[SpaceRef<'a, V, U>],
        combine: Combine,
    ) -> Option<JoinView<'a, V, U>> {
        join::lazy_many(self.as_dyn(), others, combine)
    }

    /// Joins eagerly, minimising the constraint-check count.
    ///
    /// Each input is read exactly once per cell it contributes, which
    /// makes the check count predictable at the price of materialising
    /// the whole output.
    fn join_min_checks(&self, other: &dyn UtilitySpace<V, U>, combine: Combine) -> Space<V, U> {
        join::min_checks(self.as_dyn(), other, combine)
    }

    /// Eliminates `vars_out` by optimising over them, keeping one optimal
    /// assignment per remaining-variable context.
    ///
    /// Ties are broken towards the first optimum in iteration order.
    fn project(&self, vars_out: &[String], maximize: bool) -> ProjOutput<V, U> {
        project::project(self.as_dyn(), vars_out, maximize)
    }

    /// Projects out every variable, yielding a scalar space and the
    /// globally optimal assignment.
    fn project_all(&self, maximize: bool) -> ProjOutput<V, U> {
        project::project_all(self.as_dyn(), maximize)
    }

    /// Eliminates `vars_out` by optimising over them, discarding the
    /// optimal assignments. Used to marginalise random variables, for
    /// which an "optimal value" is meaningless.
    ///
    /// The result is a lazy view; variables not present in this space are
    /// ignored.
    fn blind_project<'a>(&'a self, vars_out: &[String], maximize: bool) -> BlindProjectView<'a, V, U> {
        BlindProjectView::new(self.as_dyn(), vars_out, maximize)
    }

    /// The optimal utility over all solutions.
    fn blind_project_all(&self, maximize: bool) -> U {
        project::blind_project_all(self.as_dyn(), maximize)
    }

    /// The space obtained by eliminating `var` towards its minimum.
    fn min(&self, var: &str) -> Space<V, U> {
        let vars_out = [var.to_owned()];
        self.blind_project(&vars_out, false).resolve()
    }

    /// The space obtained by eliminating `var` towards its maximum.
    fn max(&self, var: &str) -> Space<V, U> {
        let vars_out = [var.to_owned()];
        self.blind_project(&vars_out, true).resolve()
    }

    /// Removes the random variables in `distributions` by probability-
    /// weighted summation. The result is a lazy view; distributions of
    /// variables not present in this space are ignored.
    fn expectation<'a>(&'a self, distributions: &Distributions<'a, V, U>) -> ExpectationView<'a, V, U> {
        ExpectationView::new(self.as_dyn(), distributions)
    }

    /// Whether the two spaces assign the same utility to every assignment,
    /// regardless of their internal variable orders.
    fn equivalent(&self, other: &dyn UtilitySpace<V, U>) -> bool {
        let mine = self.as_dyn();

        if mine.is_null() || other.is_null() {
            return mine.is_null() == other.is_null();
        }

        let vars = mine.variables();
        if vars.len() != other.variables().len() {
            return false;
        }
        for (var, dom) in vars.iter().zip(mine.domains()) {
            match other.domain_of(var) {
                Some(other_dom) if other_dom == dom.as_slice() => {}
                _ => return false,
            }
        }

        // Aligning the iteration orders makes the flat sequences comparable.
        let mut my_iter = mine.iter();
        let mut other_iter = other.iter_over(vars, mine.domains(), None);
        while my_iter.has_next() {
            if my_iter.next_utility() != other_iter.next_utility() {
                return false;
            }
        }
        true
    }
}

impl<V: DomainValue, U: UtilityValue, T: UtilitySpace<V, U> + ?Sized> UtilitySpaceExt<V, U> for T {}

/// The output of a projection: the reduced space, the eliminated
/// variables, and a companion space mapping every kept assignment to the
/// optimal values of the eliminated variables.
///
/// The companion is what lets a parent algorithm later reconstruct a full
/// solution through [`Hypercube::compose`]. It is [`Space::Null`] when no
/// assignment was recorded (projection of zero variables).
#[derive(Clone, Debug, PartialEq)]
pub struct ProjOutput<V, U> {
    /// The space over the remaining variables.
    pub space: Space<V, U>,
    /// The variables that were eliminated.
    pub vars_out: Vec<String>,
    /// For every kept assignment, the optimal assignment to `vars_out`.
    pub assignments: Space<V, Vec<V>>,
}

/// A solution space in its materialised form.
///
/// `Null` is absorbing: joining with it, slicing it or projecting it
/// yields `Null` again. It only compares equal to itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Space<V, P> {
    /// A dense table over one or more variables.
    Hypercube(Hypercube<V, P>),
    /// A zero-variable space holding a single payload.
    Scalar(ScalarSpace<P>),
    /// The empty/infeasible solution space.
    Null,
}

impl<V: DomainValue, P: Payload> Space<V, P> {
    /// The variables of this space (empty for scalars and `Null`).
    pub fn space_variables(&self) -> &[String] {
        match self {
            Space::Hypercube(cube) => cube.variables(),
            Space::Scalar(_) | Space::Null => &[],
        }
    }

    /// Whether this is the empty/infeasible solution space.
    ///
    /// Available for any payload type; utility spaces can also go through
    /// [`UtilitySpace::is_null`].
    pub fn is_null_space(&self) -> bool {
        matches!(self, Space::Null)
    }

    /// The payload stored for the assignment described by `names` and
    /// `values`, or `None` when the assignment does not cover this space.
    pub fn payload_named(&self, names: &[String], values: &[V]) -> Option<P> {
        match self {
            Space::Hypercube(cube) => cube.payload_named(names, values),
            Space::Scalar(scalar) => Some(scalar.payload().clone()),
            Space::Null => None,
        }
    }

    /// Restricts `vars` to the given sub-domains.
    ///
    /// Variables whose sub-domain is a single value are eliminated; if all
    /// variables are eliminated the result is a scalar. A no-op slice
    /// (same domains, same order) returns the space itself, borrowed, so
    /// callers keep the identity fast path.
    pub fn slice(&self, vars: &[String], sub_domains: &[Vec<V>]) -> Cow<'_, Space<V, P>> {
        match self {
            Space::Hypercube(cube) => match cube.slice_impl(vars, sub_domains) {
                Some(sliced) => Cow::Owned(sliced),
                None => Cow::Borrowed(self),
            },
            Space::Scalar(_) | Space::Null => Cow::Borrowed(self),
        }
    }

    /// Slices single values: fixes each of `vars` to the paired value.
    pub fn slice_values(&self, vars: &[String], values: &[V]) -> Cow<'_, Space<V, P>> {
        let doms: Vec<Vec<V>> = values.iter().map(|value| vec![*value]).collect();
        self.slice(vars, &doms)
    }
}

impl<V: DomainValue, U: UtilityValue> Space<V, U> {
    /// Replaces each of `vars_out` in this space by the values recorded in
    /// `substitution` (as produced by a projection), reconstructing the
    /// induced utility over the remaining variables.
    pub fn compose(&self, vars_out: &[String], substitution: &Space<V, Vec<V>>) -> Space<V, U> {
        match self {
            Space::Hypercube(cube) => cube.compose(vars_out, substitution),
            Space::Scalar(_) => self.clone(),
            Space::Null => Space::Null,
        }
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for Space<V, U> {
    fn as_dyn(&self) -> &dyn UtilitySpace<V, U> {
        self
    }

    fn variables(&self) -> &[String] {
        match self {
            Space::Hypercube(cube) => cube.variables(),
            Space::Scalar(_) | Space::Null => &[],
        }
    }

    fn domains(&self) -> &[Vec<V>] {
        match self {
            Space::Hypercube(cube) => cube.domains(),
            Space::Scalar(_) | Space::Null => &[],
        }
    }

    fn infeasible(&self) -> U {
        match self {
            Space::Hypercube(cube) => cube.infeasible(),
            Space::Scalar(scalar) => scalar.infeasible(),
            Space::Null => U::min_infinity(),
        }
    }

    fn solution_count(&self) -> u64 {
        match self {
            Space::Hypercube(cube) => cube.solution_count(),
            Space::Scalar(_) => 1,
            Space::Null => 0,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Space::Null)
    }

    fn utility_named(&self, names: &[String], values: &[V]) -> Option<U> {
        match self {
            Space::Hypercube(cube) => cube.utility_named(names, values),
            Space::Scalar(scalar) => Some(*scalar.payload()),
            Space::Null => None,
        }
    }

    fn iter_over<'s>(
        &'s self,
        order: &[String],
        doms: &[Vec<V>],
        skip: Option<U>,
    ) -> Box<dyn SpaceIter<V, U> + 's>
    where
        V: 's,
    {
        match self {
            Space::Hypercube(cube) => cube.iter_over(order, doms, skip),
            Space::Scalar(scalar) => scalar.iter_over(order, doms, skip),
            Space::Null => Box::new(iter::EmptyIter::new()),
        }
    }

    fn resolve(&self) -> Space<V, U> {
        self.clone()
    }
}

/// The sorted intersection of two sorted domains.
///
/// `None` (not an empty vector) signals an empty intersection.
pub(crate) fn domain_intersection<V: DomainValue>(first: &[V], second: &[V]) -> Option<Vec<V>> {
    if first == second {
        return Some(first.to_vec());
    }
    let out: Vec<V> = first
        .iter()
        .copied()
        .filter(|value| second.contains(value))
        .collect();
    if out.is_empty() { None } else { Some(out) }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    /// Builds an owned variable-name list from literals.
    pub(crate) fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    /// A two-variable cube over `{a ∈ {0, 1}, b ∈ {0, 1}}` with utilities
    /// `[3, 1, 2, 4]` (order `a=0,b=0 → 3; a=0,b=1 → 1; a=1,b=0 → 2;
    /// a=1,b=1 → 4`) and infeasible utility `-∞`.
    pub(crate) fn two_var_cube() -> Hypercube<i32, i32> {
        Hypercube::new(
            vars(&["a", "b"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![3, 1, 2, 4],
            i32::min_infinity(),
        )
    }
}
