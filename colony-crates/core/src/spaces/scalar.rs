//! The zero-variable solution space.

use super::Space;
use super::SpaceIter;
use super::UtilitySpace;
use super::iter::Odometer;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// A space over zero variables holding exactly one payload.
///
/// Scalars are the terminal case of full projection and the neutral
/// operand of joins: iterated over foreign variables, they repeat their
/// single payload for every assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarSpace<P> {
    payload: P,
    infeasible: Option<P>,
}

impl<P> ScalarSpace<P> {
    /// A scalar utility space.
    pub fn new(payload: P, infeasible: P) -> ScalarSpace<P> {
        ScalarSpace {
            payload,
            infeasible: Some(infeasible),
        }
    }

    /// A scalar companion space (argmax assignments have no infeasible
    /// sentinel).
    pub fn assignment(payload: P) -> ScalarSpace<P> {
        ScalarSpace {
            payload,
            infeasible: None,
        }
    }

    pub(crate) fn from_parts(payload: P, infeasible: Option<P>) -> ScalarSpace<P> {
        ScalarSpace {
            payload,
            infeasible,
        }
    }

    /// The single payload of this space.
    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Copy> ScalarSpace<P> {
    pub(crate) fn infeasible_or(&self, fallback: P) -> P {
        self.infeasible.unwrap_or(fallback)
    }
}

impl<U: UtilityValue> ScalarSpace<U> {
    /// The infeasible utility of this space.
    pub fn infeasible(&self) -> U {
        self.infeasible_or(U::min_infinity())
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for ScalarSpace<U> {
    fn as_dyn(&self) -> &dyn UtilitySpace<V, U> {
        self
    }

    fn variables(&self) -> &[String] {
        &[]
    }

    fn domains(&self) -> &[Vec<V>] {
        &[]
    }

    fn infeasible(&self) -> U {
        ScalarSpace::infeasible(self)
    }

    fn solution_count(&self) -> u64 {
        1
    }

    fn utility_named(&self, _names: &[String], _values: &[V]) -> Option<U> {
        Some(self.payload)
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
        Box::new(ScalarIter::new(
            self.payload,
            order.to_vec(),
            doms.to_vec(),
            skip,
        ))
    }

    fn resolve(&self) -> Space<V, U> {
        Space::Scalar(self.clone())
    }
}

/// Iterates a constant payload over an arbitrary set of variables.
#[derive(Debug)]
pub struct ScalarIter<V, U> {
    odometer: Odometer<V>,
    order: Vec<String>,
    utility: U,
}

impl<V: DomainValue, U: UtilityValue> ScalarIter<V, U> {
    pub(crate) fn new(
        utility: U,
        order: Vec<String>,
        domains: Vec<Vec<V>>,
        skip: Option<U>,
    ) -> ScalarIter<V, U> {
        let mut odometer = Odometer::new(domains);
        if skip == Some(utility) {
            // Every solution would be skipped.
            odometer.exhaust();
        }
        ScalarIter {
            odometer,
            order,
            utility,
        }
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for ScalarIter<V, U> {
    fn solution_count(&self) -> u64 {
        self.odometer.total()
    }

    fn has_next(&self) -> bool {
        self.odometer.has_next()
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        if !self.odometer.advance() {
            return None;
        }
        self.odometer.solution()
    }

    fn next_utility(&mut self) -> Option<U> {
        if !self.odometer.advance() {
            return None;
        }
        Some(self.utility)
    }

    fn current_solution(&self) -> Option<&[V]> {
        self.odometer.solution()
    }

    fn current_utility(&mut self) -> Option<U> {
        self.odometer.solution().map(|_| self.utility)
    }

    fn variable_order(&self) -> &[String] {
        &self.order
    }

    fn iter_domains(&self) -> &[Vec<V>] {
        self.odometer.domains()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::test_helpers::vars;

    #[test]
    fn a_scalar_repeats_its_payload_over_foreign_variables() {
        let scalar = ScalarSpace::new(7, i32::min_infinity());

        let order = vars(&["x", "y"]);
        let doms = vec![vec![0, 1], vec![0, 1, 2]];
        let mut iter = UtilitySpace::<i32, i32>::iter_over(&scalar, &order, &doms, None);

        assert_eq!(6, iter.solution_count());
        let mut count = 0;
        while let Some(util) = iter.next_utility() {
            assert_eq!(7, util);
            count += 1;
        }
        assert_eq!(6, count);
    }

    #[test]
    fn a_zero_variable_iteration_yields_one_solution() {
        let scalar = ScalarSpace::new(7, i32::min_infinity());

        let mut iter = UtilitySpace::<i32, i32>::iter(&scalar);
        assert_eq!(Some(7), iter.next_utility());
        assert!(iter.current_solution().is_some_and(<[i32]>::is_empty));
        assert_eq!(None, iter.next_utility());
    }

    #[test]
    fn an_infeasible_scalar_sparse_iterates_to_nothing() {
        let scalar = ScalarSpace::new(i32::min_infinity(), i32::min_infinity());

        let mut iter = UtilitySpace::<i32, i32>::sparse_iter(&scalar);
        assert!(!iter.has_next());
        assert_eq!(None, iter.next_utility());
    }
}
