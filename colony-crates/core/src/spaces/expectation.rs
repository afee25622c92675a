//! The lazy output of an expectation over random variables.

use log::debug;

use super::Distributions;
use super::Space;
use super::SpaceIter;
use super::SpaceRef;
use super::UtilitySpace;
use super::domain_intersection;
use super::hypercube::Hypercube;
use super::iter::Odometer;
use super::iter::normalise_iteration;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::colony_assert_simple;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// The output of an expectation that computes itself on the fly.
///
/// Each demanded utility is the probability-weighted sum over all joint
/// assignments to the random variables, the joint probability being the
/// product of the per-variable distributions. A summand with infeasible
/// utility makes the whole expectation infeasible, so the scan
/// short-circuits there.
#[derive(Debug)]
pub struct ExpectationView<'a, V, U> {
    space: SpaceRef<'a, V, U>,
    rand_vars: Vec<String>,
    dists: Vec<&'a Hypercube<V, U>>,
    rand_doms: Vec<Vec<V>>,
    variables: Vec<String>,
    domains: Vec<Vec<V>>,
    infeasible: U,
    solutions: u64,
}

impl<'a, V: DomainValue, U: UtilityValue> ExpectationView<'a, V, U> {
    pub(crate) fn new(
        space: SpaceRef<'a, V, U>,
        distributions: &Distributions<'a, V, U>,
    ) -> ExpectationView<'a, V, U> {
        // Distributions of variables the space does not contain are
        // ignored. Iterating the space's own variable order keeps the
        // random-variable order deterministic.
        let mut rand_vars = Vec::new();
        let mut dists = Vec::new();
        let mut rand_doms = Vec::new();
        let mut variables = Vec::new();
        let mut domains = Vec::new();

        for (var, dom) in space.variables().iter().zip(space.domains()) {
            let Some(dist) = distributions.get(var) else {
                variables.push(var.clone());
                domains.push(dom.clone());
                continue;
            };
            colony_assert_simple!(
                dist.variables() == std::slice::from_ref(var),
                "a distribution must be a one-variable space over its random variable"
            );
            let shared = domain_intersection(dom, &dist.domains()[0]);
            colony_assert_simple!(
                shared.is_some(),
                "a random variable's distribution must share values with the space"
            );
            rand_vars.push(var.clone());
            dists.push(*dist);
            rand_doms.push(shared.unwrap_or_default());
        }

        let solutions = solution_product(&domains);
        ExpectationView {
            infeasible: space.infeasible(),
            space,
            rand_vars,
            dists,
            rand_doms,
            variables,
            domains,
            solutions,
        }
    }

    /// The random variables this view marginalises.
    pub fn rand_vars(&self) -> &[String] {
        &self.rand_vars
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for ExpectationView<'_, V, U> {
    fn as_dyn(&self) -> &dyn UtilitySpace<V, U> {
        self
    }

    fn variables(&self) -> &[String] {
        &self.variables
    }

    fn domains(&self) -> &[Vec<V>] {
        &self.domains
    }

    fn infeasible(&self) -> U {
        self.infeasible
    }

    fn solution_count(&self) -> u64 {
        self.solutions
    }

    fn utility_named(&self, names: &[String], values: &[V]) -> Option<U> {
        let mut order = Vec::with_capacity(self.variables.len());
        let mut doms = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let position = names.iter().position(|name| name == var)?;
            order.push(var.clone());
            doms.push(vec![values[position]]);
        }
        let mut iter = self.iter_over(&order, &doms, None);
        Some(iter.next_utility().unwrap_or(self.infeasible))
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
        let (order, doms) = normalise_iteration(&self.variables, &self.domains, order, doms);

        // Inner iteration order: the outer order first, the random
        // variables last.
        let mut full_order = order.clone();
        let mut full_doms = doms.clone();
        for (var, dom) in self.rand_vars.iter().zip(&self.rand_doms) {
            full_order.push(var.clone());
            full_doms.push(dom.clone());
        }

        Box::new(ExpectationIter {
            inner: self.space.iter_over(&full_order, &full_doms, None),
            odometer: Odometer::new(doms),
            order,
            dists: self.dists.clone(),
            rand_doms: self.rand_doms.clone(),
            block: solution_product(&self.rand_doms),
            infeasible: self.infeasible,
            skip,
            current: None,
            delayed: false,
        })
    }

    fn resolve(&self) -> Space<V, U> {
        debug!(
            "resolving a lazy expectation over {:?} into {} utilities",
            self.rand_vars, self.solutions
        );

        let mut iter = self.iter();
        if self.variables.is_empty() {
            let utility = iter.next_utility().unwrap_or(self.infeasible);
            return Space::Scalar(ScalarSpace::new(utility, self.infeasible));
        }

        let mut values = Vec::with_capacity(self.solutions as usize);
        while let Some(util) = iter.next_utility() {
            values.push(util);
        }
        drop(iter);
        Space::Hypercube(Hypercube::new(
            self.variables.clone(),
            self.domains.clone(),
            values,
            self.infeasible,
        ))
    }
}

/// Walks the remaining variables with an odometer and reduces one block of
/// random-variable scenarios per demanded utility.
struct ExpectationIter<'s, V, U> {
    inner: Box<dyn SpaceIter<V, U> + 's>,
    odometer: Odometer<V>,
    order: Vec<String>,
    dists: Vec<&'s Hypercube<V, U>>,
    rand_doms: Vec<Vec<V>>,
    block: u64,
    infeasible: U,
    skip: Option<U>,
    current: Option<U>,
    delayed: bool,
}

impl<V: DomainValue, U: UtilityValue> ExpectationIter<'_, V, U> {
    fn advance_blind(&mut self) -> bool {
        if !self.odometer.has_next() {
            self.odometer.exhaust();
            self.current = None;
            return false;
        }
        if self.delayed {
            for _ in 0..self.block {
                let _ = self.inner.next_solution();
            }
        }
        self.delayed = true;
        self.current = None;
        let _ = self.odometer.advance();
        true
    }

    fn compute_current(&mut self) -> Option<U> {
        if !self.delayed {
            return self.current;
        }

        let mut expect = U::zero();
        let mut scenarios = Odometer::new(self.rand_doms.clone());
        let mut consumed = 0;
        let mut infeasible_hit = false;
        while scenarios.advance() {
            let util = self.inner.next_utility()?;
            consumed += 1;

            if util == self.infeasible {
                // The expectation cannot recover from an infeasible
                // summand; the remaining scenarios only need skipping.
                infeasible_hit = true;
                break;
            }

            let scenario = scenarios.solution().unwrap_or(&[]);
            let mut probability = U::from_f64(1.0);
            for (dist, value) in self.dists.iter().zip(scenario) {
                probability =
                    probability.times(dist.payload(std::slice::from_ref(value)).unwrap_or_else(U::zero));
            }
            expect = expect.plus(util.times(probability));
        }

        if infeasible_hit {
            expect = self.infeasible;
            for _ in consumed..self.block {
                let _ = self.inner.next_solution();
            }
        }

        self.delayed = false;
        self.current = Some(expect);
        self.current
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for ExpectationIter<'_, V, U> {
    fn solution_count(&self) -> u64 {
        self.odometer.total()
    }

    fn has_next(&self) -> bool {
        self.odometer.has_next()
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        if !self.advance_blind() {
            return None;
        }
        if let Some(skip) = self.skip {
            while self.compute_current() == Some(skip) {
                if !self.advance_blind() {
                    return None;
                }
            }
            self.compute_current()?;
        }
        self.odometer.solution()
    }

    fn next_utility(&mut self) -> Option<U> {
        let _ = self.next_solution()?;
        self.compute_current()
    }

    fn current_solution(&self) -> Option<&[V]> {
        self.odometer.solution()
    }

    fn current_utility(&mut self) -> Option<U> {
        self.compute_current()
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
    use crate::spaces::UtilitySpaceExt;
    use crate::spaces::test_helpers::vars;
    use crate::values::Real;

    fn real_cube(utilities: &[f64]) -> Hypercube<i32, Real> {
        Hypercube::new(
            vars(&["x", "r"]),
            vec![vec![0, 1], vec![0, 1]],
            utilities.iter().copied().map(Real::new).collect(),
            Real::min_infinity(),
        )
    }

    fn distribution(var: &str, weights: &[f64]) -> Hypercube<i32, Real> {
        Hypercube::new(
            vars(&[var]),
            vec![(0..weights.len() as i32).collect()],
            weights.iter().copied().map(Real::new).collect(),
            Real::min_infinity(),
        )
    }

    #[test]
    fn expectation_weights_utilities_by_probability() {
        // x=0: 0.25·10 + 0.75·20 = 17.5; x=1: 0.25·30 + 0.75·40 = 37.5.
        let cube = real_cube(&[10.0, 20.0, 30.0, 40.0]);
        let dist = distribution("r", &[0.25, 0.75]);
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let view = cube.expectation(&dists);
        assert_eq!(vars(&["x"]), view.variables());

        let Space::Hypercube(resolved) = view.resolve() else {
            panic!("expected a dense space");
        };
        assert_eq!(
            vec![Real::new(17.5), Real::new(37.5)],
            resolved.raw_values().to_vec()
        );
    }

    #[test]
    fn an_infeasible_scenario_poisons_the_expectation() {
        let cube = real_cube(&[10.0, f64::NEG_INFINITY, 30.0, 40.0]);
        let dist = distribution("r", &[0.5, 0.5]);
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let Space::Hypercube(resolved) = cube.expectation(&dists).resolve() else {
            panic!("expected a dense space");
        };
        assert_eq!(
            vec![Real::min_infinity(), Real::new(35.0)],
            resolved.raw_values().to_vec()
        );
    }

    #[test]
    fn irrelevant_distributions_leave_the_space_unchanged() {
        let cube = real_cube(&[10.0, 20.0, 30.0, 40.0]);
        let dist = distribution("other", &[1.0]);
        let mut dists = Distributions::default();
        let _ = dists.insert("other".to_owned(), &dist);

        let view = cube.expectation(&dists);
        assert!(view.rand_vars().is_empty());
        assert!(view.resolve().equivalent(&cube));
    }

    #[test]
    fn point_queries_match_the_resolution() {
        let cube = real_cube(&[10.0, 20.0, 30.0, 40.0]);
        let dist = distribution("r", &[0.25, 0.75]);
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let view = cube.expectation(&dists);
        let resolved = view.resolve();

        let names = vars(&["x"]);
        for x in 0..2 {
            assert_eq!(
                resolved.utility_named(&names, &[x]),
                view.utility_named(&names, &[x]),
            );
        }
    }

    #[test]
    fn marginalising_every_variable_resolves_to_a_scalar() {
        let cube = distribution("r", &[5.0, 7.0]);
        let dist = distribution("r", &[0.5, 0.5]);
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        assert_eq!(
            Space::Scalar(ScalarSpace::new(Real::new(6.0), Real::min_infinity())),
            cube.expectation(&dists).resolve()
        );
    }

    #[test]
    fn two_random_variables_multiply_their_probabilities() {
        // Utilities are r + 10·s over r, s ∈ {0, 1}; uniform distributions
        // give the expectation (0 + 1 + 10 + 11) / 4 = 5.5.
        let cube = Hypercube::new(
            vars(&["r", "s"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![Real::new(0.0), Real::new(10.0), Real::new(1.0), Real::new(11.0)],
            Real::min_infinity(),
        );
        let dist_r = distribution("r", &[0.5, 0.5]);
        let dist_s = distribution("s", &[0.5, 0.5]);
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist_r);
        let _ = dists.insert("s".to_owned(), &dist_s);

        assert_eq!(
            Space::Scalar(ScalarSpace::new(Real::new(5.5), Real::min_infinity())),
            cube.expectation(&dists).resolve()
        );
    }
}
