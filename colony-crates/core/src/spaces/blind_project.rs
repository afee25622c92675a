//! The lazy output of a blind projection.

use log::debug;

use super::Space;
use super::SpaceIter;
use super::SpaceRef;
use super::UtilitySpace;
use super::hypercube::Hypercube;
use super::iter::Odometer;
use super::iter::normalise_iteration;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// The output of a blind projection that computes itself on the fly.
///
/// The view keeps a borrow of the space that was projected; every demanded
/// utility is the max (or min) over all assignments to the eliminated
/// variables. Utilities of solutions that are skipped over without being
/// demanded are never computed at all.
#[derive(Debug)]
pub struct BlindProjectView<'a, V, U> {
    space: SpaceRef<'a, V, U>,
    vars_out: Vec<String>,
    maximize: bool,
    variables: Vec<String>,
    domains: Vec<Vec<V>>,
    infeasible: U,
    solutions: u64,
}

impl<'a, V: DomainValue, U: UtilityValue> BlindProjectView<'a, V, U> {
    pub(crate) fn new(
        space: SpaceRef<'a, V, U>,
        vars_out: &[String],
        maximize: bool,
    ) -> BlindProjectView<'a, V, U> {
        // Variables the space does not contain are ignored.
        let vars_out: Vec<String> = vars_out
            .iter()
            .filter(|var| space.domain_of(var).is_some())
            .cloned()
            .collect();

        let mut variables = Vec::new();
        let mut domains = Vec::new();
        for (var, dom) in space.variables().iter().zip(space.domains()) {
            if !vars_out.contains(var) {
                variables.push(var.clone());
                domains.push(dom.clone());
            }
        }
        let solutions = solution_product(&domains);

        BlindProjectView {
            infeasible: space.infeasible(),
            space,
            vars_out,
            maximize,
            variables,
            domains,
            solutions,
        }
    }

    /// The variables this view eliminates.
    pub fn vars_out(&self) -> &[String] {
        &self.vars_out
    }

    fn block_size(&self) -> u64 {
        self.vars_out
            .iter()
            .filter_map(|var| self.space.domain_of(var))
            .map(|dom| dom.len() as u64)
            .product()
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for BlindProjectView<'_, V, U> {
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
        // Pin every remaining variable to the provided value and reduce
        // the single block that is left.
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

        // Inner iteration order: the outer order first, the eliminated
        // variables last, so each outer solution owns one contiguous
        // block.
        let mut full_order = order.clone();
        let mut full_doms = doms.clone();
        for var in &self.vars_out {
            full_order.push(var.clone());
            full_doms.push(
                self.space
                    .domain_of(var)
                    .expect("eliminated variables are in the space")
                    .to_vec(),
            );
        }

        Box::new(BlindProjectIter {
            inner: self.space.iter_over(&full_order, &full_doms, None),
            odometer: Odometer::new(doms),
            order,
            block: self.block_size(),
            maximize: self.maximize,
            skip,
            current: None,
            delayed: false,
        })
    }

    fn resolve(&self) -> Space<V, U> {
        debug!(
            "resolving a lazy blind projection of {:?} into {} utilities",
            self.vars_out, self.solutions
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
/// eliminated-variable assignments per demanded utility.
struct BlindProjectIter<'s, V, U> {
    inner: Box<dyn SpaceIter<V, U> + 's>,
    odometer: Odometer<V>,
    order: Vec<String>,
    block: u64,
    maximize: bool,
    skip: Option<U>,
    current: Option<U>,
    /// Whether the current solution's utility has not been computed yet
    /// (so the inner iterator still sits before its block).
    delayed: bool,
}

impl<V: DomainValue, U: UtilityValue> BlindProjectIter<'_, V, U> {
    fn advance_blind(&mut self) -> bool {
        if !self.odometer.has_next() {
            self.odometer.exhaust();
            self.current = None;
            return false;
        }
        if self.delayed {
            // The previous solution's utility was never demanded; its
            // whole block is still pending in the inner iterator.
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
        let mut optimum = self.inner.next_utility()?;
        for _ in 1..self.block {
            let util = self.inner.next_utility()?;
            optimum = if self.maximize {
                optimum.max(util)
            } else {
                optimum.min(util)
            };
        }
        self.delayed = false;
        self.current = Some(optimum);
        self.current
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for BlindProjectIter<'_, V, U> {
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
