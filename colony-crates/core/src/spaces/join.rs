//! Joining spaces, lazily and eagerly.

use itertools::Itertools;
use log::debug;
use log::trace;

use super::Space;
use super::SpaceIter;
use super::SpaceRef;
use super::UtilitySpace;
use super::domain_intersection;
use super::hypercube::Hypercube;
use super::iter::normalise_iteration;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::colony_assert_simple;
use crate::values::DomainValue;
use crate::values::UtilityValue;

/// How joined utilities are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combine {
    /// Pointwise addition. Addition short-circuits on the infeasible
    /// utility: whatever is added to an infinity stays infinite.
    Add,
    /// Pointwise multiplication. Multiplication cannot short-circuit: a
    /// negative factor can turn an infeasible utility feasible.
    Multiply,
}

impl Combine {
    pub(crate) fn apply<U: UtilityValue>(self, first: U, second: U) -> U {
        match self {
            Combine::Add => first.plus(second),
            Combine::Multiply => first.times(second),
        }
    }
}

/// Joins two spaces into a lazy view. `None` is the null space.
pub(crate) fn lazy<'a, V: DomainValue, U: UtilityValue>(
    first: SpaceRef<'a, V, U>,
    second: SpaceRef<'a, V, U>,
    combine: Combine,
) -> Option<JoinView<'a, V, U>> {
    lazy_many(first, &[second], combine)
}

/// Joins a space with several others into a lazy view. `None` is the null
/// space.
pub(crate) fn lazy_many<'a, V: DomainValue, U: UtilityValue>(
    first: SpaceRef<'a, V, U>,
    others: &[SpaceRef<'a, V, U>],
    combine: Combine,
) -> Option<JoinView<'a, V, U>> {
    if first.is_null() || others.iter().any(|space| space.is_null()) {
        return None;
    }

    // Consecutive joins of the same combination kind are flattened, so a
    // join of joins queries all original inputs directly instead of
    // recursing through view layers.
    let mut inputs: Vec<SpaceRef<'a, V, U>> = Vec::with_capacity(others.len() + 1);
    push_input(&mut inputs, first, combine);
    for other in others {
        push_input(&mut inputs, *other, combine);
    }

    let (variables, domains) = joint_scope(&inputs)?;
    let solutions = solution_product(&domains);
    trace!(
        "lazy join of {} inputs over {} variables ({} solutions)",
        inputs.len(),
        variables.len(),
        solutions
    );

    Some(JoinView {
        infeasible: first.infeasible(),
        inputs,
        variables,
        domains,
        combine,
        solutions,
    })
}

fn push_input<'a, V: DomainValue, U: UtilityValue>(
    inputs: &mut Vec<SpaceRef<'a, V, U>>,
    space: SpaceRef<'a, V, U>,
    combine: Combine,
) {
    match space.flattened_join_inputs(combine) {
        Some(inner) => inputs.extend_from_slice(inner),
        None => inputs.push(space),
    }
}

/// The union of the inputs' variables (first input's order first) with the
/// intersection of their domains; `None` on an empty intersection.
fn joint_scope<V: DomainValue, U: UtilityValue>(
    inputs: &[SpaceRef<'_, V, U>],
) -> Option<(Vec<String>, Vec<Vec<V>>)> {
    let variables: Vec<String> = inputs
        .iter()
        .flat_map(|space| space.variables())
        .unique()
        .cloned()
        .collect();

    let mut domains = Vec::with_capacity(variables.len());
    for var in &variables {
        let mut dom: Option<Vec<V>> = None;
        for input in inputs {
            if let Some(theirs) = input.domain_of(var) {
                dom = Some(match dom {
                    None => theirs.to_vec(),
                    Some(mine) => domain_intersection(&mine, theirs)?,
                });
            }
        }
        domains.push(dom.expect("a joint variable comes from some input"));
    }
    Some((variables, domains))
}

/// The result of a join that remembers its inputs rather than computing
/// itself explicitly.
///
/// The view borrows its inputs; it answers point queries by querying each
/// input at the projected assignment and combining the results, and its
/// iterators drive one sub-iterator per input in lockstep. Inputs must not
/// be mutated while the view is alive, which the borrow checker enforces.
#[derive(Debug)]
pub struct JoinView<'a, V, U> {
    inputs: Vec<SpaceRef<'a, V, U>>,
    variables: Vec<String>,
    domains: Vec<Vec<V>>,
    combine: Combine,
    infeasible: U,
    solutions: u64,
}

impl<V: DomainValue, U: UtilityValue> JoinView<'_, V, U> {
    /// The number of input spaces (after flattening).
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the inputs are added or multiplied.
    pub fn combine(&self) -> Combine {
        self.combine
    }
}

impl<V: DomainValue, U: UtilityValue> UtilitySpace<V, U> for JoinView<'_, V, U> {
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
        let mut acc: Option<U> = None;
        for input in &self.inputs {
            let util = input.utility_named(names, values)?;
            acc = Some(match acc {
                None => util,
                Some(sum) => {
                    if self.combine == Combine::Add && sum.is_infinite() {
                        // Whatever is added to an infinity stays infinite.
                        return Some(sum);
                    }
                    self.combine.apply(sum, util)
                }
            });
        }
        acc
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
        let iters = self
            .inputs
            .iter()
            .map(|input| input.iter_over(&order, &doms, None))
            .collect();
        Box::new(JoinIter {
            iters,
            combine: self.combine,
            infeasible: self.infeasible,
            skip,
        })
    }

    fn resolve(&self) -> Space<V, U> {
        debug!(
            "resolving a lazy {:?}-join of {} inputs into {} utilities",
            self.combine,
            self.inputs.len(),
            self.solutions
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

    fn flattened_join_inputs(&self, combine: Combine) -> Option<&[SpaceRef<'_, V, U>]> {
        if combine == self.combine {
            Some(&self.inputs)
        } else {
            None
        }
    }
}

/// Drives one sub-iterator per join input, all in the same variable order,
/// and combines their utilities on demand.
struct JoinIter<'s, V, U> {
    iters: Vec<Box<dyn SpaceIter<V, U> + 's>>,
    combine: Combine,
    infeasible: U,
    skip: Option<U>,
}

impl<V: DomainValue, U: UtilityValue> JoinIter<'_, V, U> {
    /// The next combined utility, feasible or not.
    fn next_util_blind(&mut self) -> Option<U> {
        let mut acc = self.iters[0].next_utility()?;

        match self.combine {
            Combine::Multiply => {
                for iter in self.iters.iter_mut().skip(1) {
                    acc = acc.times(iter.next_utility()?);
                }
                Some(acc)
            }
            Combine::Add => {
                let mut index = 1;
                while index < self.iters.len() && !acc.is_infinite() {
                    acc = acc.plus(self.iters[index].next_utility()?);
                    index += 1;
                }
                // Once the sum is infinite it cannot change; the remaining
                // sub-iterators only need to advance.
                while index < self.iters.len() {
                    let _ = self.iters[index].next_solution()?;
                    index += 1;
                }
                Some(acc)
            }
        }
    }
}

impl<V: DomainValue, U: UtilityValue> SpaceIter<V, U> for JoinIter<'_, V, U> {
    fn solution_count(&self) -> u64 {
        self.iters[0].solution_count()
    }

    fn has_next(&self) -> bool {
        self.iters[0].has_next()
    }

    fn next_solution(&mut self) -> Option<&[V]> {
        match self.skip {
            None => {
                let _ = self.iters[0].next_solution()?;
                for iter in self.iters.iter_mut().skip(1) {
                    let _ = iter.next_solution()?;
                }
            }
            Some(_) => {
                self.next_utility()?;
            }
        }
        self.iters[0].current_solution()
    }

    fn next_utility(&mut self) -> Option<U> {
        let mut util = self.next_util_blind();
        if let Some(skip) = self.skip {
            while util == Some(skip) {
                util = self.next_util_blind();
            }
        }
        util
    }

    fn next_utility_past(&mut self, bound: U, minimize: bool) -> Option<U> {
        let better = |util: U| {
            if minimize { util < bound } else { util > bound }
        };

        if self.iters.len() == 1 || self.combine == Combine::Multiply {
            while let Some(util) = self.next_util_blind() {
                if better(util) {
                    return Some(util);
                }
            }
            return None;
        }

        // Addition: sum all but the last input, then let the last
        // sub-iterator skip ahead to anything beating what is still
        // missing from the bound.
        let last = self.iters.len() - 1;
        while self.iters[0].has_next() {
            let mut acc = self.iters[0].next_utility()?;
            let mut index = 1;
            while index < last && !acc.is_infinite() {
                acc = acc.plus(self.iters[index].next_utility()?);
                index += 1;
            }

            if index == last && !acc.is_infinite() {
                let _ = self.iters[last].next_solution()?;
                let tail = self.iters[last].current_utility_within(bound.minus(acc), minimize);
                acc = acc.plus(tail.unwrap_or(self.infeasible));
                index += 1;
            }
            while index <= last {
                let _ = self.iters[index].next_solution()?;
                index += 1;
            }

            if better(acc) {
                return Some(acc);
            }
        }
        None
    }

    fn current_solution(&self) -> Option<&[V]> {
        self.iters[0].current_solution()
    }

    fn current_utility(&mut self) -> Option<U> {
        let mut acc = self.iters[0].current_utility()?;
        match self.combine {
            Combine::Multiply => {
                for iter in self.iters.iter_mut().skip(1) {
                    acc = acc.times(iter.current_utility()?);
                }
            }
            Combine::Add => {
                for iter in self.iters.iter_mut().skip(1) {
                    if acc.is_infinite() {
                        return Some(acc);
                    }
                    acc = acc.plus(iter.current_utility()?);
                }
            }
        }
        Some(acc)
    }

    fn current_utility_within(&mut self, bound: U, minimize: bool) -> Option<U> {
        if self.combine == Combine::Multiply || self.iters.len() == 1 {
            return self.current_utility();
        }

        let last = self.iters.len() - 1;
        let mut acc = self.iters[0].current_utility()?;
        for iter in self.iters.iter_mut().take(last).skip(1) {
            if acc.is_infinite() {
                return Some(acc);
            }
            acc = acc.plus(iter.current_utility()?);
        }
        if acc.is_infinite() {
            return Some(acc);
        }

        let tail = self.iters[last].current_utility_within(bound.minus(acc), minimize)?;
        Some(acc.plus(tail))
    }

    fn variable_order(&self) -> &[String] {
        self.iters[0].variable_order()
    }

    fn iter_domains(&self) -> &[Vec<V>] {
        self.iters[0].iter_domains()
    }
}

/// The eager, constraint-check-minimising join: materialises the output
/// array by reading each input exactly once per cell it contributes.
pub(crate) fn min_checks<V: DomainValue, U: UtilityValue>(
    first: &dyn UtilitySpace<V, U>,
    second: &dyn UtilitySpace<V, U>,
    combine: Combine,
) -> Space<V, U> {
    if first.is_null() || second.is_null() {
        return Space::Null;
    }

    let Some((variables, domains)) = joint_scope(&[first, second]) else {
        return Space::Null;
    };

    if variables.is_empty() {
        // Both inputs are scalar.
        let utility = combine.apply(
            first.utility_named(&[], &[]).unwrap_or(first.infeasible()),
            second.utility_named(&[], &[]).unwrap_or(first.infeasible()),
        );
        return Space::Scalar(ScalarSpace::new(utility, first.infeasible()));
    }

    let solutions = solution_product(&domains);
    debug!(
        "eager join over {} variables, materialising {} utilities",
        variables.len(),
        solutions
    );
    let mut out = Hypercube::new(
        variables,
        domains,
        vec![U::zero(); solutions as usize],
        first.infeasible(),
    );

    // First input: its utilities seed the output array.
    replicate_into(&mut out, first);

    // Second input: combined into the seeded array.
    {
        let restricted = restricted_domains(&out, second);
        let mut out_iter = out.iter_mut_over(second.variables(), second.domains());
        let mut input_iter = second.iter_over(second.variables(), &restricted, None);
        let factor = out_iter.solution_count() / input_iter.solution_count().max(1);
        while let Some(util) = input_iter.next_utility() {
            for _ in 0..factor {
                let seeded = out_iter.next_value().unwrap_or_else(U::zero);
                out_iter.set_current_value(combine.apply(seeded, util));
            }
        }
    }

    Space::Hypercube(out)
}

/// Seeds the output of an eager join with one input's utilities: each
/// input utility fills the whole block of output cells that project onto
/// its assignment.
fn replicate_into<V: DomainValue, U: UtilityValue>(
    out: &mut Hypercube<V, U>,
    input: &dyn UtilitySpace<V, U>,
) {
    let restricted = restricted_domains(out, input);
    let mut out_iter = out.iter_mut_over(input.variables(), input.domains());
    let mut input_iter = input.iter_over(input.variables(), &restricted, None);
    let factor = out_iter.solution_count() / input_iter.solution_count().max(1);
    colony_assert_simple!(
        out_iter.solution_count() == input_iter.solution_count() * factor,
        "the output of a join must tile each input"
    );
    while let Some(util) = input_iter.next_utility() {
        for _ in 0..factor {
            let _ = out_iter.next_solution();
            out_iter.set_current_value(util);
        }
    }
}

/// The output's (intersected) domains for one input's variables, in that
/// input's variable order.
fn restricted_domains<V: DomainValue, U: UtilityValue>(
    out: &Hypercube<V, U>,
    input: &dyn UtilitySpace<V, U>,
) -> Vec<Vec<V>> {
    input
        .variables()
        .iter()
        .map(|var| {
            out.domain_of(var)
                .expect("a join output covers all input variables")
                .to_vec()
        })
        .collect()
}
