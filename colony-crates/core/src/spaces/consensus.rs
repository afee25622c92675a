//! Consensus: deciding a variable before the random variables reveal
//! themselves.
//!
//! Where expectation-maximisation would pick the assignment with the best
//! *average* utility, consensus picks the assignment that is *optimal*
//! with the greatest total probability mass across random-variable
//! scenarios — a majority vote over scenario-wise argmaxes.

use log::debug;

use super::Distributions;
use super::ProjOutput;
use super::Space;
use super::UtilitySpace;
use super::UtilitySpaceExt;
use super::domain_intersection;
use super::hypercube::Hypercube;
use super::iter::solution_product;
use super::scalar::ScalarSpace;
use crate::colony_assert_simple;
use crate::containers::HashMap;
use crate::values::DomainValue;
use crate::values::UtilityValue;

impl<V: DomainValue, U: UtilityValue> Hypercube<V, U> {
    /// Eliminates `var_out` by majority vote over scenario-wise argmaxes:
    /// per remaining-variable context, each random-variable scenario votes
    /// (with its probability) for the first optimal assignment it sees.
    pub fn consensus(
        &self,
        var_out: &str,
        distributions: &Distributions<'_, V, U>,
        maximize: bool,
    ) -> ProjOutput<V, U> {
        self.consensus_impl(var_out, distributions, maximize, false, false)
    }

    /// Like [`consensus`](Self::consensus), but every tied-optimal
    /// assignment of a scenario is credited, not just the first found.
    pub fn consensus_all_sols(
        &self,
        var_out: &str,
        distributions: &Distributions<'_, V, U>,
        maximize: bool,
    ) -> ProjOutput<V, U> {
        self.consensus_impl(var_out, distributions, maximize, true, false)
    }

    /// Like [`consensus`](Self::consensus), additionally computing the
    /// expected utility conditioned on the winning assignment.
    pub fn consensus_expect(
        &self,
        var_out: &str,
        distributions: &Distributions<'_, V, U>,
        maximize: bool,
    ) -> ProjOutput<V, U> {
        self.consensus_impl(var_out, distributions, maximize, false, true)
    }

    /// [`consensus_all_sols`](Self::consensus_all_sols) combined with
    /// [`consensus_expect`](Self::consensus_expect).
    pub fn consensus_all_sols_expect(
        &self,
        var_out: &str,
        distributions: &Distributions<'_, V, U>,
        maximize: bool,
    ) -> ProjOutput<V, U> {
        self.consensus_impl(var_out, distributions, maximize, true, true)
    }

    fn consensus_impl(
        &self,
        var_out: &str,
        distributions: &Distributions<'_, V, U>,
        maximize: bool,
        all_solutions: bool,
        expect: bool,
    ) -> ProjOutput<V, U> {
        colony_assert_simple!(
            !distributions.contains_key(var_out),
            "the decided variable cannot itself be random"
        );

        // Without the decided variable there is nothing to vote on.
        if self.domain_of(var_out).is_none() {
            let space = if expect {
                self.expectation(distributions).resolve()
            } else {
                Space::Hypercube(self.clone())
            };
            return ProjOutput {
                space,
                vars_out: Vec::new(),
                assignments: Space::Null,
            };
        }

        // Iteration order: kept variables outermost, then the random
        // variables, the decided variable innermost.
        let mut vars_kept = Vec::new();
        let mut kept_doms: Vec<Vec<V>> = Vec::new();
        let mut rand_vars = Vec::new();
        let mut rand_doms: Vec<Vec<V>> = Vec::new();
        for (var, dom) in self.variables().iter().zip(self.domains()) {
            if var == var_out {
                continue;
            }
            match distributions.get(var) {
                Some(dist) => {
                    let shared = domain_intersection(dom, &dist.domains()[0]);
                    colony_assert_simple!(
                        shared.is_some(),
                        "a random variable's distribution must share values with the space"
                    );
                    rand_vars.push(var.clone());
                    rand_doms.push(shared.unwrap_or_default());
                }
                None => {
                    vars_kept.push(var.clone());
                    kept_doms.push(dom.clone());
                }
            }
        }

        // With no random variable in the space, consensus degenerates to
        // an ordinary projection.
        if rand_vars.is_empty() {
            return self.project(std::slice::from_ref(&var_out.to_owned()), maximize);
        }

        let var_out_dom = self
            .domain_of(var_out)
            .expect("the decided variable is present")
            .to_vec();

        let mut order = vars_kept.clone();
        order.extend(rand_vars.iter().cloned());
        order.push(var_out.to_owned());
        let mut order_doms = kept_doms.clone();
        order_doms.extend(rand_doms.iter().cloned());
        order_doms.push(var_out_dom.clone());

        let order_not_out = &order[..order.len() - 1];
        let doms_not_out = &order_doms[..order_doms.len() - 1];

        let mut my_iter = self.iter_over(&order, &order_doms, None);
        let mut dist_iters: Vec<_> = rand_vars
            .iter()
            .map(|var| {
                distributions[var.as_str()].iter_over(order_not_out, doms_not_out, None)
            })
            .collect();

        let nbr_kept_utils = solution_product(&kept_doms);
        let nbr_scenarios = solution_product(&rand_doms);
        let out_dom_size = var_out_dom.len();
        let scenario_infeasible = if maximize {
            U::min_infinity()
        } else {
            U::plus_infinity()
        };
        let out_position = order.len() - 1;

        let mut opt_sols: Vec<Vec<V>> = Vec::with_capacity(nbr_kept_utils as usize);
        let mut expect_utils: Vec<U> = Vec::with_capacity(if expect {
            nbr_kept_utils as usize
        } else {
            0
        });

        for _ in 0..nbr_kept_utils {
            let mut counts: HashMap<V, f64> = HashMap::default();
            let mut max_prob = 0.0_f64;
            let mut max_prob2 = 0.0_f64;
            let mut prob_left = 1.0_f64;
            let mut opt_sol: Option<V> = None;
            let mut partial_expect: HashMap<V, U> = HashMap::default();
            if expect {
                for value in &var_out_dom {
                    let _ = partial_expect.insert(*value, U::zero());
                }
            }

            let mut scenario = 0;
            while scenario < nbr_scenarios {
                scenario += 1;

                let mut prob = 1.0_f64;
                for iter in &mut dist_iters {
                    prob *= iter
                        .next_utility()
                        .expect("distribution iterators stay aligned")
                        .as_f64();
                }
                prob_left -= prob;
                let prob_u = U::from_f64(prob);

                // The scenario's argmax over the decided variable; ties
                // accumulate so the all-solutions variant can credit them
                // all.
                let mut opt_util = scenario_infeasible;
                let mut opt_vals: Vec<V> = Vec::new();
                for _ in 0..out_dom_size {
                    let value = my_iter
                        .next_solution()
                        .expect("the space iterator stays aligned")[out_position];
                    let util = my_iter.current_utility().unwrap_or(scenario_infeasible);
                    if expect {
                        if let Some(sum) = partial_expect.get_mut(&value) {
                            *sum = sum.plus(util.times(prob_u));
                        }
                    }
                    let as_good = if maximize { util >= opt_util } else { util <= opt_util };
                    if as_good {
                        if util != opt_util {
                            opt_util = util;
                            opt_vals.clear();
                        }
                        opt_vals.push(value);
                    }
                }

                if all_solutions {
                    for position in (1..opt_vals.len()).rev() {
                        record_vote(
                            opt_vals[position],
                            prob,
                            &mut counts,
                            &mut max_prob,
                            &mut max_prob2,
                            &mut opt_sol,
                        );
                    }
                }
                record_vote(
                    opt_vals[0],
                    prob,
                    &mut counts,
                    &mut max_prob,
                    &mut max_prob2,
                    &mut opt_sol,
                );

                // Once the runner-up can no longer catch up with the
                // probability mass still unseen, the winner is decided.
                if max_prob - max_prob2 >= prob_left {
                    debug!(
                        "consensus vote decided after {scenario} of {nbr_scenarios} scenarios"
                    );
                    break;
                }
            }

            let winner = opt_sol.expect("every scenario votes at least once");
            let mut expect_util = partial_expect.get(&winner).copied().unwrap_or_else(U::zero);

            // Keep the iterators aligned across the skipped scenarios; the
            // expectation still needs their utilities for the winner.
            while scenario < nbr_scenarios {
                scenario += 1;
                let mut prob = 1.0_f64;
                for iter in &mut dist_iters {
                    if expect {
                        prob *= iter
                            .next_utility()
                            .expect("distribution iterators stay aligned")
                            .as_f64();
                    } else {
                        let _ = iter.next_solution();
                    }
                }
                let prob_u = U::from_f64(prob);
                for _ in 0..out_dom_size {
                    let value = my_iter
                        .next_solution()
                        .expect("the space iterator stays aligned")[out_position];
                    if expect && value == winner {
                        let util = my_iter.current_utility().unwrap_or(scenario_infeasible);
                        expect_util = expect_util.plus(util.times(prob_u));
                    }
                }
            }

            opt_sols.push(vec![winner]);
            if expect {
                expect_utils.push(expect_util);
            }
        }

        drop(my_iter);
        drop(dist_iters);

        let vars_out = vec![var_out.to_owned()];
        if vars_kept.is_empty() {
            let assignments = Space::Scalar(ScalarSpace::assignment(
                opt_sols.into_iter().next().unwrap_or_default(),
            ));
            let space = if expect {
                Space::Scalar(ScalarSpace::new(
                    expect_utils.first().copied().unwrap_or_else(U::zero),
                    self.infeasible(),
                ))
            } else {
                self.compose(&vars_out, &assignments)
            };
            ProjOutput {
                space,
                vars_out,
                assignments,
            }
        } else {
            let assignments = Space::Hypercube(Hypercube::assignments(
                vars_kept.clone(),
                kept_doms.clone(),
                opt_sols,
            ));
            let space = if expect {
                Space::Hypercube(Hypercube::new(
                    vars_kept,
                    kept_doms,
                    expect_utils,
                    self.infeasible(),
                ))
            } else {
                self.compose(&vars_out, &assignments)
            };
            ProjOutput {
                space,
                vars_out,
                assignments,
            }
        }
    }
}

/// Credits `prob` to `value`'s vote total and maintains the best and
/// second-best candidates.
///
/// A candidate whose total merely *equals* the best's replaces it, and the
/// runner-up probability is only refreshed when the best changes hands, so
/// it can go one update stale. Consumers that need exact tie-breaking
/// across equal vote totals should not rely on which candidate wins.
fn record_vote<V: DomainValue>(
    value: V,
    prob: f64,
    counts: &mut HashMap<V, f64>,
    max_prob: &mut f64,
    max_prob2: &mut f64,
    opt_sol: &mut Option<V>,
) {
    let entry = counts.entry(value).or_insert(0.0);
    *entry += prob;
    let count = *entry;

    if count >= *max_prob {
        if *opt_sol != Some(value) {
            *max_prob2 = *max_prob;
        }
        *max_prob = count;
        *opt_sol = Some(value);
    } else if count > *max_prob2 {
        *max_prob2 = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::test_helpers::vars;
    use crate::values::Real;

    /// A space over the decision x and the random r where x=1 wins big in
    /// the scenario r=0 (probability 0.4) while x=0 wins modestly in the
    /// scenarios r=1 and r=2 (total probability 0.6).
    fn majority_cube() -> Hypercube<i32, Real> {
        Hypercube::new(
            vars(&["x", "r"]),
            vec![vec![0, 1], vec![0, 1, 2]],
            [0.0, 10.0, 10.0, 100.0, 0.0, 0.0]
                .iter()
                .copied()
                .map(Real::new)
                .collect(),
            Real::min_infinity(),
        )
    }

    fn r_distribution() -> Hypercube<i32, Real> {
        Hypercube::new(
            vars(&["r"]),
            vec![vec![0, 1, 2]],
            vec![Real::new(0.4), Real::new(0.3), Real::new(0.3)],
            Real::min_infinity(),
        )
    }

    #[test]
    fn consensus_votes_by_probability_mass_not_expectation() {
        let cube = majority_cube();
        let dist = r_distribution();
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus("x", &dists, true);

        // Expectation-maximisation would pick x=1 (expected utility 40
        // against 6), but x=0 is optimal with probability 0.6.
        assert_eq!(vars(&["x"]), output.vars_out);
        assert_eq!(
            Space::Scalar(ScalarSpace::assignment(vec![0])),
            output.assignments
        );

        // The composition plays x=0 back into the space.
        let Space::Hypercube(space) = &output.space else {
            panic!("expected a dense composition");
        };
        assert_eq!(vars(&["r"]), space.variables());
        assert_eq!(
            vec![Real::new(0.0), Real::new(10.0), Real::new(10.0)],
            space.raw_values().to_vec()
        );
    }

    #[test]
    fn consensus_expect_reports_the_winners_expected_utility() {
        let cube = majority_cube();
        let dist = r_distribution();
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus_expect("x", &dists, true);

        assert_eq!(
            Space::Scalar(ScalarSpace::assignment(vec![0])),
            output.assignments
        );
        // 0.4·0 + 0.3·10 + 0.3·10 = 6.
        let Space::Scalar(expected) = &output.space else {
            panic!("expected a scalar expectation");
        };
        assert!((expected.payload().value() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn all_solutions_credits_every_tied_optimum() {
        // In every scenario both values of x are tied-optimal, so the
        // all-solutions variant must credit both and still pick a winner.
        let cube = Hypercube::new(
            vars(&["x", "r"]),
            vec![vec![0, 1], vec![0, 1]],
            vec![Real::new(5.0); 4],
            Real::min_infinity(),
        );
        let dist = Hypercube::new(
            vars(&["r"]),
            vec![vec![0, 1]],
            vec![Real::new(0.5), Real::new(0.5)],
            Real::min_infinity(),
        );
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus_all_sols("x", &dists, true);
        let Space::Scalar(winner) = &output.assignments else {
            panic!("expected a scalar companion");
        };
        assert_eq!(1, winner.payload().len());
    }

    #[test]
    fn kept_variables_get_one_winner_each() {
        // A kept variable y flips which x-value is optimal.
        let cube = Hypercube::new(
            vars(&["y", "x", "r"]),
            vec![vec![0, 1], vec![0, 1], vec![0, 1]],
            [
                9.0, 9.0, 0.0, 0.0, // y=0: x=0 always optimal
                0.0, 0.0, 9.0, 9.0, // y=1: x=1 always optimal
            ]
            .iter()
            .copied()
            .map(Real::new)
            .collect(),
            Real::min_infinity(),
        );
        let dist = Hypercube::new(
            vars(&["r"]),
            vec![vec![0, 1]],
            vec![Real::new(0.5), Real::new(0.5)],
            Real::min_infinity(),
        );
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus("x", &dists, true);
        let Space::Hypercube(assignments) = &output.assignments else {
            panic!("expected a dense companion");
        };
        assert_eq!(Some(vec![0]), assignments.payload(&[0]));
        assert_eq!(Some(vec![1]), assignments.payload(&[1]));
    }

    #[test]
    fn consensus_without_the_variable_is_a_clone() {
        let cube = majority_cube();
        let dist = r_distribution();
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus("absent", &dists, true);
        assert_eq!(Space::Hypercube(cube), output.space);
        assert!(output.vars_out.is_empty());
        assert_eq!(Space::Null, output.assignments);
    }

    #[test]
    fn consensus_without_random_variables_is_a_projection() {
        let cube = Hypercube::new(
            vars(&["x", "y"]),
            vec![vec![0, 1], vec![0, 1]],
            [3.0, 1.0, 2.0, 4.0].iter().copied().map(Real::new).collect(),
            Real::min_infinity(),
        );
        let dists = Distributions::default();

        let consensus = cube.consensus("x", &dists, true);
        let projected = cube.project(&vars(&["x"]), true);
        assert_eq!(projected.space, consensus.space);
        assert_eq!(projected.assignments, consensus.assignments);
    }

    #[test]
    fn a_decided_vote_terminates_early_with_the_same_winner() {
        let _ = env_logger::builder().is_test(true).try_init();

        // r=0 carries probability 0.9: after that single scenario the
        // winner cannot change any more.
        let cube = majority_cube();
        let dist = Hypercube::new(
            vars(&["r"]),
            vec![vec![0, 1, 2]],
            vec![Real::new(0.9), Real::new(0.05), Real::new(0.05)],
            Real::min_infinity(),
        );
        let mut dists = Distributions::default();
        let _ = dists.insert("r".to_owned(), &dist);

        let output = cube.consensus("x", &dists, true);
        assert_eq!(
            Space::Scalar(ScalarSpace::assignment(vec![1])),
            output.assignments
        );
    }
}
