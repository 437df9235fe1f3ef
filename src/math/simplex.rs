// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A Nelder-Mead simplex minimiser (after N. J. Higham's `nmsmax`).

use log::trace;
use strum_macros::Display;

const REFLECT: f64 = 1.0;
const CONTRACT: f64 = 0.5;
const EXPAND: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum Step {
    Reflect,
    Expand,
    Contract,
    Shrink,
}

/// The result of [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct SimplexResult {
    /// The best vertex found.
    pub x: Vec<f64>,

    /// The cost at `x`.
    pub cost: f64,

    /// The number of iterations used.
    pub iterations: usize,

    /// Did the simplex shrink below the tolerance before running out of
    /// iterations?
    pub converged: bool,
}

/// Minimise `cost` starting from `x0`.
///
/// The initial simplex is regular with a size proportional to
/// `max(|x0|_inf, 1)`. Iteration stops when the L1 extent of the simplex,
/// relative to `max(|best|_1, 1)`, is at most `tolerance`, or after
/// `max_iterations` iterations.
pub fn nelder_mead<F>(
    mut cost: F,
    x0: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> SimplexResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return SimplexResult {
            x: vec![],
            cost: cost(x0),
            iterations: 0,
            converged: true,
        };
    }

    // Set up the initial regular simplex.
    let scale = x0.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let nf = n as f64;
    let root = (nf + 1.0).sqrt() - 1.0;
    let alpha_diag = scale / (nf * 2.0_f64.sqrt()) * (root + nf);
    let alpha_off = scale / (nf * 2.0_f64.sqrt()) * root;

    let mut vertices: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    vertices.push((x0.to_vec(), cost(x0)));
    for i in 0..n {
        let v: Vec<f64> = x0
            .iter()
            .enumerate()
            .map(|(j, &x)| if i == j { x + alpha_diag } else { x + alpha_off })
            .collect();
        let c = cost(&v);
        vertices.push((v, c));
    }
    sort_vertices(&mut vertices);

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        // Test for convergence.
        let best = &vertices[0].0;
        let extent: f64 = vertices[1..]
            .iter()
            .flat_map(|(v, _)| v.iter().zip(best.iter()).map(|(a, b)| (a - b).abs()))
            .sum();
        let best_norm = best.iter().map(|v| v.abs()).sum::<f64>().max(1.0);
        if extent / best_norm <= tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        // The centroid of all but the worst vertex.
        let mut centroid = vec![0.0; n];
        for (v, _) in &vertices[..n] {
            centroid.iter_mut().zip(v).for_each(|(c, v)| *c += v / nf);
        }
        let worst_cost = vertices[n].1;
        let second_worst_cost = vertices[n - 1].1;
        let best_cost = vertices[0].1;

        let reflected = affine(&centroid, &vertices[n].0, -REFLECT);
        let reflected_cost = cost(&reflected);

        let (replacement, step) = if reflected_cost < second_worst_cost {
            let expanded = if reflected_cost < best_cost {
                let expanded = affine(&centroid, &reflected, EXPAND);
                let expanded_cost = cost(&expanded);
                (expanded_cost < best_cost).then_some((expanded, expanded_cost))
            } else {
                None
            };
            match expanded {
                Some(expanded) => (expanded, Step::Expand),
                None => ((reflected, reflected_cost), Step::Reflect),
            }
        } else {
            let towards = if reflected_cost < worst_cost {
                &reflected
            } else {
                &vertices[n].0
            };
            let contracted = affine(&centroid, towards, CONTRACT);
            let contracted_cost = cost(&contracted);
            if contracted_cost < worst_cost {
                ((contracted, contracted_cost), Step::Contract)
            } else {
                // Shrink everything towards the best vertex.
                let best = vertices[0].0.clone();
                for (v, c) in vertices[1..n].iter_mut() {
                    v.iter_mut().zip(&best).for_each(|(v, b)| *v = (*v + b) / 2.0);
                    *c = cost(v);
                }
                let shrunk = affine(&best, &vertices[n].0, 0.5);
                let shrunk_cost = cost(&shrunk);
                ((shrunk, shrunk_cost), Step::Shrink)
            }
        };
        trace!("simplex iteration {iterations}: {step}, cost {}", replacement.1);

        vertices[n] = replacement;
        sort_vertices(&mut vertices);
    }

    let (x, cost) = vertices.swap_remove(0);
    SimplexResult {
        x,
        cost,
        iterations,
        converged,
    }
}

/// `centroid + factor * (point - centroid)`.
fn affine(centroid: &[f64], point: &[f64], factor: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(c, p)| c + factor * (p - c))
        .collect()
}

/// Best (lowest cost) first. NaN costs sort last.
fn sort_vertices(vertices: &mut [(Vec<f64>, f64)]) {
    vertices.sort_by(|(_, a), (_, b)| match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(b),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
}
