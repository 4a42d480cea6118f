use serde::Deserialize;
use serde::Serialize;
use std::f64::consts::PI;
use std::f64::consts::SQRT_2;

const SWEEPS: usize = 32;
const TOLERANCE: f64 = 1e-4;

/// skill belief for one configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub mu: f64,
    pub sigma: f64,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            mu: crate::INITIAL_MU,
            sigma: crate::INITIAL_SIGMA,
        }
    }
}

/// one ranked participant of a race; rank 1 is best, equal ranks draw
#[derive(Debug, Clone, Copy)]
pub struct Individual {
    pub score: Score,
    pub rank: usize,
}

/// gaussian in natural (precision, precision-mean) form
#[derive(Debug, Clone, Copy, PartialEq)]
struct Gaussian {
    pi: f64,
    tau: f64,
}

impl Gaussian {
    const UNIFORM: Self = Self { pi: 0.0, tau: 0.0 };

    fn from_moments(mu: f64, var: f64) -> Self {
        let pi = 1.0 / var;
        Self { pi, tau: pi * mu }
    }
    fn mu(&self) -> f64 {
        if self.pi == 0.0 { 0.0 } else { self.tau / self.pi }
    }
    fn var(&self) -> f64 {
        if self.pi == 0.0 {
            f64::INFINITY
        } else {
            1.0 / self.pi
        }
    }
    fn mul(&self, other: &Self) -> Self {
        Self {
            pi: self.pi + other.pi,
            tau: self.tau + other.tau,
        }
    }
    fn div(&self, other: &Self) -> Self {
        Self {
            pi: self.pi - other.pi,
            tau: self.tau - other.tau,
        }
    }
}

fn pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * PI).sqrt()
}

fn cdf(x: f64) -> f64 {
    erfc(-x / SQRT_2) / 2.0
}

fn inv_cdf(p: f64) -> f64 {
    -SQRT_2 * erfcinv(2.0 * p)
}

/// complementary error function, rational approximation
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + z / 2.0);
    let r = t * (-z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587
                                    + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 { r } else { 2.0 - r }
}

fn erfcinv(y: f64) -> f64 {
    if y >= 2.0 {
        return -100.0;
    }
    if y <= 0.0 {
        return 100.0;
    }
    let flipped = y >= 1.0;
    let y = if flipped { 2.0 - y } else { y };
    let t = (-2.0 * (y / 2.0).ln()).sqrt();
    let mut x = -std::f64::consts::FRAC_1_SQRT_2
        * ((2.30753 + t * 0.27061) / (1.0 + t * (0.99229 + t * 0.04481)) - t);
    for _ in 0..2 {
        let err = erfc(x) - y;
        x += err / (2.0 / PI.sqrt() * (-x * x).exp() - x * err);
    }
    if flipped { -x } else { x }
}

/// margin inside which two single-player teams draw
fn draw_margin() -> f64 {
    inv_cdf((crate::DRAW_PROBABILITY + 1.0) / 2.0) * SQRT_2 * crate::BETA
}

fn v_win(diff: f64, margin: f64) -> f64 {
    let x = diff - margin;
    let denom = cdf(x);
    if denom > f64::MIN_POSITIVE {
        pdf(x) / denom
    } else {
        -x
    }
}

fn w_win(diff: f64, margin: f64) -> f64 {
    let x = diff - margin;
    let v = v_win(diff, margin);
    (v * (v + x)).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
}

fn v_draw(diff: f64, margin: f64) -> f64 {
    let abs_diff = diff.abs();
    let (a, b) = (margin - abs_diff, -margin - abs_diff);
    let denom = cdf(a) - cdf(b);
    let x = if denom > f64::MIN_POSITIVE {
        (pdf(b) - pdf(a)) / denom
    } else {
        a
    };
    if diff < 0.0 { -x } else { x }
}

fn w_draw(diff: f64, margin: f64) -> f64 {
    let abs_diff = diff.abs();
    let (a, b) = (margin - abs_diff, -margin - abs_diff);
    let denom = cdf(a) - cdf(b);
    if denom > f64::MIN_POSITIVE {
        let v = v_draw(abs_diff, margin);
        (v * v + (a * pdf(a) - b * pdf(b)) / denom).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
    } else {
        1.0 - f64::EPSILON
    }
}

/// multi-team trueskill update over one race's ranked individuals: a chain
/// of pairwise difference factors between rank-adjacent performances, with
/// truncated-gaussian approximations iterated to convergence
pub fn adjust(players: &mut [Individual]) {
    let n = players.len();
    if n < 2 {
        return;
    }
    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by_key(|&i| players[i].rank);

    let beta2 = crate::BETA * crate::BETA;
    let margin = draw_margin();

    // performance priors fold the skill prior, dynamics and beta noise
    let prior = order
        .iter()
        .map(|&i| players[i].score)
        .map(|s| {
            Gaussian::from_moments(
                s.mu,
                s.sigma * s.sigma + crate::DYNAMICS * crate::DYNAMICS + beta2,
            )
        })
        .collect::<Vec<_>>();
    let draw = order
        .windows(2)
        .map(|w| players[w[0]].rank == players[w[1]].rank)
        .collect::<Vec<_>>();

    let mut perf = prior.clone();
    let mut left = vec![Gaussian::UNIFORM; n - 1];
    let mut right = vec![Gaussian::UNIFORM; n - 1];

    for _ in 0..SWEEPS {
        let mut delta = 0.0f64;
        for k in 0..n - 1 {
            // contexts of both performances, excluding this factor's messages
            let a = perf[k].div(&left[k]);
            let b = perf[k + 1].div(&right[k]);
            let down = Gaussian::from_moments(a.mu() - b.mu(), a.var() + b.var());

            // truncated approximation of the difference marginal
            let sqrt_pi = down.pi.sqrt();
            let t = down.tau / sqrt_pi;
            let e = margin * sqrt_pi;
            let (v, w) = if draw[k] {
                (v_draw(t, e), w_draw(t, e))
            } else {
                (v_win(t, e), w_win(t, e))
            };
            let truncated = Gaussian {
                pi: down.pi / (1.0 - w),
                tau: (down.tau + sqrt_pi * v) / (1.0 - w),
            };
            let trunc = truncated.div(&down);

            // push the refined difference back into both performances
            let new_right = Gaussian::from_moments(a.mu() - trunc.mu(), a.var() + trunc.var());
            delta = delta.max((new_right.mu() - right[k].mu()).abs());
            perf[k + 1] = perf[k + 1].div(&right[k]).mul(&new_right);
            right[k] = new_right;

            let b = perf[k + 1].div(&right[k]);
            let new_left = Gaussian::from_moments(b.mu() + trunc.mu(), b.var() + trunc.var());
            delta = delta.max((new_left.mu() - left[k].mu()).abs());
            perf[k] = perf[k].div(&left[k]).mul(&new_left);
            left[k] = new_left;
        }
        if delta < TOLERANCE {
            break;
        }
    }

    // peel the beta noise back off to get the skill posterior
    for (j, &i) in order.iter().enumerate() {
        let s = players[i].score;
        let skill_prior = Gaussian::from_moments(
            s.mu,
            s.sigma * s.sigma + crate::DYNAMICS * crate::DYNAMICS,
        );
        let context = perf[j].div(&prior[j]);
        let posterior = if context.pi > 0.0 {
            skill_prior.mul(&Gaussian::from_moments(
                context.mu(),
                context.var() + beta2,
            ))
        } else {
            skill_prior
        };
        players[i].score = Score {
            mu: posterior.mu(),
            sigma: posterior.var().sqrt(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(rank: usize) -> Individual {
        Individual {
            score: Score::default(),
            rank,
        }
    }

    #[test]
    fn winner_rises_and_loser_falls() {
        let mut players = [fresh(1), fresh(2)];
        adjust(&mut players);
        assert!(players[0].score.mu > crate::INITIAL_MU);
        assert!(players[1].score.mu < crate::INITIAL_MU);
        assert!(players[0].score.sigma < crate::INITIAL_SIGMA);
        assert!(players[1].score.sigma < crate::INITIAL_SIGMA);
        // symmetric priors give a symmetric update
        let up = players[0].score.mu - crate::INITIAL_MU;
        let down = crate::INITIAL_MU - players[1].score.mu;
        assert!((up - down).abs() < 1e-6);
    }

    #[test]
    fn ties_leave_mu_and_shrink_sigma() {
        let mut players = [fresh(1), fresh(1), fresh(1), fresh(1)];
        adjust(&mut players);
        for p in players.iter() {
            assert!((p.score.mu - crate::INITIAL_MU).abs() < 1e-6);
            assert!(p.score.sigma < crate::INITIAL_SIGMA);
        }
    }

    #[test]
    fn one_winner_many_losers() {
        let mut players = [fresh(2), fresh(1), fresh(2), fresh(2)];
        adjust(&mut players);
        assert!(players[1].score.mu > crate::INITIAL_MU);
        for i in [0usize, 2, 3] {
            assert!(players[i].score.mu < players[1].score.mu);
        }
    }

    #[test]
    fn established_skill_moves_less() {
        let veteran = Individual {
            score: Score {
                mu: crate::INITIAL_MU,
                sigma: 2.0,
            },
            rank: 2,
        };
        let mut players = [fresh(1), veteran];
        adjust(&mut players);
        let rookie_shift = (players[0].score.mu - crate::INITIAL_MU).abs();
        let veteran_shift = (players[1].score.mu - crate::INITIAL_MU).abs();
        assert!(veteran_shift < rookie_shift);
    }

    #[test]
    fn dense_rank_chain_orders_posteriors() {
        let mut players = [fresh(3), fresh(1), fresh(2), fresh(4)];
        adjust(&mut players);
        assert!(players[1].score.mu > players[2].score.mu);
        assert!(players[2].score.mu > players[0].score.mu);
        assert!(players[0].score.mu > players[3].score.mu);
    }

    #[test]
    fn normal_helpers_are_sane() {
        assert!((cdf(0.0) - 0.5).abs() < 1e-9);
        assert!((cdf(1.6448536269514722) - 0.95).abs() < 1e-6);
        assert!((inv_cdf(0.95) - 1.6448536269514722).abs() < 1e-4);
        assert!((pdf(0.0) - 0.3989422804014327).abs() < 1e-9);
    }
}
