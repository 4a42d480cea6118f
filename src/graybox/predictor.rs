/// confidence a pairwise loss prediction needs before it may kill a core
const KILL_CONFIDENCE: f64 = 0.8;

/// live view of one running slot, assembled at each prediction tick
#[derive(Debug, Clone)]
pub struct SlotTelemetry {
    pub core: usize,
    pub elapsed: f64,
    pub interim: Vec<f64>,
    pub descriptor: Vec<f64>,
}

/// narrow seam to the mid-race loss model: accumulate labeled pairs from
/// finished races, fit, and classify live pairs. any cost-sensitive binary
/// classifier can stand behind it.
pub trait LossPredictor: Send {
    fn trained(&self) -> bool;
    /// fold one finished race in as winner-versus-loser pairs, weighted by
    /// the observed performance margin
    fn prepare_train_data(
        &mut self,
        winner: &SlotTelemetry,
        losers: &[SlotTelemetry],
        margins: &[f64],
    );
    fn train(&mut self);
    /// pairwise feature vector for "does `a` lose to `b`"
    fn prepare_predict_data(&self, a: &SlotTelemetry, b: &SlotTelemetry) -> Vec<f64>;
    /// probability that the pair's first slot loses
    fn classify(&self, features: &[f64]) -> f64;

    /// cores predicted to lose against every other live slot; the
    /// best-looking slot is never listed, so a race cannot kill itself off
    fn termination_list(&self, live: &[SlotTelemetry]) -> Vec<usize> {
        if !self.trained() || live.len() < 2 {
            return Vec::new();
        }
        let mut votes = vec![0usize; live.len()];
        for i in 0..live.len() {
            for j in 0..live.len() {
                if i == j {
                    continue;
                }
                let p = self.classify(&self.prepare_predict_data(&live[i], &live[j]));
                if p > KILL_CONFIDENCE {
                    votes[i] += 1;
                }
            }
        }
        let safest = votes
            .iter()
            .enumerate()
            .min_by_key(|&(_, &v)| v)
            .map(|(i, _)| i)
            .expect("nonempty live set");
        votes
            .iter()
            .enumerate()
            .filter(|&(i, &v)| i != safest && v > 0)
            .map(|(i, _)| live[i].core)
            .collect()
    }
}

/// cost-sensitive logistic regression fit by gradient descent; the margin
/// of each observed loss weights its gradient contribution
pub struct CostLogistic {
    interim_dims: usize,
    weights: Vec<f64>,
    rows: Vec<Row>,
    trained: bool,
    rate: f64,
    epochs: usize,
}

struct Row {
    features: Vec<f64>,
    label: f64,
    cost: f64,
}

impl CostLogistic {
    pub fn new(interim_dims: usize) -> Self {
        Self {
            interim_dims,
            weights: Vec::new(),
            rows: Vec::new(),
            trained: false,
            rate: 0.1,
            epochs: 50,
        }
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }
}

impl LossPredictor for CostLogistic {
    fn trained(&self) -> bool {
        self.trained
    }

    fn prepare_train_data(
        &mut self,
        winner: &SlotTelemetry,
        losers: &[SlotTelemetry],
        margins: &[f64],
    ) {
        for (loser, &cost) in losers.iter().zip(margins.iter()) {
            self.rows.push(Row {
                features: self.prepare_predict_data(loser, winner),
                label: 1.0,
                cost,
            });
            self.rows.push(Row {
                features: self.prepare_predict_data(winner, loser),
                label: 0.0,
                cost,
            });
        }
    }

    fn train(&mut self) {
        let Some(width) = self.rows.first().map(|r| r.features.len()) else {
            return;
        };
        if self.weights.len() != width {
            self.weights = vec![0.0; width];
        }
        for _ in 0..self.epochs {
            for row in self.rows.iter() {
                let z = row
                    .features
                    .iter()
                    .zip(self.weights.iter())
                    .map(|(x, w)| x * w)
                    .sum::<f64>();
                let gradient = row.cost * (Self::sigmoid(z) - row.label);
                for (w, x) in self.weights.iter_mut().zip(row.features.iter()) {
                    *w -= self.rate * gradient * x;
                }
            }
        }
        self.trained = true;
    }

    fn prepare_predict_data(&self, a: &SlotTelemetry, b: &SlotTelemetry) -> Vec<f64> {
        let width = a.descriptor.len().max(b.descriptor.len());
        let mut features = Vec::with_capacity(2 + self.interim_dims + width);
        features.push(1.0);
        features.push(a.elapsed - b.elapsed);
        for d in 0..self.interim_dims {
            let x = a.interim.get(d).copied().unwrap_or(0.0);
            let y = b.interim.get(d).copied().unwrap_or(0.0);
            features.push(x - y);
        }
        for d in 0..width {
            let x = a.descriptor.get(d).copied().unwrap_or(0.0);
            let y = b.descriptor.get(d).copied().unwrap_or(0.0);
            features.push(x - y);
        }
        features
    }

    fn classify(&self, features: &[f64]) -> f64 {
        if self.weights.is_empty() {
            return 0.5;
        }
        let z = features
            .iter()
            .zip(self.weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>();
        Self::sigmoid(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(core: usize, behind: f64) -> SlotTelemetry {
        SlotTelemetry {
            core,
            elapsed: 10.0,
            interim: vec![behind],
            descriptor: vec![0.5],
        }
    }

    fn teach(model: &mut CostLogistic) {
        // larger interim loses, across many observed races
        for gap in 1..20 {
            let winner = slot(0, 0.0);
            let losers = [slot(1, gap as f64)];
            model.prepare_train_data(&winner, &losers, &[1.0]);
        }
        model.train();
    }

    #[test]
    fn learns_a_separable_loss_signal() {
        let mut model = CostLogistic::new(1);
        assert!(!model.trained());
        teach(&mut model);
        assert!(model.trained());
        let losing = model.classify(&model.prepare_predict_data(&slot(0, 15.0), &slot(1, 1.0)));
        let winning = model.classify(&model.prepare_predict_data(&slot(0, 1.0), &slot(1, 15.0)));
        assert!(losing > 0.8);
        assert!(winning < 0.2);
    }

    #[test]
    fn termination_spares_the_best_slot() {
        let mut model = CostLogistic::new(1);
        teach(&mut model);
        let live = vec![slot(0, 1.0), slot(1, 30.0), slot(2, 40.0)];
        let victims = model.termination_list(&live);
        assert!(!victims.contains(&0));
        assert!(victims.contains(&1));
        assert!(victims.contains(&2));
    }

    #[test]
    fn untrained_model_kills_nothing() {
        let model = CostLogistic::new(1);
        let live = vec![slot(0, 1.0), slot(1, 30.0)];
        assert!(model.termination_list(&live).is_empty());
    }
}
