use statrs::function::factorial::ln_factorial;

/// Fisher's exact test on 2×2 tables with a precomputed log-factorial table.
///
/// Built once per graph, sized to the total path count, and shared by
/// reference for every node, edge and FR statistic computed on that graph.
#[derive(Debug, Clone)]
pub struct FisherExact {
    log_factorials: Vec<f64>,
}

/// Relative slack used when deciding whether a table is "as extreme" as the
/// observed one.
const RELATIVE_ERROR: f64 = 1e-7;

impl FisherExact {
    /// Tables whose grand total is at most `max_size` are served from the
    /// precomputed table.
    pub fn new(max_size: usize) -> Self {
        let log_factorials = (0..=max_size as u64).map(ln_factorial).collect();
        Self { log_factorials }
    }

    pub fn max_size(&self) -> usize {
        self.log_factorials.len() - 1
    }

    fn ln_factorial(&self, n: usize) -> f64 {
        self.log_factorials
            .get(n)
            .copied()
            .unwrap_or_else(|| ln_factorial(n as u64))
    }

    /// Hypergeometric probability of the table `[a, b; c, d]`.
    pub fn probability(&self, a: usize, b: usize, c: usize, d: usize) -> f64 {
        let n = a + b + c + d;
        let ln_p = self.ln_factorial(a + b)
            + self.ln_factorial(c + d)
            + self.ln_factorial(a + c)
            + self.ln_factorial(b + d)
            - self.ln_factorial(n)
            - self.ln_factorial(a)
            - self.ln_factorial(b)
            - self.ln_factorial(c)
            - self.ln_factorial(d);
        ln_p.exp()
    }

    /// Two-tailed p-value: the summed probability of every table with the
    /// observed margins that is no more likely than the observed table.
    pub fn two_tailed_p(&self, a: usize, b: usize, c: usize, d: usize) -> f64 {
        let row1 = a + b;
        let row2 = c + d;
        let col1 = a + c;
        let observed = self.probability(a, b, c, d);
        let cutoff = observed * (1.0 + RELATIVE_ERROR);

        let low = col1.saturating_sub(row2);
        let high = row1.min(col1);
        let mut p = 0.0;
        for x in low..=high {
            let y = row1 - x;
            let z = col1 - x;
            let w = row2 - z;
            let px = self.probability(x, y, z, w);
            if px <= cutoff {
                p += px;
            }
        }
        p.min(1.0)
    }
}
