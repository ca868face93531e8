//! M/M/1 queueing delay.
//!
//! Formula: Wq = λ / (μ · (μ − λ)), valid while ρ = λ/μ < 1.

/// Result of an M/M/1 evaluation. `expected_wait_min` excludes service time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitTimeEstimate {
    pub stable: bool,
    pub utilization: f64,
    pub expected_wait_min: f64,
}

impl WaitTimeEstimate {
    pub fn unstable(utilization: f64) -> Self {
        Self {
            stable: false,
            utilization,
            expected_wait_min: f64::INFINITY,
        }
    }

    /// Wait used for ranking: the expected wait when stable, +∞ otherwise.
    pub fn ranking_wait_min(&self) -> f64 {
        if self.stable {
            self.expected_wait_min
        } else {
            f64::INFINITY
        }
    }
}

pub fn mm1_wait_time(lambda_per_min: f64, mu_per_min: f64) -> WaitTimeEstimate {
    // An unknown service rate must never rank ahead of a measured one.
    if mu_per_min.is_nan() || mu_per_min <= 0.0 {
        return WaitTimeEstimate::unstable(f64::INFINITY);
    }
    let utilization = lambda_per_min / mu_per_min;
    if !utilization.is_finite() || utilization >= 1.0 {
        return WaitTimeEstimate::unstable(utilization);
    }
    if lambda_per_min <= 0.0 {
        return WaitTimeEstimate {
            stable: true,
            utilization: 0.0,
            expected_wait_min: 0.0,
        };
    }
    WaitTimeEstimate {
        stable: true,
        utilization,
        expected_wait_min: lambda_per_min / (mu_per_min * (mu_per_min - lambda_per_min)),
    }
}

/// Service rate μ (jobs per minute) from an average service time.
pub fn service_rate_from_average(avg_service_min: f64) -> f64 {
    if avg_service_min > 0.0 && avg_service_min.is_finite() {
        1.0 / avg_service_min
    } else {
        0.0
    }
}
